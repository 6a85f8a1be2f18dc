//! Collector ConfigMap

use crate::fingerprint::RenderedConfig;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// Data key holding the rendered configuration
pub const CONFIG_KEY: &str = "fluent.conf";

/// Annotation carrying the fingerprint of [`CONFIG_KEY`]
pub const CONFIG_HASH_ANNOTATION: &str = "logging.forwarder/config-hash";

const FORWARDER_LABEL: &str = "logging.forwarder/name";

/// ConfigMap mounted by the collector, annotated with the config fingerprint
pub fn collector_config_map(name: &str, namespace: &str, config: &RenderedConfig) -> ConfigMap {
    let mut data = BTreeMap::new();
    data.insert(CONFIG_KEY.to_string(), config.text.clone());

    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/component".to_string(), "collector".to_string());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "render-forwarder".to_string(),
    );
    labels.insert(FORWARDER_LABEL.to_string(), name.to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert(
        CONFIG_HASH_ANNOTATION.to_string(),
        config.fingerprint.to_string(),
    );

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Fingerprint recorded on a previously applied ConfigMap
pub fn config_hash(config_map: &ConfigMap) -> Option<&str> {
    config_map
        .metadata
        .annotations
        .as_ref()?
        .get(CONFIG_HASH_ANNOTATION)
        .map(String::as_str)
}

/// Whether collectors running `current` must be restarted to pick up `next`
pub fn requires_restart(current: Option<&ConfigMap>, next: &RenderedConfig) -> bool {
    next.fingerprint
        .differs_from(current.and_then(config_hash))
}
