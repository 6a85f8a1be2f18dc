//! End-to-end generation: validate, resolve, build, render, fingerprint

use crate::config::GeneratorConfig;
use crate::crds::{ClusterLogForwarder, ClusterLogForwarderSpec};
use crate::error::Result;
use crate::fingerprint::RenderedConfig;
use crate::graph::RoutingGraph;
use crate::render::render;
use crate::resolve::resolve;
use crate::secrets::SecretLookup;
use crate::status::{Condition, ConditionReason, ForwarderStatus};
use crate::validation::validate;
use kube::ResourceExt;
use tracing::{info, instrument, warn};

/// Result of one generation
#[derive(Debug, Clone)]
pub struct Generation {
    pub status: ForwarderStatus,
    /// Always present; a spec with nothing live renders a config that
    /// discards every record
    pub config: RenderedConfig,
    pub graph: RoutingGraph,
}

/// Generator bound to a configuration and a secret lookup
pub struct ForwarderGenerator<'a> {
    config: &'a GeneratorConfig,
    secrets: &'a dyn SecretLookup,
}

impl<'a> ForwarderGenerator<'a> {
    pub fn new(config: &'a GeneratorConfig, secrets: &'a dyn SecretLookup) -> Self {
        Self { config, secrets }
    }

    /// Compute status and configuration for `spec`.
    ///
    /// Spec problems only show up in the returned status. An error here means
    /// the generator itself is inconsistent and nothing should be applied.
    #[instrument(
        skip_all,
        fields(
            outputs = spec.outputs.len(),
            inputs = spec.inputs.len(),
            pipelines = spec.pipelines.len()
        )
    )]
    pub fn generate(&self, spec: &ClusterLogForwarderSpec) -> Result<Generation> {
        let validation = validate(spec, self.config, self.secrets);
        let resolution = resolve(&validation);
        let graph = RoutingGraph::build(&resolution.live, self.config)?;
        let config = RenderedConfig::new(render(&graph)?);

        info!(
            fingerprint = %config.fingerprint,
            labels = graph.labels().len(),
            stores = graph.stores().len(),
            edges = graph.edge_count(),
            "Generated collector configuration"
        );

        Ok(Generation {
            status: resolution.status,
            config,
            graph,
        })
    }

    /// Compile a whole resource, rejecting it when its name is not the
    /// configured singleton name.
    ///
    /// A rejected resource gets only a false Ready condition and the config
    /// of an empty graph, which discards every record.
    pub fn generate_resource(&self, resource: &ClusterLogForwarder) -> Result<Generation> {
        let name = resource.name_any();
        match self.config.singleton_name.as_deref() {
            Some(singleton) if name != singleton => {
                warn!(%name, %singleton, "Ignoring forwarder that is not the singleton");
                let graph = RoutingGraph::default();
                let config = RenderedConfig::new(render(&graph)?);
                let status = ForwarderStatus {
                    conditions: vec![Condition::not_ready(
                        ConditionReason::Invalid,
                        format!("Invalid name {name:?}, singleton instance must be named {singleton:?}"),
                    )],
                    ..Default::default()
                };
                Ok(Generation {
                    status,
                    config,
                    graph,
                })
            }
            _ => self.generate(&resource.spec),
        }
    }
}

/// One-shot form of [`ForwarderGenerator::generate`]
pub fn generate(
    spec: &ClusterLogForwarderSpec,
    config: &GeneratorConfig,
    secrets: &dyn SecretLookup,
) -> Result<Generation> {
    ForwarderGenerator::new(config, secrets).generate(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{OutputSecretSpec, OutputSpec, PipelineSpec};
    use crate::secrets::SecretSnapshot;
    use crate::status::{ConditionStatus, ConditionType, OutputReason, State};

    fn spec() -> ClusterLogForwarderSpec {
        ClusterLogForwarderSpec {
            outputs: vec![OutputSpec {
                name: "secure-es".to_string(),
                output_type: Some("elasticsearch".to_string()),
                url: Some("https://es.example.com:9200".to_string()),
                secret: Some(OutputSecretSpec {
                    name: "es-secret".to_string(),
                }),
            }],
            pipelines: vec![PipelineSpec {
                name: "audit-logs".to_string(),
                input_refs: vec!["audit".to_string()],
                output_refs: vec!["secure-es".to_string()],
            }],
            inputs: Vec::new(),
        }
    }

    #[test]
    fn test_generate_with_present_secret() {
        let secrets = SecretSnapshot::from_names(["es-secret"]);
        let config = GeneratorConfig::default();
        let generation = generate(&spec(), &config, &secrets).unwrap();

        assert!(generation.status.all_accepted());
        assert!(generation
            .config
            .text
            .contains("client_cert /var/run/ocp-collector/secrets/es-secret/tls.crt"));
        assert_eq!(generation.graph.edge_count(), 1);
    }

    #[test]
    fn test_missing_secret_drops_everything_but_still_renders() {
        let secrets = SecretSnapshot::default();
        let config = GeneratorConfig::default();
        let generation = ForwarderGenerator::new(&config, &secrets)
            .generate(&spec())
            .unwrap();

        let output = generation.status.output("secure-es").unwrap();
        assert_eq!(output.reasons, vec![OutputReason::SecretDoesNotExist]);
        assert_eq!(
            generation.status.pipeline("audit-logs").unwrap().state,
            State::Dropped
        );
        assert!(generation.graph.is_empty());
        assert!(!generation.config.text.contains("@type elasticsearch"));
    }

    #[test]
    fn test_generation_is_idempotent() {
        let secrets = SecretSnapshot::from_names(["es-secret"]);
        let config = GeneratorConfig::default();
        let first = generate(&spec(), &config, &secrets).unwrap();
        let second = generate(&spec(), &config, &secrets).unwrap();
        assert_eq!(first.config, second.config);
        assert_eq!(first.status, second.status);
    }

    #[test]
    fn test_resource_must_be_the_singleton() {
        let secrets = SecretSnapshot::from_names(["es-secret"]);
        let config = GeneratorConfig::default();
        let generator = ForwarderGenerator::new(&config, &secrets);

        let resource = ClusterLogForwarder::new("other", spec());
        let generation = generator.generate_resource(&resource).unwrap();
        let ready = generation.status.condition(ConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, Some(ConditionReason::Invalid));
        assert_eq!(
            ready.message.as_deref(),
            Some(r#"Invalid name "other", singleton instance must be named "instance""#)
        );
        assert!(generation.status.pipelines.is_empty());
        assert!(generation.graph.is_empty());
        assert!(!generation.config.text.contains("@type elasticsearch"));

        let resource = ClusterLogForwarder::new("instance", spec());
        let generation = generator.generate_resource(&resource).unwrap();
        assert!(generation.status.is_ready());
        assert_eq!(generation.graph.edge_count(), 1);
    }

    #[test]
    fn test_any_name_accepted_without_singleton() {
        let secrets = SecretSnapshot::from_names(["es-secret"]);
        let config = GeneratorConfig {
            singleton_name: None,
            ..Default::default()
        };
        let resource = ClusterLogForwarder::new("team-forwarder", spec());
        let generation = ForwarderGenerator::new(&config, &secrets)
            .generate_resource(&resource)
            .unwrap();
        assert!(generation.status.is_ready());
        assert!(generation.status.all_accepted());
    }
}
