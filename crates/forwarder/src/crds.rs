//! `ClusterLogForwarder` Custom Resource Definition
//!
//! Types and source kinds are plain strings in the spec so malformed input
//! still deserializes and is reported through status reasons.

use crate::status::ForwarderStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Forwarding pipelines from named sources to named outputs
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "logging.forwarder.io",
    version = "v1",
    kind = "ClusterLogForwarder"
)]
#[kube(namespaced)]
#[kube(status = "ForwarderStatus")]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
pub struct ClusterLogForwarderSpec {
    /// Named destinations
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,

    /// Source to output mappings
    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,

    /// Custom named inputs narrowing one of the built-in sources
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
}

/// Destination for log records
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct OutputSpec {
    /// Unique output name referenced by pipelines
    #[serde(default)]
    pub name: String,

    /// Output type: `elasticsearch`, `fluentdForward` or `syslog`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,

    /// Endpoint URL, e.g. `https://es.logging.svc:9200`
    #[serde(default, alias = "endpoint", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Secret holding TLS material or shared keys for this output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<OutputSecretSpec>,
}

/// Reference to a secret in the forwarder's namespace
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct OutputSecretSpec {
    /// Name of the secret
    #[serde(default)]
    pub name: String,
}

/// Named mapping from sources to outputs
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PipelineSpec {
    /// Unique pipeline name
    #[serde(default)]
    pub name: String,

    /// Built-in source names or custom input names
    #[serde(default, rename = "inputRefs")]
    pub input_refs: Vec<String>,

    /// Names of outputs declared in `outputs` (or the reserved `default`)
    #[serde(default, rename = "outputRefs")]
    pub output_refs: Vec<String>,
}

/// Custom input selecting a subset of a built-in source
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct InputSpec {
    /// Unique input name usable as a pipeline `inputRef`
    #[serde(default)]
    pub name: String,

    /// Built-in source this input draws from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Namespaces to collect from (application inputs only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
}

/// Built-in log sources
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    /// Container logs from non-infrastructure namespaces
    Application,
    /// Node journal and infrastructure container logs
    Infrastructure,
    /// Kernel, API server and OpenShift audit logs
    Audit,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::Application,
        SourceKind::Infrastructure,
        SourceKind::Audit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Application => "application",
            SourceKind::Infrastructure => "infrastructure",
            SourceKind::Audit => "audit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Collector tags carrying records of this source.
    ///
    /// Infrastructure container tags overlap the application catch-all, so
    /// routing must consider infrastructure before application.
    pub fn tags(self) -> &'static [&'static str] {
        match self {
            SourceKind::Application => &["kubernetes.var.log.containers.**"],
            SourceKind::Infrastructure => &[
                "journal.**",
                "system.var.log**",
                "kubernetes.var.log.containers.**_default_**",
                "kubernetes.var.log.containers.**_kube-*_**",
                "kubernetes.var.log.containers.**_openshift*_**",
            ],
            SourceKind::Audit => &[
                "linux-audit.log**",
                "k8s-audit.log**",
                "openshift-audit.log**",
            ],
        }
    }

    /// Position in the routing section; lower values are matched first.
    pub fn routing_precedence(self) -> u8 {
        match self {
            SourceKind::Infrastructure => 0,
            SourceKind::Audit => 1,
            SourceKind::Application => 2,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported output plugins
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputType {
    Elasticsearch,
    FluentdForward,
    Syslog,
}

impl OutputType {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputType::Elasticsearch => "elasticsearch",
            OutputType::FluentdForward => "fluentdForward",
            OutputType::Syslog => "syslog",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "elasticsearch" => Some(OutputType::Elasticsearch),
            "fluentdForward" => Some(OutputType::FluentdForward),
            "syslog" => Some(OutputType::Syslog),
            _ => None,
        }
    }

    /// URL schemes accepted for this output type
    pub fn schemes(self) -> &'static [&'static str] {
        match self {
            OutputType::Elasticsearch => &["http", "https"],
            OutputType::FluentdForward => &["tcp", "tls"],
            OutputType::Syslog => &["tcp", "udp", "tls"],
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            OutputType::Elasticsearch => 9200,
            OutputType::FluentdForward => 24224,
            OutputType::Syslog => 514,
        }
    }

    /// Whether the plugin can re-emit failed chunks under a retry tag
    pub fn supports_retry_tag(self) -> bool {
        matches!(self, OutputType::Elasticsearch)
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
