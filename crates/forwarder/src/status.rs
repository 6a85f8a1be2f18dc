//! Status of a `ClusterLogForwarder`
//!
//! Every pipeline, output and input declared in the spec gets exactly one
//! status entry, in declaration order.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Acceptance state of a declared entity
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum State {
    /// Usable as declared
    Accepted,
    /// Usable with some references removed
    Degraded,
    /// Not usable; contributes nothing to the collector configuration
    Dropped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Accepted => write!(f, "Accepted"),
            State::Degraded => write!(f, "Degraded"),
            State::Dropped => write!(f, "Dropped"),
        }
    }
}

/// Why a pipeline is not fully accepted
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub enum PipelineReason {
    MissingName,
    NonUniqueName,
    ReservedNameConflict,
    MissingSource,
    UnrecognizedSource,
    MissingOutputs,
    UnrecognizedOutput,
}

impl PipelineReason {
    pub fn description(self) -> &'static str {
        match self {
            PipelineReason::MissingName => "The pipeline is missing a name",
            PipelineReason::NonUniqueName => "The pipeline name is not unique",
            PipelineReason::ReservedNameConflict => {
                "Name conflicts with an internally reserved name"
            }
            PipelineReason::MissingSource => "The pipeline is missing a source",
            PipelineReason::UnrecognizedSource => "An inputRef does not correspond to a known source",
            PipelineReason::MissingOutputs => "The pipeline does not reference any usable outputs",
            PipelineReason::UnrecognizedOutput => {
                "An outputRef does not correspond to an accepted output"
            }
        }
    }

    /// Reasons that drop the pipeline regardless of what else resolves
    pub fn is_fatal(self) -> bool {
        !matches!(
            self,
            PipelineReason::UnrecognizedSource | PipelineReason::UnrecognizedOutput
        )
    }
}

/// Why an output was dropped
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub enum OutputReason {
    MissingName,
    NonUniqueName,
    ReservedNameConflict,
    MissingType,
    UnrecognizedType,
    MissingEndpoint,
    MissingSecretName,
    SecretDoesNotExist,
}

impl OutputReason {
    pub fn description(self) -> &'static str {
        match self {
            OutputReason::MissingName => "Missing name",
            OutputReason::NonUniqueName => "Name is not unique among outputs",
            OutputReason::ReservedNameConflict => "Name conflicts with an internally reserved name",
            OutputReason::MissingType => "Missing type",
            OutputReason::UnrecognizedType => "Unrecognized type",
            OutputReason::MissingEndpoint => "Missing or invalid endpoint URL",
            OutputReason::MissingSecretName => "Missing secret name",
            OutputReason::SecretDoesNotExist => "Secret does not exist",
        }
    }
}

/// Why a custom input was dropped
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub enum InputReason {
    MissingName,
    NonUniqueName,
    ReservedNameConflict,
    MissingSource,
    UnrecognizedSource,
    InvalidNamespace,
}

impl InputReason {
    pub fn description(self) -> &'static str {
        match self {
            InputReason::MissingName => "Missing name",
            InputReason::NonUniqueName => "Name is not unique among inputs",
            InputReason::ReservedNameConflict => "Name conflicts with an internally reserved name",
            InputReason::MissingSource => "Missing source",
            InputReason::UnrecognizedSource => "Unrecognized source",
            InputReason::InvalidNamespace => "A namespace is not a valid Kubernetes name",
        }
    }
}

/// Status of a single pipeline
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct PipelineStatus {
    pub name: String,
    pub state: State,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<PipelineReason>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Status of a single output
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct OutputStatus {
    pub name: String,
    pub state: State,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<OutputReason>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Status of a single custom input
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct InputStatus {
    pub name: String,
    pub state: State,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<InputReason>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Kind of top-level condition
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionType {
    /// The forwarder produced a configuration that ships logs somewhere
    Ready,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Why a condition is not true
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionReason {
    /// The resource itself is unusable, e.g. a non-singleton name
    Invalid,
    /// Every pipeline was dropped
    NoLivePipelines,
}

/// Condition for the `ClusterLogForwarder`
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub condition_type: ConditionType,

    /// Status of the condition
    pub status: ConditionStatus,

    /// Reason for a false condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConditionReason>,

    /// Human-readable message about the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn ready() -> Self {
        Self {
            condition_type: ConditionType::Ready,
            status: ConditionStatus::True,
            reason: None,
            message: None,
        }
    }

    pub fn not_ready(reason: ConditionReason, message: impl Into<String>) -> Self {
        Self {
            condition_type: ConditionType::Ready,
            status: ConditionStatus::False,
            reason: Some(reason),
            message: Some(message.into()),
        }
    }
}

/// Status subresource of the `ClusterLogForwarder`
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ForwarderStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub pipelines: Vec<PipelineStatus>,
    #[serde(default)]
    pub outputs: Vec<OutputStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputStatus>,
}

impl ForwarderStatus {
    /// First pipeline status with the given name
    pub fn pipeline(&self, name: &str) -> Option<&PipelineStatus> {
        self.pipelines.iter().find(|status| status.name == name)
    }

    /// First output status with the given name
    pub fn output(&self, name: &str) -> Option<&OutputStatus> {
        self.outputs.iter().find(|status| status.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&InputStatus> {
        self.inputs.iter().find(|status| status.name == name)
    }

    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// True when the Ready condition is present and true
    pub fn is_ready(&self) -> bool {
        self.condition(ConditionType::Ready)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// True when nothing was degraded or dropped
    pub fn all_accepted(&self) -> bool {
        self.pipelines.iter().all(|s| s.state == State::Accepted)
            && self.outputs.iter().all(|s| s.state == State::Accepted)
            && self.inputs.iter().all(|s| s.state == State::Accepted)
    }
}

/// Joins reason descriptions into a status message.
pub(crate) fn describe<R: Copy>(reasons: &BTreeSet<R>, description: fn(R) -> &'static str) -> String {
    reasons
        .iter()
        .map(|reason| description(*reason))
        .collect::<Vec<_>>()
        .join("; ")
}
