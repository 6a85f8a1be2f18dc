//! Status resolution
//!
//! Turns validation verdicts into the status subresource and the live subset
//! of the spec that routing is built from. Degraded pipelines are carried
//! forward with only the references that resolved.

use crate::status::{
    describe, Condition, ConditionReason, ForwarderStatus, InputReason, InputStatus, OutputReason, OutputStatus,
    PipelineReason, PipelineStatus, State,
};
use crate::validation::{LiveSource, OutputTarget, PipelineVerdict, Validation};
use tracing::{debug, info};

/// A pipeline that survives validation, with unresolved refs removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivePipeline {
    pub name: String,
    pub inputs: Vec<LiveSource>,
    pub outputs: Vec<String>,
}

/// Everything routing may use
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSpec {
    /// Accepted outputs in declaration order, followed by the default output
    /// when a live pipeline references it
    pub outputs: Vec<OutputTarget>,
    pub pipelines: Vec<LivePipeline>,
}

impl LiveSpec {
    pub fn output(&self, name: &str) -> Option<&OutputTarget> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Status plus live subset
#[derive(Debug, Clone)]
pub struct Resolution {
    pub status: ForwarderStatus,
    pub live: LiveSpec,
}

pub fn resolve(validation: &Validation) -> Resolution {
    let outputs: Vec<OutputStatus> = validation
        .outputs
        .iter()
        .map(|verdict| OutputStatus {
            name: verdict.name.clone(),
            state: verdict.state(),
            reasons: verdict.reasons.iter().copied().collect(),
            message: describe(&verdict.reasons, OutputReason::description),
        })
        .collect();

    let inputs: Vec<InputStatus> = validation
        .inputs
        .iter()
        .map(|verdict| InputStatus {
            name: verdict.name.clone(),
            state: verdict.state(),
            reasons: verdict.reasons.iter().copied().collect(),
            message: describe(&verdict.reasons, InputReason::description),
        })
        .collect();

    let pipelines: Vec<PipelineStatus> = validation.pipelines.iter().map(pipeline_status).collect();

    let live_pipelines: Vec<LivePipeline> = validation
        .pipelines
        .iter()
        .filter(|verdict| verdict.state() != State::Dropped)
        .map(|verdict| LivePipeline {
            name: verdict.name.clone(),
            inputs: verdict.inputs.clone(),
            outputs: verdict.outputs.clone(),
        })
        .collect();

    let mut live_outputs: Vec<OutputTarget> = validation
        .outputs
        .iter()
        .filter_map(|verdict| verdict.target.clone())
        .collect();
    if let Some(default) = &validation.default_output {
        let referenced = live_pipelines
            .iter()
            .any(|p| p.outputs.iter().any(|o| *o == default.name));
        let shadowed = live_outputs.iter().any(|o| o.name == default.name);
        if referenced && !shadowed {
            live_outputs.push(default.clone());
        }
    }

    let ready = if live_pipelines.is_empty() {
        Condition::not_ready(
            ConditionReason::NoLivePipelines,
            "No pipeline forwards logs to an accepted output",
        )
    } else {
        Condition::ready()
    };

    let status = ForwarderStatus {
        conditions: vec![ready],
        pipelines,
        outputs,
        inputs,
    };

    info!(
        live_pipelines = live_pipelines.len(),
        live_outputs = live_outputs.len(),
        dropped_pipelines = count_state(status.pipelines.iter().map(|s| s.state), State::Dropped),
        degraded_pipelines = count_state(status.pipelines.iter().map(|s| s.state), State::Degraded),
        dropped_outputs = count_state(status.outputs.iter().map(|s| s.state), State::Dropped),
        "Resolved forwarder status"
    );

    Resolution {
        status,
        live: LiveSpec {
            outputs: live_outputs,
            pipelines: live_pipelines,
        },
    }
}

fn pipeline_status(verdict: &PipelineVerdict) -> PipelineStatus {
    let state = verdict.state();
    let message = match state {
        State::Accepted => String::new(),
        State::Degraded => {
            let mut dropped = Vec::new();
            if !verdict.unresolved_inputs.is_empty() {
                dropped.push(format!(
                    "dropped unrecognized inputRefs: {}",
                    verdict.unresolved_inputs.join(", ")
                ));
            }
            if !verdict.unresolved_outputs.is_empty() {
                dropped.push(format!(
                    "dropped unrecognized outputRefs: {}",
                    verdict.unresolved_outputs.join(", ")
                ));
            }
            dropped.join("; ")
        }
        State::Dropped => describe(&verdict.reasons, PipelineReason::description),
    };

    if state != State::Accepted {
        debug!(pipeline = %verdict.name, %state, %message, "Pipeline not fully accepted");
    }

    PipelineStatus {
        name: verdict.name.clone(),
        state,
        reasons: verdict.reasons.iter().copied().collect(),
        message,
    }
}

fn count_state(states: impl Iterator<Item = State>, wanted: State) -> usize {
    states.filter(|s| *s == wanted).count()
}
