//! Reference validation
//!
//! Checks every declared output, input and pipeline independently and
//! collects all reasons that apply. Nothing here fails: a malformed spec
//! produces reasons, never an error.

use crate::config::{GeneratorConfig, DEFAULT_OUTPUT_NAME};
use crate::crds::{
    ClusterLogForwarderSpec, InputSpec, OutputSpec, OutputType, PipelineSpec, SourceKind,
};
use crate::secrets::SecretLookup;
use crate::status::{InputReason, OutputReason, PipelineReason, State};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};
use url::Url;

/// Parsed connection target of an output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `raw` as a URL acceptable for `output_type`.
    ///
    /// Returns `None` for unparseable URLs, URLs without a host and schemes
    /// the output plugin cannot speak.
    pub fn parse(output_type: OutputType, raw: &str) -> Option<Self> {
        let url = Url::parse(raw.trim()).ok()?;
        if !output_type.schemes().contains(&url.scheme()) {
            return None;
        }
        let host = url.host_str().filter(|h| !h.is_empty())?.to_string();
        Some(Self {
            scheme: url.scheme().to_string(),
            host,
            port: url.port().unwrap_or_else(|| output_type.default_port()),
        })
    }

    /// Whether the connection is encrypted
    pub fn is_tls(&self) -> bool {
        matches!(self.scheme.as_str(), "https" | "tls")
    }
}

/// An output that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub name: String,
    pub output_type: OutputType,
    pub endpoint: Endpoint,
    pub secret: Option<String>,
}

/// A source a pipeline can read from: built-in or an accepted custom input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSource {
    pub name: String,
    pub kind: SourceKind,
    /// Restricts application sources to these namespaces when non-empty
    pub namespaces: Vec<String>,
}

impl LiveSource {
    fn builtin(kind: SourceKind) -> Self {
        Self {
            name: kind.as_str().to_string(),
            kind,
            namespaces: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputVerdict {
    pub name: String,
    pub reasons: BTreeSet<OutputReason>,
    /// Present only when `reasons` is empty
    pub target: Option<OutputTarget>,
}

impl OutputVerdict {
    pub fn state(&self) -> State {
        if self.reasons.is_empty() {
            State::Accepted
        } else {
            State::Dropped
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputVerdict {
    pub name: String,
    pub reasons: BTreeSet<InputReason>,
    pub source: Option<LiveSource>,
}

impl InputVerdict {
    pub fn state(&self) -> State {
        if self.reasons.is_empty() {
            State::Accepted
        } else {
            State::Dropped
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineVerdict {
    pub name: String,
    pub reasons: BTreeSet<PipelineReason>,
    /// Input refs that resolved, declaration order, deduplicated
    pub inputs: Vec<LiveSource>,
    /// Output refs that resolved, declaration order, deduplicated
    pub outputs: Vec<String>,
    pub unresolved_inputs: Vec<String>,
    pub unresolved_outputs: Vec<String>,
}

impl PipelineVerdict {
    pub fn state(&self) -> State {
        if self.reasons.is_empty() {
            State::Accepted
        } else if self.reasons.iter().any(|r| r.is_fatal())
            || self.inputs.is_empty()
            || self.outputs.is_empty()
        {
            State::Dropped
        } else {
            State::Degraded
        }
    }
}

/// Outcome of validating a whole spec, in declaration order
#[derive(Debug, Clone)]
pub struct Validation {
    pub outputs: Vec<OutputVerdict>,
    pub inputs: Vec<InputVerdict>,
    pub pipelines: Vec<PipelineVerdict>,
    /// The internal store, when configured with a usable URL
    pub default_output: Option<OutputTarget>,
}

/// Validate `spec` against the reserved names in `config` and the secrets
/// visible through `secrets`.
pub fn validate(
    spec: &ClusterLogForwarderSpec,
    config: &GeneratorConfig,
    secrets: &dyn SecretLookup,
) -> Validation {
    let output_names = count_names(spec.outputs.iter().map(|o| o.name.as_str()));
    let outputs: Vec<OutputVerdict> = spec
        .outputs
        .iter()
        .map(|output| validate_output(output, &output_names, config, secrets))
        .collect();

    let input_names = count_names(spec.inputs.iter().map(|i| i.name.as_str()));
    let inputs: Vec<InputVerdict> = spec
        .inputs
        .iter()
        .map(|input| validate_input(input, &input_names, config))
        .collect();

    let default_output = config.default_output.as_ref().and_then(|default| {
        let endpoint = Endpoint::parse(OutputType::Elasticsearch, &default.url);
        if endpoint.is_none() {
            warn!(url = %default.url, "Ignoring default output with an invalid URL");
        }
        endpoint.map(|endpoint| OutputTarget {
            name: DEFAULT_OUTPUT_NAME.to_string(),
            output_type: OutputType::Elasticsearch,
            endpoint,
            secret: default.secret_name.clone().filter(|s| !s.is_empty()),
        })
    });

    let accepted_outputs: BTreeSet<&str> = outputs
        .iter()
        .filter(|v| v.target.is_some())
        .map(|v| v.name.as_str())
        .collect();
    let accepted_inputs: BTreeMap<&str, &LiveSource> = inputs
        .iter()
        .filter_map(|v| v.source.as_ref().map(|s| (v.name.as_str(), s)))
        .collect();

    let resolver = RefResolver {
        outputs: &accepted_outputs,
        inputs: &accepted_inputs,
        has_default_output: default_output.is_some(),
    };

    let pipeline_names = count_names(spec.pipelines.iter().map(|p| p.name.as_str()));
    let pipelines: Vec<PipelineVerdict> = spec
        .pipelines
        .iter()
        .map(|pipeline| validate_pipeline(pipeline, &pipeline_names, config, &resolver))
        .collect();

    debug!(
        outputs = outputs.len(),
        accepted_outputs = accepted_outputs.len(),
        inputs = inputs.len(),
        pipelines = pipelines.len(),
        "Validated forwarder spec"
    );

    Validation {
        outputs,
        inputs,
        pipelines,
        default_output,
    }
}

fn count_names<'a>(names: impl Iterator<Item = &'a str>) -> BTreeMap<&'a str, usize> {
    let mut counts = BTreeMap::new();
    for name in names.map(str::trim).filter(|n| !n.is_empty()) {
        *counts.entry(name).or_insert(0) += 1;
    }
    counts
}

fn is_duplicate(counts: &BTreeMap<&str, usize>, name: &str) -> bool {
    counts.get(name).copied().unwrap_or(0) > 1
}

fn validate_output(
    output: &OutputSpec,
    names: &BTreeMap<&str, usize>,
    config: &GeneratorConfig,
    secrets: &dyn SecretLookup,
) -> OutputVerdict {
    let mut reasons = BTreeSet::new();
    let name = output.name.trim();

    if name.is_empty() {
        reasons.insert(OutputReason::MissingName);
    } else {
        if is_duplicate(names, name) {
            reasons.insert(OutputReason::NonUniqueName);
        }
        if config.reserved_names.contains(name) {
            reasons.insert(OutputReason::ReservedNameConflict);
        }
    }

    let output_type = match output.output_type.as_deref().map(str::trim) {
        None | Some("") => {
            reasons.insert(OutputReason::MissingType);
            None
        }
        Some(raw) => {
            let parsed = OutputType::parse(raw);
            if parsed.is_none() {
                reasons.insert(OutputReason::UnrecognizedType);
            }
            parsed
        }
    };

    let url = output.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let endpoint = match (output_type, url) {
        (Some(output_type), Some(url)) => Endpoint::parse(output_type, url),
        _ => None,
    };
    // Without a known type the scheme of a present URL cannot be judged.
    if url.is_none() || (output_type.is_some() && endpoint.is_none()) {
        reasons.insert(OutputReason::MissingEndpoint);
    }

    let secret = output.secret.as_ref().map(|s| s.name.trim().to_string());
    match secret.as_deref() {
        Some("") => {
            reasons.insert(OutputReason::MissingSecretName);
        }
        Some(secret_name) if !secrets.exists(secret_name) => {
            reasons.insert(OutputReason::SecretDoesNotExist);
        }
        _ => {}
    }

    let target = match (output_type, endpoint) {
        (Some(output_type), Some(endpoint)) if reasons.is_empty() => Some(OutputTarget {
            name: name.to_string(),
            output_type,
            endpoint,
            secret,
        }),
        _ => None,
    };

    if !reasons.is_empty() {
        debug!(output = %output.name, ?reasons, "Output dropped");
    }

    OutputVerdict {
        name: name.to_string(),
        reasons,
        target,
    }
}

fn validate_input(
    input: &InputSpec,
    names: &BTreeMap<&str, usize>,
    config: &GeneratorConfig,
) -> InputVerdict {
    let mut reasons = BTreeSet::new();
    let name = input.name.trim();

    if name.is_empty() {
        reasons.insert(InputReason::MissingName);
    } else {
        if is_duplicate(names, name) {
            reasons.insert(InputReason::NonUniqueName);
        }
        if config.reserved_names.contains(name) || SourceKind::parse(name).is_some() {
            reasons.insert(InputReason::ReservedNameConflict);
        }
    }

    let kind = match input.source.as_deref().map(str::trim) {
        None | Some("") => {
            reasons.insert(InputReason::MissingSource);
            None
        }
        Some(raw) => {
            let kind = SourceKind::parse(raw);
            if kind.is_none() {
                reasons.insert(InputReason::UnrecognizedSource);
            }
            kind
        }
    };

    let namespaces = kind
        .map(|kind| namespaces_for(kind, &input.namespaces))
        .unwrap_or_default();
    if let Some(invalid) = namespaces.iter().find(|ns| !is_namespace_name(ns)) {
        debug!(input = %name, namespace = %invalid, "Invalid namespace on input");
        reasons.insert(InputReason::InvalidNamespace);
    }

    let source = match kind {
        Some(kind) if reasons.is_empty() => Some(LiveSource {
            name: name.to_string(),
            kind,
            namespaces,
        }),
        _ => None,
    };

    InputVerdict {
        name: name.to_string(),
        reasons,
        source,
    }
}

/// Namespace filters only narrow application logs.
fn namespaces_for(kind: SourceKind, declared: &[String]) -> Vec<String> {
    if kind != SourceKind::Application {
        if !declared.is_empty() {
            warn!(source = %kind, "Ignoring namespaces on a non-application input");
        }
        return Vec::new();
    }
    let unique: BTreeSet<String> = declared
        .iter()
        .map(|ns| ns.trim().to_string())
        .filter(|ns| !ns.is_empty())
        .collect();
    unique.into_iter().collect()
}

/// Namespace names are DNS-1123 labels; anything else would also break the
/// collector tag pattern built from them.
fn is_namespace_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

struct RefResolver<'a> {
    outputs: &'a BTreeSet<&'a str>,
    inputs: &'a BTreeMap<&'a str, &'a LiveSource>,
    has_default_output: bool,
}

impl RefResolver<'_> {
    fn output(&self, reference: &str) -> bool {
        self.outputs.contains(reference)
            || (reference == DEFAULT_OUTPUT_NAME && self.has_default_output)
    }

    fn input(&self, reference: &str) -> Option<LiveSource> {
        if let Some(source) = self.inputs.get(reference) {
            return Some((*source).clone());
        }
        SourceKind::parse(reference).map(LiveSource::builtin)
    }
}

fn validate_pipeline(
    pipeline: &PipelineSpec,
    names: &BTreeMap<&str, usize>,
    config: &GeneratorConfig,
    resolver: &RefResolver<'_>,
) -> PipelineVerdict {
    let mut reasons = BTreeSet::new();
    let name = pipeline.name.trim();

    if name.is_empty() {
        reasons.insert(PipelineReason::MissingName);
    } else {
        if is_duplicate(names, name) {
            reasons.insert(PipelineReason::NonUniqueName);
        }
        if config.reserved_names.contains(name) {
            reasons.insert(PipelineReason::ReservedNameConflict);
        }
    }

    let mut inputs: Vec<LiveSource> = Vec::new();
    let mut unresolved_inputs = Vec::new();
    for reference in unique_refs(&pipeline.input_refs) {
        match resolver.input(reference) {
            Some(source) => inputs.push(source),
            None => unresolved_inputs.push(reference.to_string()),
        }
    }
    if pipeline.input_refs.iter().all(|r| r.trim().is_empty()) {
        reasons.insert(PipelineReason::MissingSource);
    } else {
        if !unresolved_inputs.is_empty() {
            reasons.insert(PipelineReason::UnrecognizedSource);
        }
        if inputs.is_empty() {
            reasons.insert(PipelineReason::MissingSource);
        }
    }

    let mut outputs = Vec::new();
    let mut unresolved_outputs = Vec::new();
    for reference in unique_refs(&pipeline.output_refs) {
        if resolver.output(reference) {
            outputs.push(reference.to_string());
        } else {
            unresolved_outputs.push(reference.to_string());
        }
    }
    if !unresolved_outputs.is_empty() {
        reasons.insert(PipelineReason::UnrecognizedOutput);
    }
    if outputs.is_empty() {
        reasons.insert(PipelineReason::MissingOutputs);
    }

    PipelineVerdict {
        name: name.to_string(),
        reasons,
        inputs,
        outputs,
        unresolved_inputs,
        unresolved_outputs,
    }
}

/// Non-empty refs in first-seen order without repeats
fn unique_refs(refs: &[String]) -> impl Iterator<Item = &str> {
    let mut seen = BTreeSet::new();
    refs.iter()
        .map(|r| r.trim())
        .filter(move |r| !r.is_empty() && seen.insert(*r))
}
