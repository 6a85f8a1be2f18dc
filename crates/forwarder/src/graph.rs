//! Routing graph
//!
//! The intermediate form between the live spec and the rendered text. A
//! label exists for every source a live pipeline reads, a store for every
//! output at least one label routes to, and an edge for every distinct
//! (source, output) pair. Everything is kept sorted so rendering never
//! depends on declaration order.

use crate::config::{BufferTuning, GeneratorConfig};
use crate::crds::{OutputType, SourceKind};
use crate::error::{GenerateError, Result};
use crate::fingerprint::digest_hex;
use crate::resolve::LiveSpec;
use crate::validation::{Endpoint, LiveSource, OutputTarget};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const RETRY_PREFIX: &str = "retry_";

/// Files inside a mounted output secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub key: String,
    pub cert: String,
    pub ca_bundle: String,
}

/// Second store variant fed by records re-emitted after a failed flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPath {
    /// Tag the normal variant re-emits failed chunks under
    pub tag: String,
    pub id: String,
    pub buffer_path: String,
}

/// A source label: where records of one source are collected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLabel {
    pub source: String,
    pub kind: SourceKind,
    pub label: String,
    pub namespaces: Vec<String>,
}

impl SourceLabel {
    /// Tags accepted inside the label; empty means everything routed in
    pub fn namespace_tags(&self) -> Vec<String> {
        self.namespaces
            .iter()
            .map(|ns| format!("kubernetes.var.log.containers.**_{ns}_**"))
            .collect()
    }
}

/// A store: one live output with everything needed to render it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    pub output: String,
    pub output_type: OutputType,
    pub endpoint: Endpoint,
    pub label: String,
    pub id: String,
    pub buffer_path: String,
    pub tls: Option<TlsMaterial>,
    /// File holding the forward protocol shared key
    pub shared_key_path: Option<String>,
    pub retry: Option<RetryPath>,
    pub buffer: BufferTuning,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub source: String,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingGraph {
    labels: Vec<SourceLabel>,
    stores: Vec<Store>,
    edges: BTreeSet<Edge>,
}

impl RoutingGraph {
    /// Build the graph for `live`.
    ///
    /// Fails only when the live spec references an output it does not
    /// carry, which the resolver never produces. Any set of names gets
    /// distinct labels.
    pub fn build(live: &LiveSpec, config: &GeneratorConfig) -> Result<Self> {
        let mut sources: BTreeMap<&str, &LiveSource> = BTreeMap::new();
        let mut edges = BTreeSet::new();

        for pipeline in &live.pipelines {
            for input in &pipeline.inputs {
                sources.entry(input.name.as_str()).or_insert(input);
                for output in &pipeline.outputs {
                    if live.output(output).is_none() {
                        return Err(GenerateError::DanglingEdge {
                            input: input.name.clone(),
                            output: output.clone(),
                        });
                    }
                    edges.insert(Edge {
                        source: input.name.clone(),
                        output: output.clone(),
                    });
                }
            }
        }

        let targeted: BTreeSet<&str> = edges.iter().map(|e| e.output.as_str()).collect();
        let mut targets: Vec<&OutputTarget> = live
            .outputs
            .iter()
            .filter(|o| targeted.contains(o.name.as_str()))
            .collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));

        let nodes: Vec<Node<'_>> = sources
            .keys()
            .map(|name| Node::Source(*name))
            .chain(targets.iter().map(|t| Node::Output(t.name.as_str())))
            .collect();
        let mut names = allocate_labels(&nodes).into_iter();

        let labels = sources
            .values()
            .zip(names.by_ref())
            .map(|(source, label)| SourceLabel {
                source: source.name.clone(),
                kind: source.kind,
                label,
                namespaces: source.namespaces.clone(),
            })
            .collect::<Vec<_>>();

        let stores = targets
            .into_iter()
            .zip(names)
            .map(|(target, label)| store_for(target, label, config))
            .collect::<Vec<_>>();

        debug!(
            labels = labels.len(),
            stores = stores.len(),
            edges = edges.len(),
            "Built routing graph"
        );

        Ok(Self {
            labels,
            stores,
            edges,
        })
    }

    /// Source labels ordered by source name
    pub fn labels(&self) -> &[SourceLabel] {
        &self.labels
    }

    /// Stores ordered by output name
    pub fn stores(&self) -> &[Store] {
        &self.stores
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, source: &str, output: &str) -> bool {
        self.edges.contains(&Edge {
            source: source.to_string(),
            output: output.to_string(),
        })
    }

    pub fn label(&self, source: &str) -> Option<&SourceLabel> {
        self.labels
            .binary_search_by(|l| l.source.as_str().cmp(source))
            .ok()
            .map(|i| &self.labels[i])
    }

    pub fn store(&self, output: &str) -> Option<&Store> {
        self.stores
            .binary_search_by(|s| s.output.as_str().cmp(output))
            .ok()
            .map(|i| &self.stores[i])
    }

    /// Stores reachable from `source`, ordered by output name
    pub fn targets<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Store> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source == source)
            .filter_map(move |e| self.store(&e.output))
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Node<'a> {
    Source(&'a str),
    Output(&'a str),
}

impl Node<'_> {
    fn base_label(&self) -> String {
        match self {
            Node::Source(name) => format!("@_{}", sanitize(name)),
            Node::Output(name) => format!("@{}", sanitize(name)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Node::Source(name) => format!("source:{name}"),
            Node::Output(name) => format!("output:{name}"),
        }
    }

    /// Collector names taken by giving this node `label`
    fn claims(&self, label: &str) -> Vec<String> {
        match self {
            Node::Source(_) => vec![label.to_string()],
            Node::Output(_) => {
                let retry = format!(
                    "@{}{}",
                    RETRY_PREFIX.to_ascii_uppercase(),
                    label.trim_start_matches('@')
                );
                vec![label.to_string(), retry]
            }
        }
    }
}

/// Upper-case the name and replace anything outside `[A-Z0-9]` with `_`
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Assign a label to every node, returned in the order of `nodes`.
///
/// An output label also claims the label its retry id maps to
/// (`@RETRY_<X>` for `@X`), since store ids and retry ids share one
/// namespace in the collector. Nodes whose claims overlap all get a suffix
/// taken from a digest of their original name, lengthened until no claim
/// is taken. Contested nodes are settled in sorted order so the result
/// does not depend on declaration order.
fn allocate_labels(nodes: &[Node<'_>]) -> Vec<String> {
    let mut claim_counts: BTreeMap<String, usize> = BTreeMap::new();
    for node in nodes {
        for claim in node.claims(&node.base_label()) {
            *claim_counts.entry(claim).or_insert(0) += 1;
        }
    }

    let mut taken: BTreeSet<String> = BTreeSet::new();
    let mut assigned: BTreeMap<Node<'_>, String> = BTreeMap::new();
    let mut contested: Vec<Node<'_>> = Vec::new();
    for node in nodes {
        let base = node.base_label();
        let claims = node.claims(&base);
        if claims.iter().any(|c| claim_counts.get(c).copied().unwrap_or(0) > 1) {
            contested.push(*node);
        } else {
            taken.extend(claims);
            assigned.insert(*node, base);
        }
    }

    contested.sort();
    for node in contested {
        let label = suffixed_label(&node, &taken);
        debug!(node = %node.describe(), %label, "Disambiguated collector label");
        taken.extend(node.claims(&label));
        assigned.insert(node, label);
    }

    nodes.iter().filter_map(|node| assigned.remove(node)).collect()
}

/// First `<base>_<digest prefix>` (then `_<n>`) whose claims are all free
fn suffixed_label(node: &Node<'_>, taken: &BTreeSet<String>) -> String {
    let base = node.base_label();
    let digest = digest_hex(&node.describe()).to_ascii_uppercase();
    let is_free = |label: &str| node.claims(label).iter().all(|c| !taken.contains(c));

    for width in [8, 16, 32, digest.len()] {
        let candidate = format!("{base}_{}", &digest[..width]);
        if is_free(&candidate) {
            return candidate;
        }
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}_{}_{n}", &digest[..8]);
        if is_free(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn store_for(target: &OutputTarget, label: String, config: &GeneratorConfig) -> Store {
    let id = label.trim_start_matches('@').to_ascii_lowercase();

    let tls = target.secret.as_deref().map(|secret| TlsMaterial {
        key: config.secret_path(secret, "tls.key"),
        cert: config.secret_path(secret, "tls.crt"),
        ca_bundle: config.secret_path(secret, "ca-bundle.crt"),
    });

    let shared_key_path = match (target.output_type, target.secret.as_deref()) {
        (OutputType::FluentdForward, Some(secret)) => {
            Some(config.secret_path(secret, "shared_key"))
        }
        _ => None,
    };

    let retry = target.output_type.supports_retry_tag().then(|| {
        let retry_id = format!("{RETRY_PREFIX}{id}");
        RetryPath {
            tag: retry_id.clone(),
            buffer_path: config.buffer_path(&retry_id),
            id: retry_id,
        }
    });

    Store {
        output: target.name.clone(),
        output_type: target.output_type,
        endpoint: target.endpoint.clone(),
        buffer_path: config.buffer_path(&id),
        label,
        id,
        tls,
        shared_key_path,
        retry,
        buffer: config.buffer.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::LivePipeline;

    fn target(name: &str, output_type: OutputType, secret: Option<&str>) -> OutputTarget {
        let scheme = match output_type {
            OutputType::Elasticsearch => "https",
            _ => "tcp",
        };
        OutputTarget {
            name: name.to_string(),
            output_type,
            endpoint: Endpoint {
                scheme: scheme.to_string(),
                host: format!("{}.example.com", name.to_lowercase()),
                port: output_type.default_port(),
            },
            secret: secret.map(str::to_string),
        }
    }

    fn builtin(kind: SourceKind) -> LiveSource {
        LiveSource {
            name: kind.as_str().to_string(),
            kind,
            namespaces: Vec::new(),
        }
    }

    fn live_pipeline(name: &str, inputs: Vec<LiveSource>, outputs: &[&str]) -> LivePipeline {
        LivePipeline {
            name: name.to_string(),
            inputs,
            outputs: outputs.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn three_pipelines() -> LiveSpec {
        use SourceKind::*;
        LiveSpec {
            outputs: vec![
                target("Z", OutputType::Elasticsearch, None),
                target("X", OutputType::Elasticsearch, None),
                target("Y", OutputType::Elasticsearch, None),
            ],
            pipelines: vec![
                live_pipeline("P1", vec![builtin(Application)], &["X", "Y"]),
                live_pipeline("P2", vec![builtin(Infrastructure)], &["Y", "Z"]),
                live_pipeline("P3", vec![builtin(Audit)], &["X", "Y", "Z"]),
            ],
        }
    }

    #[test]
    fn test_three_sources_three_outputs() {
        let graph = RoutingGraph::build(&three_pipelines(), &GeneratorConfig::default()).unwrap();

        let labels: Vec<_> = graph.labels().iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["@_APPLICATION", "@_AUDIT", "@_INFRASTRUCTURE"]);
        let stores: Vec<_> = graph.stores().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(stores, vec!["@X", "@Y", "@Z"]);

        assert_eq!(graph.edge_count(), 7);
        for (source, output) in [
            ("application", "X"),
            ("application", "Y"),
            ("infrastructure", "Y"),
            ("infrastructure", "Z"),
            ("audit", "X"),
            ("audit", "Y"),
            ("audit", "Z"),
        ] {
            assert!(graph.has_edge(source, output), "{source} -> {output}");
        }
        assert!(!graph.has_edge("application", "Z"));
    }

    #[test]
    fn test_edges_are_deduplicated() {
        let live = LiveSpec {
            outputs: vec![target("X", OutputType::Elasticsearch, None)],
            pipelines: vec![
                live_pipeline("a", vec![builtin(SourceKind::Audit)], &["X"]),
                live_pipeline("b", vec![builtin(SourceKind::Audit)], &["X"]),
            ],
        };
        let graph = RoutingGraph::build(&live, &GeneratorConfig::default()).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.labels().len(), 1);
    }

    #[test]
    fn test_untargeted_outputs_get_no_store() {
        let mut live = three_pipelines();
        live.outputs.push(target("unused", OutputType::Syslog, None));
        let graph = RoutingGraph::build(&live, &GeneratorConfig::default()).unwrap();
        assert!(graph.store("unused").is_none());
        assert_eq!(graph.stores().len(), 3);
    }

    #[test]
    fn test_dangling_edge_is_a_fault() {
        let live = LiveSpec {
            outputs: Vec::new(),
            pipelines: vec![live_pipeline("p", vec![builtin(SourceKind::Audit)], &["ghost"])],
        };
        let err = RoutingGraph::build(&live, &GeneratorConfig::default()).unwrap_err();
        assert!(matches!(err, GenerateError::DanglingEdge { ref output, .. } if output == "ghost"));
    }

    #[test]
    fn test_targets_follow_output_order() {
        let graph = RoutingGraph::build(&three_pipelines(), &GeneratorConfig::default()).unwrap();
        let outputs: Vec<_> = graph.targets("audit").map(|s| s.output.as_str()).collect();
        assert_eq!(outputs, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_label_sanitizing() {
        assert_eq!(sanitize("es-app.logs"), "ES_APP_LOGS");
        assert_eq!(sanitize("Remote1"), "REMOTE1");
    }

    #[test]
    fn test_colliding_labels_get_suffixes() {
        let live = LiveSpec {
            outputs: vec![
                target("es-app", OutputType::Elasticsearch, None),
                target("es_app", OutputType::Elasticsearch, None),
            ],
            pipelines: vec![live_pipeline(
                "p",
                vec![builtin(SourceKind::Application)],
                &["es_app", "es-app"],
            )],
        };
        let graph = RoutingGraph::build(&live, &GeneratorConfig::default()).unwrap();
        let a = &graph.store("es-app").unwrap().label;
        let b = &graph.store("es_app").unwrap().label;
        assert_ne!(a, b);
        assert!(a.starts_with("@ES_APP_"));
        assert!(b.starts_with("@ES_APP_"));

        // same suffixes regardless of declaration order
        let mut reordered = live.clone();
        reordered.outputs.reverse();
        let again = RoutingGraph::build(&reordered, &GeneratorConfig::default()).unwrap();
        assert_eq!(&again.store("es-app").unwrap().label, a);
    }

    #[test]
    fn test_source_and_output_labels_never_collide() {
        let live = LiveSpec {
            outputs: vec![target("_audit", OutputType::Syslog, None)],
            pipelines: vec![live_pipeline("p", vec![builtin(SourceKind::Audit)], &["_audit"])],
        };
        let graph = RoutingGraph::build(&live, &GeneratorConfig::default()).unwrap();
        let source = &graph.label("audit").unwrap().label;
        let store = &graph.store("_audit").unwrap().label;
        assert_ne!(source, store);
    }

    #[test]
    fn test_store_paths_and_retry() {
        let live = LiveSpec {
            outputs: vec![
                target("es-secure", OutputType::Elasticsearch, Some("es-secret")),
                target("fwd", OutputType::FluentdForward, Some("fwd-secret")),
            ],
            pipelines: vec![live_pipeline(
                "p",
                vec![builtin(SourceKind::Audit)],
                &["es-secure", "fwd"],
            )],
        };
        let graph = RoutingGraph::build(&live, &GeneratorConfig::default()).unwrap();

        let es = graph.store("es-secure").unwrap();
        assert_eq!(es.id, "es_secure");
        assert_eq!(es.buffer_path, "/var/lib/fluentd/es_secure");
        let retry = es.retry.as_ref().unwrap();
        assert_eq!(retry.tag, "retry_es_secure");
        assert_eq!(retry.buffer_path, "/var/lib/fluentd/retry_es_secure");
        let tls = es.tls.as_ref().unwrap();
        assert_eq!(tls.key, "/var/run/ocp-collector/secrets/es-secret/tls.key");
        assert_eq!(tls.ca_bundle, "/var/run/ocp-collector/secrets/es-secret/ca-bundle.crt");
        assert!(es.shared_key_path.is_none());

        let fwd = graph.store("fwd").unwrap();
        assert!(fwd.retry.is_none());
        assert_eq!(
            fwd.shared_key_path.as_deref(),
            Some("/var/run/ocp-collector/secrets/fwd-secret/shared_key")
        );
    }

    #[test]
    fn test_overlapping_pipelines_share_edges() {
        use SourceKind::*;
        let live = LiveSpec {
            outputs: vec![
                target("X", OutputType::Elasticsearch, None),
                target("Y", OutputType::Elasticsearch, None),
                target("Z", OutputType::Elasticsearch, None),
            ],
            pipelines: vec![
                live_pipeline("P1", vec![builtin(Application)], &["X", "Y"]),
                live_pipeline("P2", vec![builtin(Infrastructure), builtin(Audit)], &["Y", "Z"]),
                live_pipeline("P3", vec![builtin(Audit)], &["X", "Z"]),
            ],
        };
        let graph = RoutingGraph::build(&live, &GeneratorConfig::default()).unwrap();

        assert_eq!(graph.labels().len(), 3);
        assert_eq!(graph.stores().len(), 3);
        // audit -> Z is declared by both P2 and P3
        assert_eq!(graph.edge_count(), 7);
        let audit: Vec<_> = graph.targets("audit").map(|s| s.output.as_str()).collect();
        assert_eq!(audit, vec!["X", "Y", "Z"]);
        assert!(!graph.has_edge("application", "Z"));
        assert!(!graph.has_edge("infrastructure", "X"));
    }

    #[test]
    fn test_store_ids_never_shadow_retry_ids() {
        let live = LiveSpec {
            outputs: vec![
                target("es", OutputType::Elasticsearch, None),
                target("retry_es", OutputType::Elasticsearch, None),
            ],
            pipelines: vec![live_pipeline(
                "p",
                vec![builtin(SourceKind::Application)],
                &["es", "retry_es"],
            )],
        };
        let graph = RoutingGraph::build(&live, &GeneratorConfig::default()).unwrap();

        let mut ids = BTreeSet::new();
        let mut paths = BTreeSet::new();
        for store in graph.stores() {
            assert!(ids.insert(store.id.clone()), "duplicate id {}", store.id);
            assert!(paths.insert(store.buffer_path.clone()));
            let retry = store.retry.as_ref().unwrap();
            assert!(ids.insert(retry.id.clone()), "duplicate id {}", retry.id);
            assert!(paths.insert(retry.buffer_path.clone()));
        }
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_contrived_suffix_collision_still_builds() {
        // the third name is spelled like the suffixed label of the first two
        let suffix = digest_hex("output:a-b")[..8].to_ascii_uppercase();
        let contrived = format!("A_B_{suffix}");
        let live = LiveSpec {
            outputs: vec![
                target("a-b", OutputType::Syslog, None),
                target("a_b", OutputType::Syslog, None),
                target(&contrived, OutputType::Syslog, None),
            ],
            pipelines: vec![live_pipeline(
                "p",
                vec![builtin(SourceKind::Audit)],
                &["a-b", "a_b", contrived.as_str()],
            )],
        };
        let graph = RoutingGraph::build(&live, &GeneratorConfig::default()).unwrap();

        let labels: BTreeSet<_> = graph.stores().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels.len(), 3);
        assert_eq!(graph.store(&contrived).unwrap().label, format!("@{contrived}"));
        assert!(graph.store("a-b").unwrap().label.starts_with("@A_B_"));
    }

    #[test]
    fn test_namespace_tags() {
        let label = SourceLabel {
            source: "my-apps".to_string(),
            kind: SourceKind::Application,
            label: "@_MY_APPS".to_string(),
            namespaces: vec!["dev".to_string(), "prod".to_string()],
        };
        assert_eq!(
            label.namespace_tags(),
            vec![
                "kubernetes.var.log.containers.**_dev_**",
                "kubernetes.var.log.containers.**_prod_**"
            ]
        );
    }
}
