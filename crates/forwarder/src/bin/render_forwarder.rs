/*
 * Log Forwarder - ClusterLogForwarder to collector configuration compiler
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! render-forwarder - render collector configuration for a ClusterLogForwarder.
//!
//! # Examples
//!
//! ```bash
//! # Render fluent.conf, treating the listed secrets as present
//! render-forwarder render --spec forwarder.yaml --secret es-secret
//!
//! # Show the resulting status instead
//! render-forwarder render --spec forwarder.yaml --output status
//!
//! # Check secrets against a live namespace and emit the ConfigMap
//! render-forwarder render --spec forwarder.yaml --secrets-namespace openshift-logging --output config-map
//!
//! # Print the CustomResourceDefinition
//! render-forwarder crd
//! ```

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use forwarder::crds::{ClusterLogForwarder, ClusterLogForwarderSpec};
use forwarder::manifest::collector_config_map;
use forwarder::{ForwarderGenerator, GeneratorConfig, SecretSnapshot};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, CustomResourceExt};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "render-forwarder")]
#[command(about = "Compile ClusterLogForwarder specs into collector configuration")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true, env = "FORWARDER_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a spec and render its collector configuration
    Render(RenderArgs),

    /// Print the ClusterLogForwarder CustomResourceDefinition as YAML
    Crd,
}

#[derive(clap::Args)]
struct RenderArgs {
    /// ClusterLogForwarder YAML, either the full resource or just its spec
    #[arg(long)]
    spec: PathBuf,

    /// Generator configuration YAML
    #[arg(long, env = "FORWARDER_CONFIG")]
    config: Option<PathBuf>,

    /// Secret name to treat as present (repeatable)
    #[arg(long = "secret")]
    secrets: Vec<String>,

    /// Look up secrets in this namespace of the current cluster instead
    #[arg(long, conflicts_with = "secrets")]
    secrets_namespace: Option<String>,

    /// Apply BUFFER_* / FLUSH_* / RETRY_* overrides from the environment
    #[arg(long)]
    buffer_from_env: bool,

    /// What to print
    #[arg(short, long, default_value = "config")]
    output: OutputKind,

    /// ConfigMap name for `--output config-map`
    #[arg(long, default_value = "collector")]
    name: String,

    /// ConfigMap namespace for `--output config-map`
    #[arg(long, default_value = "openshift-logging")]
    namespace: String,

    /// Fail unless every pipeline, output and input is accepted
    #[arg(long)]
    strict: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputKind {
    /// fluent.conf text
    #[default]
    Config,
    /// Status subresource as YAML
    Status,
    /// ConfigMap manifest as YAML
    ConfigMap,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Render(args) => render(args).await,
        Commands::Crd => {
            let crd = serde_yaml::to_string(&ClusterLogForwarder::crd())
                .context("Failed to serialize CRD")?;
            print!("{crd}");
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    // stdout carries the rendered output
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn render(args: RenderArgs) -> Result<()> {
    let forwarder = load_forwarder(&args.spec)?;

    let mut config = match &args.config {
        Some(path) => GeneratorConfig::from_file(path)?,
        None => GeneratorConfig::default(),
    };
    if args.buffer_from_env {
        config.buffer = config.buffer.overlay(|key| std::env::var(key).ok());
    }

    let secrets = match &args.secrets_namespace {
        Some(namespace) => {
            let client = kube::Client::try_default()
                .await
                .context("Failed to connect to Kubernetes cluster")?;
            let api: Api<Secret> = Api::namespaced(client, namespace);
            SecretSnapshot::fetch(&api)
                .await
                .with_context(|| format!("Failed to list secrets in {namespace}"))?
        }
        None => SecretSnapshot::from_names(args.secrets.iter().cloned()),
    };
    info!(secrets = secrets.len(), "Using secret snapshot");

    let generator = ForwarderGenerator::new(&config, &secrets);
    let generation = match &forwarder {
        Forwarder::Resource(resource) => generator.generate_resource(resource)?,
        Forwarder::Spec(spec) => generator.generate(spec)?,
    };

    match args.output {
        OutputKind::Config => print!("{}", generation.config.text),
        OutputKind::Status => print!("{}", serde_yaml::to_string(&generation.status)?),
        OutputKind::ConfigMap => {
            let cm = collector_config_map(&args.name, &args.namespace, &generation.config);
            print!("{}", serde_yaml::to_string(&cm)?);
        }
    }
    eprintln!("fingerprint: {}", generation.config.fingerprint);

    if !generation.status.is_ready() {
        warn!("Forwarder is not ready; see status conditions");
        if args.strict {
            bail!("forwarder is not ready");
        }
    }
    if !generation.status.all_accepted() {
        warn!("Some pipelines, outputs or inputs were not accepted; see status");
        if args.strict {
            bail!("forwarder spec is not fully accepted");
        }
    }
    Ok(())
}

enum Forwarder {
    Resource(Box<ClusterLogForwarder>),
    Spec(ClusterLogForwarderSpec),
}

/// Read YAML holding either a whole resource or a bare spec
fn load_forwarder(path: &Path) -> Result<Forwarder> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document: serde_yaml::Value = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    if document.get("spec").is_some() && document.get("metadata").is_some() {
        let resource = serde_yaml::from_value(document)
            .with_context(|| format!("Invalid ClusterLogForwarder in {}", path.display()))?;
        return Ok(Forwarder::Resource(Box::new(resource)));
    }
    let spec = match document.get("spec") {
        Some(spec) => spec.clone(),
        None => document,
    };
    let spec = serde_yaml::from_value(spec)
        .with_context(|| format!("Invalid forwarder spec in {}", path.display()))?;
    Ok(Forwarder::Spec(spec))
}
