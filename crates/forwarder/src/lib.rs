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

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Log forwarder core library
//!
//! Compiles a `ClusterLogForwarder` spec into a per-pipeline/output/input
//! status and a deterministic collector routing configuration. The pipeline
//! is synchronous and free of I/O:
//!
//! ```text
//! spec ─ validate ─ resolve ─ RoutingGraph::build ─ render ─ fingerprint
//! ```
//!
//! The only external capability is the injected [`SecretLookup`].

pub mod config;
pub mod crds;
pub mod error;
pub mod fingerprint;
pub mod generator;
pub mod graph;
pub mod manifest;
pub mod render;
pub mod resolve;
pub mod secrets;
pub mod status;
pub mod validation;

// Re-export commonly used types
pub use config::{BufferTuning, GeneratorConfig, ReservedNames};
pub use crds::{ClusterLogForwarder, ClusterLogForwarderSpec, OutputType, SourceKind};
pub use error::GenerateError;
pub use fingerprint::{Fingerprint, RenderedConfig};
pub use generator::{generate, ForwarderGenerator, Generation};
pub use graph::RoutingGraph;
pub use secrets::{SecretLookup, SecretSnapshot};
pub use status::{ForwarderStatus, State};
