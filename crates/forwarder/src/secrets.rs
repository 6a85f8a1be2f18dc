//! Secret existence lookups
//!
//! Validation only needs to know whether a named secret exists. The lookup is
//! injected so the generator itself never performs I/O; callers that talk to
//! a cluster take a [`SecretSnapshot`] first and hand that in.

use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Answers whether a secret with the given name exists
pub trait SecretLookup {
    fn exists(&self, name: &str) -> bool;
}

impl SecretLookup for BTreeSet<String> {
    fn exists(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl SecretLookup for HashSet<String> {
    fn exists(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl<T: SecretLookup + ?Sized> SecretLookup for &T {
    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }
}

/// Point-in-time view of the secret names in a namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretSnapshot {
    names: BTreeSet<String>,
}

impl SecretSnapshot {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// List secret names through the API server (metadata only)
    pub async fn fetch(api: &Api<Secret>) -> Result<Self, kube::Error> {
        let list = api.list_metadata(&ListParams::default()).await?;
        let snapshot = Self::from_names(list.items.into_iter().filter_map(|s| s.metadata.name));
        debug!(count = snapshot.len(), "Fetched secret snapshot");
        Ok(snapshot)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl SecretLookup for SecretSnapshot {
    fn exists(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}
