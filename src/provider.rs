use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::{
    config::{Backend, Config},
    dns::{Changes, Endpoint},
    memory::InMemoryProvider,
    pdns::PdnsProvider,
};

// ─────────────────────────────────────────────────────────────────────────────
// Provider capability
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The backend could not be reached or answered with an error.
    #[error("backend unavailable: {0:#}")]
    BackendUnavailable(anyhow::Error),

    /// The backend refused the change batch.
    #[error("invalid change batch: {0}")]
    Validation(String),
}

/// The record operations the HTTP adapter delegates to.
///
/// Implementations are shared across concurrently running requests, so they
/// must not assume any ordering between calls. A failed `apply_changes` is
/// always reported as an error, but a backend that writes in several steps
/// may leave the steps that already succeeded in place.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Every record the backend currently manages.
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError>;

    async fn apply_changes(&self, changes: Changes) -> Result<(), ProviderError>;

    /// Normalise candidate endpoints before the orchestrator plans a diff.
    /// Must not touch backend state.
    fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        endpoints
    }

    /// Whether a provider-specific property changed between two plans.
    fn property_values_equal(&self, _name: &str, previous: &str, current: &str) -> bool {
        previous == current
    }
}

/// Build the configured backend, wrapped in [`DryRun`] when requested.
pub fn from_config(cfg: &Config) -> anyhow::Result<Arc<dyn Provider>> {
    let domain_filter = cfg.domain_filter();
    let inner: Arc<dyn Provider> = match cfg.provider {
        Backend::Memory => Arc::new(
            InMemoryProvider::new(&cfg.record_prefix, domain_filter)
                .with_owner_filter(cfg.pre_filter_external_owned_records.then(|| cfg.txt_owner_id.clone())),
        ),
        Backend::Pdns => Arc::new(PdnsProvider::new(cfg.pdns(), domain_filter)?),
    };

    if cfg.dry_run {
        info!("running in dry-run mode; no changes to DNS records will be made");
        return Ok(Arc::new(DryRun::new(inner)));
    }
    Ok(inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Dry run
// ─────────────────────────────────────────────────────────────────────────────

/// Reads go to the wrapped provider; change batches are only logged.
pub struct DryRun {
    inner: Arc<dyn Provider>,
}

impl DryRun {
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Provider for DryRun {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        self.inner.records().await
    }

    async fn apply_changes(&self, changes: Changes) -> Result<(), ProviderError> {
        for ep in &changes.delete {
            info!(dry_run = true, "DELETE {} {}", ep.record_type, ep.dns_name);
        }
        for (old, new) in changes.update_old.iter().zip(&changes.update_new) {
            info!(
                dry_run = true,
                "UPDATE {} {} {:?} → {:?}",
                new.record_type, new.dns_name, old.targets, new.targets
            );
        }
        for ep in &changes.create {
            info!(dry_run = true, "CREATE {} {} {:?}", ep.record_type, ep.dns_name, ep.targets);
        }
        Ok(())
    }

    fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        self.inner.adjust_endpoints(endpoints)
    }

    fn property_values_equal(&self, name: &str, previous: &str, current: &str) -> bool {
        self.inner.property_values_equal(name, previous, current)
    }
}
