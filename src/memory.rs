// In-memory record provider.
//
// Records live in a sorted map keyed by a SkyDNS-style path under the
// configured prefix (`/skydns/com/example/www/a`), so listings come back in
// a stable order. Nothing survives a restart.
//
// A change batch is applied to a staged copy of the map while the write lock
// is held and swapped in only when every step succeeded, so concurrent
// readers see either the whole batch or none of it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    dns::{Changes, DomainFilter, Endpoint},
    provider::{Provider, ProviderError},
};

/// Label external-dns uses to record which instance owns an endpoint.
pub const OWNER_LABEL: &str = "owner";

#[derive(Debug)]
pub struct InMemoryProvider {
    prefix: String,
    domain_filter: DomainFilter,
    owner_id: Option<String>,
    records: RwLock<BTreeMap<String, Endpoint>>,
}

impl InMemoryProvider {
    pub fn new(prefix: &str, domain_filter: DomainFilter) -> Self {
        Self {
            prefix: prefix.to_string(),
            domain_filter,
            owner_id: None,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Only list endpoints whose owner label equals `owner_id`.
    pub fn with_owner_filter(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Seed the store. Later duplicates replace earlier ones.
    pub fn with_records(self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let seeded = endpoints
            .into_iter()
            .map(|ep| (self.key(&ep), ep))
            .collect();
        Self {
            records: RwLock::new(seeded),
            ..self
        }
    }

    /// Storage key for an endpoint, e.g. `/skydns/com/example/www/a/blue`.
    pub fn key(&self, ep: &Endpoint) -> String {
        let mut key = self.prefix.trim_end_matches('/').to_string();
        for label in ep.dns_name.trim_end_matches('.').rsplit('.') {
            key.push('/');
            key.push_str(&label.to_ascii_lowercase());
        }
        key.push('/');
        key.push_str(&ep.record_type.as_str().to_ascii_lowercase());
        if let Some(id) = ep.set_identifier.as_deref().filter(|id| !id.is_empty()) {
            key.push('/');
            key.push_str(id);
        }
        key
    }

    fn owned(&self, ep: &Endpoint) -> bool {
        match &self.owner_id {
            Some(owner) => ep.labels.get(OWNER_LABEL) == Some(owner),
            None => true,
        }
    }

    fn stage(
        &self,
        mut staged: BTreeMap<String, Endpoint>,
        changes: Changes,
    ) -> Result<BTreeMap<String, Endpoint>, ProviderError> {
        if let Some(ep) = changes.endpoints().find(|ep| !self.domain_filter.matches(&ep.dns_name)) {
            return Err(ProviderError::Validation(format!(
                "{} is outside the domain filter ({})",
                ep.dns_name, self.domain_filter
            )));
        }
        if changes.update_old.len() != changes.update_new.len() {
            return Err(ProviderError::Validation(format!(
                "{} updateOld endpoint(s) paired with {} updateNew",
                changes.update_old.len(),
                changes.update_new.len()
            )));
        }

        for ep in changes.delete.iter().chain(&changes.update_old) {
            let key = self.key(ep);
            match staged.remove(&key) {
                None => {
                    return Err(ProviderError::Validation(format!(
                        "{} {} does not exist",
                        ep.record_type, ep.dns_name
                    )));
                }
                Some(stored) if !same_targets(&stored.targets, &ep.targets) => {
                    return Err(ProviderError::Validation(format!(
                        "{} {} has targets {:?}, not {:?}",
                        ep.record_type, ep.dns_name, stored.targets, ep.targets
                    )));
                }
                Some(_) => debug!(%key, "removed"),
            }
        }
        for ep in changes.update_new {
            let key = self.key(&ep);
            debug!(%key, "replaced");
            staged.insert(key, ep);
        }
        for ep in changes.create {
            let key = self.key(&ep);
            if staged.contains_key(&key) {
                return Err(ProviderError::Validation(format!(
                    "{} {} already exists",
                    ep.record_type, ep.dns_name
                )));
            }
            debug!(%key, "created");
            staged.insert(key, ep);
        }
        Ok(staged)
    }
}

/// Targets are a set; the order external-dns sends them in is not significant.
fn same_targets(stored: &[String], requested: &[String]) -> bool {
    let mut stored: Vec<&str> = stored.iter().map(String::as_str).collect();
    let mut requested: Vec<&str> = requested.iter().map(String::as_str).collect();
    stored.sort_unstable();
    requested.sort_unstable();
    stored == requested
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|ep| self.domain_filter.matches(&ep.dns_name) && self.owned(ep))
            .cloned()
            .collect())
    }

    async fn apply_changes(&self, changes: Changes) -> Result<(), ProviderError> {
        let summary = format!(
            "create={} update={} delete={}",
            changes.create.len(),
            changes.update_new.len(),
            changes.delete.len()
        );
        let mut records = self.records.write().await;
        let staged = self.stage(records.clone(), changes)?;
        *records = staged;
        info!("applied change batch ({summary}); {} record(s) stored", records.len());
        Ok(())
    }
}
