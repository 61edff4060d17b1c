use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    dns::{Changes, DomainFilter, Endpoint, RecordType},
    provider::{Provider, ProviderError},
};

// ─────────────────────────────────────────────────────────────────────────────
// PowerDNS API shapes (partial – only what we need)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneStub {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub rrsets: Vec<RrSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RrSet {
    pub name: String,
    #[serde(rename = "type")]
    pub rrtype: String,
    pub ttl: u32,
    #[serde(default)]
    pub records: Vec<Record>,
    /// Used in PATCH requests; omit on read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changetype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub content: String,
    pub disabled: bool,
}

#[derive(Debug, Serialize)]
struct Patch<'a> {
    rrsets: &'a [RrSet],
}

/// Connection settings for the PowerDNS HTTP API.
#[derive(Debug, Clone)]
pub struct PdnsConfig {
    pub api_url: String,
    pub api_key: String,
    pub server_id: String,
    pub default_ttl: u32,
}

// Annotate an Ingress or Service with
//
//   external-dns.alpha.kubernetes.io/webhook-pdns-https-target: "1 . alpn=h2,h3"
//
// and external-dns hands it to /adjustendpoints as the providerSpecific entry
// "webhook/pdns-https-target". The value is an RFC 9460 SvcParam string:
//   <priority> <target> [key=value ...]
const HTTPS_TARGET_ANNOTATION: &str = "webhook/pdns-https-target";

const MANAGED_TYPES: &[&str] = &["A", "AAAA", "CNAME", "TXT", "HTTPS", "MX", "NS", "SRV", "PTR"];

// ─────────────────────────────────────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PdnsProvider {
    http: Client,
    cfg: PdnsConfig,
    domain_filter: DomainFilter,
}

impl PdnsProvider {
    pub fn new(cfg: PdnsConfig, domain_filter: DomainFilter) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("building reqwest client")?;
        Ok(Self { http, cfg, domain_filter })
    }

    fn base(&self) -> String {
        format!(
            "{}/api/v1/servers/{}",
            self.cfg.api_url.trim_end_matches('/'),
            self.cfg.server_id
        )
    }

    async fn list_zones(&self) -> Result<Vec<ZoneStub>> {
        let resp = self
            .http
            .get(format!("{}/zones", self.base()))
            .header("X-API-Key", &self.cfg.api_key)
            .send()
            .await
            .context("GET /zones")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("PowerDNS GET /zones {status}: {body}");
        }
        resp.json().await.context("decoding zone list")
    }

    async fn get_zone(&self, zone_id: &str) -> Result<Zone> {
        let resp = self
            .http
            .get(format!("{}/zones/{}", self.base(), zone_id))
            .header("X-API-Key", &self.cfg.api_key)
            .send()
            .await
            .with_context(|| format!("GET /zones/{zone_id}"))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("PowerDNS GET zone {zone_id} → {status}");
        }
        resp.json().await.with_context(|| format!("decoding zone {zone_id}"))
    }

    async fn patch_zone(&self, zone_id: &str, rrsets: &[RrSet]) -> Result<()> {
        let resp = self
            .http
            .patch(format!("{}/zones/{}", self.base(), zone_id))
            .header("X-API-Key", &self.cfg.api_key)
            .json(&Patch { rrsets })
            .send()
            .await
            .with_context(|| format!("PATCH /zones/{zone_id}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("PowerDNS PATCH {zone_id} [{status}]: {body}");
            bail!("PowerDNS PATCH {zone_id} {status}: {body}");
        }
        Ok(())
    }

    async fn fetch_endpoints(&self) -> Result<Vec<Endpoint>> {
        let mut endpoints = Vec::new();
        for stub in self.list_zones().await? {
            let zone = self.get_zone(&stub.id).await?;
            endpoints.extend(
                zone.rrsets
                    .into_iter()
                    .filter_map(rrset_to_endpoint)
                    .filter(|ep| self.domain_filter.matches(&ep.dns_name)),
            );
        }
        Ok(endpoints)
    }
}

#[async_trait]
impl Provider for PdnsProvider {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        let endpoints = self
            .fetch_endpoints()
            .await
            .map_err(ProviderError::BackendUnavailable)?;
        debug!("PowerDNS returned {} endpoint(s)", endpoints.len());
        Ok(endpoints)
    }

    async fn apply_changes(&self, changes: Changes) -> Result<(), ProviderError> {
        if let Some(ep) = changes.endpoints().find(|ep| !self.domain_filter.matches(&ep.dns_name)) {
            return Err(ProviderError::Validation(format!(
                "{} is outside the domain filter ({})",
                ep.dns_name, self.domain_filter
            )));
        }

        let zones = self
            .list_zones()
            .await
            .map_err(ProviderError::BackendUnavailable)?;
        let patches = plan_patches(&zones, &changes, self.cfg.default_ttl)?;

        for (zone_id, rrsets) in &patches {
            for rrset in rrsets {
                info!(
                    "{} {} {} in {zone_id}",
                    rrset.changetype.as_deref().unwrap_or("?"),
                    rrset.rrtype,
                    rrset.name
                );
            }
            self.patch_zone(zone_id, rrsets)
                .await
                .map_err(ProviderError::BackendUnavailable)?;
        }
        Ok(())
    }

    // Priority of target resolution for HTTPS records:
    //   annotation (pdns-https-target) > existing targets (normalised)
    fn adjust_endpoints(&self, mut endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        for ep in endpoints.iter_mut().filter(|ep| ep.record_type == RecordType::Https) {
            if let Some(value) = ep.provider_specific(HTTPS_TARGET_ANNOTATION) {
                let target = svc_param_with_priority(value);
                info!("HTTPS {} → target from {HTTPS_TARGET_ANNOTATION}: {target}", ep.dns_name);
                ep.targets = vec![target];
                continue;
            }
            if ep.targets.is_empty() {
                warn!(
                    "HTTPS {} has no targets and no '{HTTPS_TARGET_ANNOTATION}' value; leaving as is",
                    ep.dns_name
                );
                continue;
            }
            ep.targets = ep.targets.iter().map(|t| svc_param_with_priority(t)).collect();
        }
        endpoints
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Group a change batch into one rrset list per zone.
///
/// Deletes come from `delete` and `updateOld`, replacements from `updateNew`
/// and `create`. PowerDNS rejects a PATCH that names the same rrset twice, so
/// a replacement supersedes a delete of the same name and type.
pub fn plan_patches(
    zones: &[ZoneStub],
    changes: &Changes,
    default_ttl: u32,
) -> Result<BTreeMap<String, Vec<RrSet>>, ProviderError> {
    let mut planned: BTreeMap<String, BTreeMap<(String, String), RrSet>> = BTreeMap::new();

    let removals = changes.delete.iter().chain(&changes.update_old);
    for ep in removals {
        let zone = zone_for(zones, &ep.dns_name)?;
        let rrset = RrSet {
            name: ensure_fqdn(&ep.dns_name),
            rrtype: ep.record_type.to_string(),
            ttl: 0,
            records: vec![],
            changetype: Some("DELETE".into()),
        };
        planned
            .entry(zone.id.clone())
            .or_default()
            .insert((rrset.name.clone(), rrset.rrtype.clone()), rrset);
    }

    let replacements = changes.update_new.iter().chain(&changes.create);
    for ep in replacements {
        let zone = zone_for(zones, &ep.dns_name)?;
        let rrset = build_rrset(ep, default_ttl);
        planned
            .entry(zone.id.clone())
            .or_default()
            .insert((rrset.name.clone(), rrset.rrtype.clone()), rrset);
    }

    Ok(planned
        .into_iter()
        .map(|(zone, rrsets)| (zone, rrsets.into_values().collect()))
        .collect())
}

/// The most specific zone containing `name`.
fn zone_for<'z>(zones: &'z [ZoneStub], name: &str) -> Result<&'z ZoneStub, ProviderError> {
    let fqdn = ensure_fqdn(&name.to_ascii_lowercase());
    zones
        .iter()
        .filter(|z| {
            let zone = z.name.to_ascii_lowercase();
            fqdn == zone || fqdn.ends_with(&format!(".{zone}"))
        })
        .max_by_key(|z| z.name.len())
        .ok_or_else(|| ProviderError::Validation(format!("no PowerDNS zone found for {name}")))
}

fn rrset_to_endpoint(rrset: RrSet) -> Option<Endpoint> {
    if !MANAGED_TYPES.contains(&rrset.rrtype.as_str()) {
        return None;
    }
    let targets: Vec<String> = rrset
        .records
        .into_iter()
        .filter(|r| !r.disabled)
        .map(|r| r.content)
        .collect();
    if targets.is_empty() {
        return None;
    }
    Some(
        Endpoint::new(rrset.name.trim_end_matches('.'), rrset.rrtype.into(), targets)
            .with_ttl(rrset.ttl),
    )
}

fn ensure_fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// PowerDNS wants a trailing dot on every value that is a DNS name.
/// Addresses and TXT strings are passed through.
fn normalise_content(record_type: &RecordType, target: &str) -> String {
    match record_type {
        RecordType::A | RecordType::Aaaa | RecordType::Txt => target.to_string(),
        RecordType::Https => normalise_https_content(target),
        RecordType::Cname | RecordType::Ns | RecordType::Ptr => ensure_fqdn(target),
        // MX "10 mail.example.com", SRV "0 5 443 host.example.com"
        RecordType::Mx | RecordType::Srv => match target.rsplit_once(' ') {
            Some((head, host)) => format!("{head} {}", ensure_fqdn(host)),
            None => ensure_fqdn(target),
        },
        RecordType::Naptr | RecordType::Other(_) => target.to_string(),
    }
}

/// HTTPS content for PowerDNS: numeric SvcPriority and a fully-qualified
/// TargetName.
///
///   "1 . alpn=h2,h3"          → "1 . alpn=h2,h3"
///   "1 lb.domain.com alpn=h2" → "1 lb.domain.com. alpn=h2"
///   "lb.domain.com"           → "1 lb.domain.com."
fn normalise_https_content(target: &str) -> String {
    let t = target.trim();
    let parts: Vec<&str> = t.splitn(3, ' ').collect();

    if let [priority, name, rest @ ..] = parts.as_slice() {
        if priority.parse::<u16>().is_ok() {
            let params = rest.first().map(|p| format!(" {p}")).unwrap_or_default();
            return format!("{priority} {}{params}", ensure_fqdn(name));
        }
    }
    format!("1 {}.", t.trim_end_matches('.'))
}

/// Prepend SvcPriority 1 when the first token is not a number.
///
///   "1 . alpn=h2,h3" → unchanged
///   ". alpn=h2,h3"   → "1 . alpn=h2,h3"
///   "alpn=h2"        → "1 . alpn=h2"
fn svc_param_with_priority(value: &str) -> String {
    let t = value.trim();
    let first = t.split_whitespace().next().unwrap_or("");
    if first.parse::<u16>().is_ok() {
        return t.to_string();
    }
    if first.contains('=') {
        return format!("1 . {t}");
    }
    format!("1 {t}")
}

fn build_rrset(ep: &Endpoint, default_ttl: u32) -> RrSet {
    let ttl = ep.record_ttl.filter(|ttl| *ttl > 0).unwrap_or(default_ttl);
    let records = ep
        .targets
        .iter()
        .map(|t| Record {
            content: normalise_content(&ep.record_type, t),
            disabled: false,
        })
        .collect();

    RrSet {
        name: ensure_fqdn(&ep.dns_name),
        rrtype: ep.record_type.to_string(),
        ttl,
        records,
        changetype: Some("REPLACE".into()),
    }
}
