use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// external-dns plugin contract types
// ─────────────────────────────────────────────────────────────────────────────

/// Structural problems that serde alone cannot catch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("endpoint has an empty dnsName")]
    EmptyDnsName,

    #[error("updateOld has {old} endpoint(s) but updateNew has {new}")]
    UnpairedUpdate { old: usize, new: usize },
}

/// DNS record type. Unknown types are carried verbatim so nothing is lost
/// in transit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Txt,
    Srv,
    Ns,
    Ptr,
    Mx,
    Naptr,
    Https,
    Other(String),
}

impl RecordType {
    pub fn as_str(&self) -> &str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Txt => "TXT",
            RecordType::Srv => "SRV",
            RecordType::Ns => "NS",
            RecordType::Ptr => "PTR",
            RecordType::Mx => "MX",
            RecordType::Naptr => "NAPTR",
            RecordType::Https => "HTTPS",
            RecordType::Other(s) => s,
        }
    }

    fn known(s: &str) -> Option<Self> {
        Some(match s {
            "A" => RecordType::A,
            "AAAA" => RecordType::Aaaa,
            "CNAME" => RecordType::Cname,
            "TXT" => RecordType::Txt,
            "SRV" => RecordType::Srv,
            "NS" => RecordType::Ns,
            "PTR" => RecordType::Ptr,
            "MX" => RecordType::Mx,
            "NAPTR" => RecordType::Naptr,
            "HTTPS" => RecordType::Https,
            _ => return None,
        })
    }
}

impl FromStr for RecordType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::known(s).unwrap_or_else(|| RecordType::Other(s.to_string())))
    }
}

impl From<String> for RecordType {
    fn from(s: String) -> Self {
        Self::known(&s).unwrap_or(RecordType::Other(s))
    }
}

impl From<RecordType> for String {
    fn from(t: RecordType) -> Self {
        match t {
            RecordType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider-specific property attached to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderSpecific {
    pub name: String,
    pub value: String,
}

/// One DNS endpoint as external-dns understands it.
///
/// Equality ignores the order of `provider_specific`; `targets` order counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub dns_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub targets: Vec<String>,
    pub record_type: RecordType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_identifier: Option<String>,
    #[serde(rename = "recordTTL", default, skip_serializing_if = "Option::is_none")]
    pub record_ttl: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub provider_specific: Vec<ProviderSpecific>,
}

impl Endpoint {
    pub fn new(
        dns_name: impl Into<String>,
        record_type: RecordType,
        targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            dns_name: dns_name.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            record_type,
            set_identifier: None,
            record_ttl: None,
            labels: HashMap::new(),
            provider_specific: Vec::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.record_ttl = Some(ttl);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_set_identifier(mut self, id: impl Into<String>) -> Self {
        self.set_identifier = Some(id.into());
        self
    }

    pub fn with_provider_specific(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.provider_specific.push(ProviderSpecific {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Look up a providerSpecific value by name.
    pub fn provider_specific(&self, name: &str) -> Option<&str> {
        self.provider_specific
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.dns_name.trim().is_empty() {
            return Err(ModelError::EmptyDnsName);
        }
        Ok(())
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        fn sorted(ps: &[ProviderSpecific]) -> Vec<&ProviderSpecific> {
            let mut v: Vec<_> = ps.iter().collect();
            v.sort();
            v
        }

        self.dns_name == other.dns_name
            && self.targets == other.targets
            && self.record_type == other.record_type
            && self.set_identifier == other.set_identifier
            && self.record_ttl == other.record_ttl
            && self.labels == other.labels
            && sorted(&self.provider_specific) == sorted(&other.provider_specific)
    }
}

impl Eq for Endpoint {}

/// The payload sent by external-dns to POST /records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changes {
    #[serde(default, alias = "Create", deserialize_with = "null_as_default")]
    pub create: Vec<Endpoint>,
    #[serde(default, alias = "UpdateOld", deserialize_with = "null_as_default")]
    pub update_old: Vec<Endpoint>,
    #[serde(default, alias = "UpdateNew", deserialize_with = "null_as_default")]
    pub update_new: Vec<Endpoint>,
    #[serde(default, alias = "Delete", deserialize_with = "null_as_default")]
    pub delete: Vec<Endpoint>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.update_old.is_empty()
            && self.update_new.is_empty()
            && self.delete.is_empty()
    }

    /// Every endpoint in the batch, in no particular order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.create
            .iter()
            .chain(&self.update_old)
            .chain(&self.update_new)
            .chain(&self.delete)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.update_old.len() != self.update_new.len() {
            return Err(ModelError::UnpairedUpdate {
                old: self.update_old.len(),
                new: self.update_new.len(),
            });
        }
        self.endpoints().try_for_each(Endpoint::validate)
    }
}

/// Body of GET /propertyvaluesequals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValuesEqualRequest {
    pub name: String,
    pub previous: String,
    pub current: String,
}

/// Response of GET /propertyvaluesequals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValuesEqualResponse {
    pub equals: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain filter
// ─────────────────────────────────────────────────────────────────────────────

/// Which domains a backend may observe or mutate.
///
/// `example.com` matches the apex and every subdomain, `.example.com` only
/// subdomains. An empty include list admits everything; excludes always win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl DomainFilter {
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            include: normalise_domains(include),
            exclude: normalise_domains(exclude),
        }
    }

    /// Parse comma-separated lists, as they come from the environment.
    pub fn from_csv(include: &str, exclude: &str) -> Self {
        Self::new(include.split(','), exclude.split(','))
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn is_configured(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = normalise_name(name);
        if self.exclude.iter().any(|f| domain_matches(&name, f)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|f| domain_matches(&name, f))
    }
}

impl fmt::Display for DomainFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_configured() {
            return f.write_str("(all zones)");
        }
        if self.include.is_empty() {
            f.write_str("*")?;
        } else {
            f.write_str(&self.include.join(","))?;
        }
        if !self.exclude.is_empty() {
            write!(f, " excluding {}", self.exclude.join(","))?;
        }
        Ok(())
    }
}

fn normalise_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn normalise_domains<I>(domains: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    domains
        .into_iter()
        .map(|d| normalise_name(d.as_ref()))
        .filter(|d| !d.is_empty())
        .collect()
}

fn domain_matches(name: &str, filter: &str) -> bool {
    if filter.starts_with('.') {
        return name.ends_with(filter);
    }
    name == filter
        || name
            .strip_suffix(filter)
            .is_some_and(|head| head.ends_with('.'))
}

/// external-dns encodes nil slices and maps as `null`.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}
