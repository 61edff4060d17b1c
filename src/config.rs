use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

use crate::{dns::DomainFilter, pdns::PdnsConfig, server::ServerConfig, telemetry::LogSettings};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Which record provider backs the adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Pdns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// IP address to listen on
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds allowed for reading a request body
    #[serde(default = "default_read_timeout")]
    pub webhook_read_timeout_secs: u64,

    /// Seconds allowed from dispatch to a complete response
    #[serde(default = "default_write_timeout")]
    pub webhook_write_timeout_secs: u64,

    /// Largest request body accepted, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub webhook_max_body_bytes: usize,

    /// Log intended changes instead of applying them
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub log_format: LogFormat,

    /// panic, fatal, error, warn(ing), info, debug or trace
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub provider: Backend,

    /// Comma-separated list of zones to manage; empty = manage all
    #[serde(default)]
    pub domain_filter: String,

    /// Comma-separated list of zones never to touch
    #[serde(default)]
    pub exclude_domains: String,

    /// Key prefix under which the in-memory store files records
    #[serde(default = "default_record_prefix")]
    pub record_prefix: String,

    /// Owner identifier used by the TXT registry
    #[serde(default = "default_owner_id")]
    pub txt_owner_id: String,

    /// Only report records whose owner label matches `txt_owner_id`
    #[serde(default)]
    pub pre_filter_external_owned_records: bool,

    /// Base URL of the PowerDNS HTTP API, e.g. http://powerdns:8081
    #[serde(default = "default_pdns_url")]
    pub pdns_api_url: String,

    /// PowerDNS API key (X-API-Key header)
    #[serde(default = "default_pdns_key")]
    pub pdns_api_key: String,

    /// PowerDNS server-id, almost always "localhost"
    #[serde(default = "default_server_id")]
    pub pdns_server_id: String,

    /// Default TTL when the endpoint doesn't specify one
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
}

impl Config {
    /// Parse from environment variables (PORT, LOG_LEVEL, PDNS_API_URL, …)
    pub fn from_env() -> anyhow::Result<Self> {
        envy::from_env::<Config>().context("reading configuration from environment")
    }

    /// Parse from explicit key/value pairs, using the same names as the environment.
    pub fn from_vars<I, K, V>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars.into_iter().map(|(k, v)| (k.into(), v.into()));
        envy::from_iter::<_, Config>(vars).context("parsing configuration")
    }

    pub fn domain_filter(&self) -> DomainFilter {
        DomainFilter::from_csv(&self.domain_filter, &self.exclude_domains)
    }

    pub fn server(&self) -> anyhow::Result<ServerConfig> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("invalid HOST {:?}", self.host))?;
        Ok(ServerConfig {
            addr: SocketAddr::new(ip, self.port),
            read_timeout: Duration::from_secs(self.webhook_read_timeout_secs),
            write_timeout: Duration::from_secs(self.webhook_write_timeout_secs),
            max_body_bytes: self.webhook_max_body_bytes,
        })
    }

    pub fn pdns(&self) -> PdnsConfig {
        PdnsConfig {
            api_url: self.pdns_api_url.clone(),
            api_key: self.pdns_api_key.clone(),
            server_id: self.pdns_server_id.clone(),
            default_ttl: self.default_ttl,
        }
    }

    pub fn logging(&self) -> LogSettings {
        LogSettings {
            format: self.log_format,
            level: self.log_level.clone(),
        }
    }
}

fn default_host()           -> String { "0.0.0.0".into() }
fn default_port()           -> u16    { 8888 }
fn default_read_timeout()   -> u64    { 5 }
fn default_write_timeout()  -> u64    { 10 }
fn default_max_body_bytes() -> usize  { 64 * 1024 * 1024 }
fn default_log_level()      -> String { "info".into() }
fn default_record_prefix()  -> String { "/skydns/".into() }
fn default_owner_id()       -> String { "default".into() }
fn default_pdns_url()       -> String { "http://localhost:8081".into() }
fn default_pdns_key()       -> String { "changeme".into() }
fn default_server_id()      -> String { "localhost".into() }
fn default_ttl()            -> u32    { 300 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = Config::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(cfg.port, 8888);
        assert_eq!(cfg.provider, Backend::Memory);
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.record_prefix, "/skydns/");
        assert_eq!(cfg.txt_owner_id, "default");
        assert!(!cfg.dry_run);
        assert!(!cfg.pre_filter_external_owned_records);

        let server = cfg.server().unwrap();
        assert_eq!(server.addr, "0.0.0.0:8888".parse::<SocketAddr>().unwrap());
        assert_eq!(server.read_timeout, Duration::from_secs(5));
        assert_eq!(server.write_timeout, Duration::from_secs(10));
        assert_eq!(server.max_body_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn reads_overrides() {
        let cfg = Config::from_vars([
            ("HOST", "::1"),
            ("PORT", "9000"),
            ("WEBHOOK_READ_TIMEOUT_SECS", "1"),
            ("WEBHOOK_WRITE_TIMEOUT_SECS", "2"),
            ("WEBHOOK_MAX_BODY_BYTES", "1048576"),
            ("DRY_RUN", "true"),
            ("LOG_FORMAT", "json"),
            ("PROVIDER", "pdns"),
            ("DOMAIN_FILTER", "example.com, example.org"),
            ("EXCLUDE_DOMAINS", "internal.example.com"),
        ])
        .unwrap();

        assert!(cfg.dry_run);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.provider, Backend::Pdns);
        let server = cfg.server().unwrap();
        assert_eq!(server.addr, "[::1]:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(server.max_body_bytes, 1 << 20);

        let filter = cfg.domain_filter();
        assert_eq!(filter.include(), ["example.com", "example.org"]);
        assert_eq!(filter.exclude(), ["internal.example.com"]);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_vars([("LOG_FORMAT", "xml")]).is_err());
        assert!(Config::from_vars([("PORT", "eighty")]).is_err());

        let cfg = Config::from_vars([("HOST", "not-an-ip")]).unwrap();
        assert!(cfg.server().is_err());
    }
}
