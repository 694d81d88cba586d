//! Topology builder & configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Binds an application's namespace and instance identity. Two topologies
/// built from the same `AppIdentity` share a storage root subtree.
#[derive(Debug, Clone)]
pub struct AppIdentity {
    pub namespace: String,
    pub instance_id: String,
}

impl AppIdentity {
    pub fn new(namespace: impl Into<String>, instance_id: impl Into<String>) -> Self {
        AppIdentity { namespace: namespace.into(), instance_id: instance_id.into() }
    }

    /// `<namespace>-<instance_id>`, used in every log line a topology
    /// built from this identity emits.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.namespace, self.instance_id)
    }
}

/// Read-only, validated bag of cluster-wide options shared by every
/// topology a `TopologyBuilder` mints.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub brokers: String,
    pub consumer_buffering: Duration,
    pub producer_buffering: Duration,
    pub ca_cert_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub private_key_path: Option<String>,
    pub private_key_passphrase: Option<String>,
    pub schema_registry_uri: Option<String>,
    pub schema_registry_timeout: Duration,
    pub storage_root: String,
    pub fail_fast: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            brokers: "localhost:9092".to_string(),
            consumer_buffering: Duration::from_millis(100),
            producer_buffering: Duration::from_millis(100),
            ca_cert_path: None,
            client_cert_path: None,
            private_key_path: None,
            private_key_passphrase: None,
            schema_registry_uri: None,
            schema_registry_timeout: Duration::from_secs(5),
            storage_root: "./var/ktopo".to_string(),
            fail_fast: false,
        }
    }
}

impl ClusterConfig {
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::default()
    }

    /// Loads configuration from a fixed set of environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut cfg = ClusterConfig::default();
        if let Ok(v) = std::env::var("KTOPO_BROKERS") {
            cfg.brokers = v;
        }
        if let Ok(v) = std::env::var("KTOPO_CONSUMER_BUFFERING_MS") {
            if let Ok(ms) = v.parse() {
                cfg.consumer_buffering = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("KTOPO_PRODUCER_BUFFERING_MS") {
            if let Ok(ms) = v.parse() {
                cfg.producer_buffering = Duration::from_millis(ms);
            }
        }
        cfg.ca_cert_path = std::env::var("KTOPO_CA_CERT_PATH").ok();
        cfg.client_cert_path = std::env::var("KTOPO_CLIENT_CERT_PATH").ok();
        cfg.private_key_path = std::env::var("KTOPO_PRIVATE_KEY_PATH").ok();
        cfg.private_key_passphrase = std::env::var("KTOPO_PRIVATE_KEY_PASSPHRASE").ok();
        cfg.schema_registry_uri = std::env::var("KTOPO_SCHEMA_REGISTRY_URI").ok();
        if let Ok(v) = std::env::var("KTOPO_SCHEMA_REGISTRY_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                cfg.schema_registry_timeout = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("KTOPO_STORAGE_ROOT") {
            cfg.storage_root = v;
        }
        if let Ok(v) = std::env::var("KTOPO_FAIL_FAST") {
            cfg.fail_fast = matches!(v.as_str(), "1" | "true" | "TRUE" | "yes");
        }
        cfg
    }

    /// Enforces mutual-dependency rules before any topology is started.
    pub fn validate(&self) -> Result<()> {
        if self.brokers.trim().is_empty() {
            return Err(Error::Config("brokers must not be empty".into()));
        }
        if self.client_cert_path.is_some() && self.private_key_path.is_none() {
            return Err(Error::Config(
                "client_cert_path requires private_key_path".into(),
            ));
        }
        if self.private_key_path.is_some() && self.client_cert_path.is_none() {
            return Err(Error::Config(
                "private_key_path requires client_cert_path".into(),
            ));
        }
        if self.storage_root.trim().is_empty() {
            return Err(Error::Config("storage_root must not be empty".into()));
        }
        Ok(())
    }

    /// A redacted, human-readable summary for startup logging, with
    /// private key material and the passphrase scrubbed.
    pub fn log_summary(&self) -> String {
        format!(
            "brokers={} consumer_buffering={:?} producer_buffering={:?} tls={} schema_registry={} storage_root={} fail_fast={}",
            self.brokers,
            self.consumer_buffering,
            self.producer_buffering,
            self.client_cert_path.is_some(),
            self.schema_registry_uri.as_deref().unwrap_or("<none>"),
            self.storage_root,
            self.fail_fast,
        )
    }
}

#[derive(Debug, Default)]
pub struct ClusterConfigBuilder {
    cfg: ClusterConfig,
}

impl ClusterConfigBuilder {
    pub fn brokers(mut self, v: impl Into<String>) -> Self {
        self.cfg.brokers = v.into();
        self
    }

    pub fn consumer_buffering(mut self, v: Duration) -> Self {
        self.cfg.consumer_buffering = v;
        self
    }

    pub fn producer_buffering(mut self, v: Duration) -> Self {
        self.cfg.producer_buffering = v;
        self
    }

    pub fn tls(mut self, ca: impl Into<String>, cert: impl Into<String>, key: impl Into<String>, passphrase: impl Into<String>) -> Self {
        self.cfg.ca_cert_path = Some(ca.into());
        self.cfg.client_cert_path = Some(cert.into());
        self.cfg.private_key_path = Some(key.into());
        let pass = passphrase.into();
        self.cfg.private_key_passphrase = if pass.is_empty() { None } else { Some(pass) };
        self
    }

    pub fn schema_registry(mut self, uri: impl Into<String>, timeout: Duration) -> Self {
        self.cfg.schema_registry_uri = Some(uri.into());
        self.cfg.schema_registry_timeout = timeout;
        self
    }

    pub fn storage_root(mut self, v: impl Into<String>) -> Self {
        self.cfg.storage_root = v.into();
        self
    }

    pub fn fail_fast(mut self, v: bool) -> Self {
        self.cfg.fail_fast = v;
        self
    }

    pub fn build(self) -> ClusterConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_brokers() {
        let cfg = ClusterConfig::builder().brokers("").build();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_client_cert_without_private_key() {
        let mut cfg = ClusterConfig::default();
        cfg.client_cert_path = Some("cert.pem".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_matched_tls_material() {
        let cfg = ClusterConfig::builder()
            .brokers("localhost:9092")
            .tls("ca.pem", "cert.pem", "key.pem", "")
            .build();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn identity_formats_namespace_and_instance() {
        let app = AppIdentity::new("ktopo-examples", "worker-1");
        assert_eq!(app.identity(), "ktopo-examples-worker-1");
    }
}
