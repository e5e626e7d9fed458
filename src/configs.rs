use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ca: CaConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub ocsp: OcspConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaConfig {
    #[serde(default = "default_ca_cn")]
    pub common_name: String,
    #[serde(default = "default_cert_validity_days")]
    pub cert_validity_days: u32,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            common_name: default_ca_cn(),
            cert_validity_days: default_cert_validity_days(),
        }
    }
}

fn default_ca_cn() -> String {
    "ANS Root CA".to_string()
}

fn default_cert_validity_days() -> u32 {
    365
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_cn")]
    pub common_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            common_name: default_registry_cn(),
        }
    }
}

// Must satisfy the CSR common-name token rules, since the registry's own
// certificate is issued through the regular CA path.
fn default_registry_cn() -> String {
    "ans-registry".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcspConfig {
    #[serde(default = "default_ocsp_enabled")]
    pub enabled: bool,
    #[serde(default = "default_responder_ttl_secs")]
    pub responder_ttl_secs: u64,
    #[serde(default = "default_client_ttl_secs")]
    pub client_ttl_secs: u64,
    #[serde(default = "default_transport_timeout_ms")]
    pub transport_timeout_ms: u64,
}

impl Default for OcspConfig {
    fn default() -> Self {
        Self {
            enabled: default_ocsp_enabled(),
            responder_ttl_secs: default_responder_ttl_secs(),
            client_ttl_secs: default_client_ttl_secs(),
            transport_timeout_ms: default_transport_timeout_ms(),
        }
    }
}

fn default_ocsp_enabled() -> bool {
    true
}

fn default_responder_ttl_secs() -> u64 {
    3600
}

fn default_client_ttl_secs() -> u64 {
    600
}

fn default_transport_timeout_ms() -> u64 {
    2000
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;

        let config: AppConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration with default path (config.toml)
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }
}
