use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub token: String,
    #[serde(rename = "ownerID", default)]
    pub owner_id: u64,
    #[serde(default = "default_public_ip_url")]
    pub public_ip_url: String,
    #[serde(default = "default_probe_address")]
    pub probe_address: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_public_ip_url() -> String {
    "https://api.ipify.org?format=json".to_string()
}

fn default_probe_address() -> String {
    "8.8.8.8:80".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate a config document. Malformed JSON is rejected
    /// outright instead of falling through to the field checks.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(content).context("Failed to parse config as JSON")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.owner_id == 0 {
            bail!("Owner ID is missing or incorrect");
        }
        if self.token.trim().is_empty() {
            bail!("Telegram token is missing or incorrect");
        }
        if self.request_timeout_secs == 0 {
            bail!("requestTimeoutSecs must be greater than zero");
        }
        self.probe_addr()?;
        Ok(())
    }

    /// Address the local resolver "connects" to in order to pick a source address.
    pub fn probe_addr(&self) -> Result<SocketAddr> {
        self.probe_address
            .parse()
            .with_context(|| format!("Invalid probeAddress: {}", self.probe_address))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
