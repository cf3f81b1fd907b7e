use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::Network;

use crate::error::ClientError;

const MAINNET_IDENTITY_PROVIDER: &str = "https://identity.ic0.app/#authorize";
const LOCAL_REPLICA_URL: &str = "http://localhost:4943";
pub(crate) const DEFAULT_CALL_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub network: Network,
    pub service_url: Option<String>,
    pub identity_provider_url: Option<String>,
    pub internet_identity_canister_id: Option<String>,
    pub root_key_b64: Option<String>,
    pub call_timeout_ms: u64,
    pub page_size: u32,
    pub session_path: PathBuf,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            network: Network::Local,
            service_url: None,
            identity_provider_url: None,
            internet_identity_canister_id: None,
            root_key_b64: None,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            page_size: 10,
            session_path: PathBuf::from("./data/session.json"),
        }
    }
}

impl ClientSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Login entry point for the configured network.
    pub fn identity_provider_url(&self) -> Result<String, ClientError> {
        if let Some(url) = self
            .identity_provider_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
        {
            return Ok(url.to_string());
        }

        match self.network {
            Network::Ic => Ok(MAINNET_IDENTITY_PROVIDER.to_string()),
            Network::Local => {
                let canister_id = self
                    .internet_identity_canister_id
                    .as_deref()
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| {
                        ClientError::Configuration(
                            "internet_identity_canister_id is required on the local network"
                                .into(),
                        )
                    })?;
                Ok(format!(
                    "{LOCAL_REPLICA_URL}/?canisterId={}#authorize",
                    canister_id.trim()
                ))
            }
        }
    }
}

pub fn load_settings() -> anyhow::Result<ClientSettings> {
    load_settings_from(Path::new("client.toml"))
}

/// Defaults, then the TOML file at `path` if present, then environment overrides.
pub fn load_settings_from(path: &Path) -> anyhow::Result<ClientSettings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<ClientSettings>(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => ClientSettings::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };

    apply_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_overrides(
    settings: &mut ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    let first = |keys: &[&str]| keys.iter().find_map(|key| lookup(key));

    if let Some(v) = first(&["RECIPRO_NETWORK", "APP__NETWORK", "DFX_NETWORK"]) {
        settings.network = v
            .parse()
            .map_err(|err: String| anyhow::anyhow!(err))
            .context("invalid network override")?;
    }
    if let Some(v) = first(&["RECIPRO_SERVICE_URL", "APP__SERVICE_URL"]) {
        settings.service_url = Some(v);
    }
    if let Some(v) = first(&["RECIPRO_IDENTITY_PROVIDER_URL", "APP__IDENTITY_PROVIDER_URL"]) {
        settings.identity_provider_url = Some(v);
    }
    if let Some(v) = first(&[
        "RECIPRO_II_CANISTER_ID",
        "INTERNET_IDENTITY_CANISTER_ID",
        "CANISTER_ID_INTERNET_IDENTITY",
    ]) {
        settings.internet_identity_canister_id = Some(v);
    }
    if let Some(v) = first(&["RECIPRO_ROOT_KEY", "APP__ROOT_KEY"]) {
        settings.root_key_b64 = Some(v);
    }
    if let Some(v) = first(&["RECIPRO_CALL_TIMEOUT_MS", "APP__CALL_TIMEOUT_MS"]) {
        settings.call_timeout_ms = v
            .parse()
            .with_context(|| format!("invalid call timeout '{v}'"))?;
    }
    if let Some(v) = first(&["RECIPRO_PAGE_SIZE", "APP__PAGE_SIZE"]) {
        settings.page_size = v
            .parse()
            .with_context(|| format!("invalid page size '{v}'"))?;
    }
    if let Some(v) = first(&["RECIPRO_SESSION_PATH", "APP__SESSION_PATH"]) {
        settings.session_path = PathBuf::from(v);
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
