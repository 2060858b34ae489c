use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HubConfig {
    /// Port UDP d'écoute de la télémétrie nœuds.
    pub telemetry_port: u16,
    /// Cible broadcast des trames contrôle (hint optionnel, ex "192.168.1.255").
    pub broadcast_addr: String,
    pub broadcast_port: u16,
    /// Port de l'API REST.
    pub http_port: u16,
    /// Période du cycle de réconciliation, en secondes.
    pub sync_interval_secs: u64,
    pub remote: RemoteConf,
    /// Fichier des réglages persistés (région binaire par slot).
    pub settings_file: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConf {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteConf {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".into(),
            auth_token: None,
            timeout_secs: 10,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            telemetry_port: 4210,
            broadcast_addr: "255.255.255.255".into(),
            broadcast_port: 4211,
            http_port: 8080,
            sync_interval_secs: 10,
            remote: RemoteConf::default(),
            settings_file: "./data/settings.bin".into(),
        }
    }
}

pub async fn load_config() -> HubConfig {
    let path = std::env::var("SERRE_HUB_CONFIG").unwrap_or_else(|_| "hub.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return HubConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            warn!("invalid config {path}: {e}, using defaults");
            HubConfig::default()
        })
    } else {
        warn!("no {path}, using default config");
        HubConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = HubConfig::default();
        assert_eq!(cfg.sync_interval_secs, 10);
        assert_eq!(cfg.remote.timeout_secs, 10);
        assert_eq!(cfg.broadcast_addr, "255.255.255.255");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let cfg: HubConfig = serde_yaml::from_str("http_port: 9090\n").unwrap();
        assert_eq!(cfg.http_port, 9090);
        assert_eq!(cfg.telemetry_port, 4210);
    }
}
