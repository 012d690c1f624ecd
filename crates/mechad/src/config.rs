//! Daemon configuration (`mechad.toml`)
//!
//! Every table is optional. A minimal file only needs `[[vehicle]]` entries.

use std::path::{Path, PathBuf};

use mecha_obd::{EngineConfig, PollPlan, ScoringConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default, rename = "vehicle")]
    pub vehicles: Vec<VehicleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:18090".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("config/dtc-codes.yaml")
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

/// One monitored vehicle and where its adapter data comes from
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// ELM327 Wi-Fi adapter
    Tcp {
        address: String,
        #[serde(default)]
        poll: PollPlan,
        #[serde(default = "default_connect_timeout_ms")]
        connect_timeout_ms: u64,
    },
    /// Captured adapter log
    Replay {
        path: PathBuf,
        #[serde(default)]
        pace: bool,
    },
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl DaemonConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        let config: DaemonConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing {}: {}", path.display(), e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_minimal_config() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:18090");
        assert_eq!(config.catalog.path, PathBuf::from("config/dtc-codes.yaml"));
        assert_eq!(config.engine.buffer_capacity, 2000);
        assert!(config.vehicles.is_empty());
    }

    #[test]
    fn test_vehicle_sources() {
        let config: DaemonConfig = toml::from_str(
            r#"
[server]
bind = "127.0.0.1:9000"

[engine]
debounce_count = 3

[[vehicle]]
id = "van-7"
name = "Delivery van"
source = { type = "tcp", address = "192.168.0.10:35000" }

[[vehicle]]
id = "bench"
source = { type = "replay", path = "config/replay/sample.log", pace = true }
"#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.engine.tracker.debounce_count, 3);
        assert_eq!(config.vehicles.len(), 2);
        assert_eq!(config.vehicles[0].name.as_deref(), Some("Delivery van"));
        assert_eq!(
            config.vehicles[0].source,
            SourceConfig::Tcp {
                address: "192.168.0.10:35000".into(),
                poll: PollPlan::default(),
                connect_timeout_ms: 5000,
            }
        );
        assert_eq!(
            config.vehicles[1].source,
            SourceConfig::Replay {
                path: PathBuf::from("config/replay/sample.log"),
                pace: true,
            }
        );
    }

    #[test]
    fn test_shipped_config() {
        let config: DaemonConfig =
            toml::from_str(include_str!("../../../config/mechad.toml")).unwrap();
        assert!(config.engine.validate().is_ok());
        assert!(config.scoring.validate().is_ok());
        assert_eq!(config.scoring.rules, mecha_obd::config::default_rules());
        assert_eq!(config.vehicles[0].id, "bench");
    }

    #[test]
    fn test_load_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind = 5").unwrap();
        let err = DaemonConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("parsing"));

        assert!(DaemonConfig::load(Path::new("/nonexistent/mechad.toml")).is_err());
    }
}
