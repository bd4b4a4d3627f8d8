//! Daemon configuration file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::Result;
use relay_registry::{GeoInfo, PersistenceConfig, RegistryConfig, StaticGeoLookup};
use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;

/// Configuration for the relay registry daemon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct RelaydConfig {
    pub(crate) registry: RegistryConfig,
    pub(crate) persistence: PersistenceSection,
    pub(crate) status: StatusSection,
    /// Static host -> geography table used for enrichment.
    pub(crate) geo: BTreeMap<String, GeoInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PersistenceSection {
    pub(crate) nodes_file: PathBuf,
    pub(crate) debounce_ms: u64,
    pub(crate) max_delay_ms: u64,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        let defaults = PersistenceConfig::default();
        Self {
            nodes_file: PathBuf::from("data/nodes.json"),
            debounce_ms: defaults.debounce.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
        }
    }
}

impl PersistenceSection {
    pub(crate) fn config(&self) -> PersistenceConfig {
        PersistenceConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.debounce_ms)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct StatusSection {
    /// Seconds between status reports.
    pub(crate) interval_secs: u64,
    /// Online nodes silent for this long are marked offline. Zero disables.
    pub(crate) stale_after_secs: u64,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            interval_secs: 20,
            stale_after_secs: 300,
        }
    }
}

impl RelaydConfig {
    /// Load the configuration from the given path, or create a default one if it doesn't exist.
    pub(crate) fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Load the configuration, falling back to defaults without writing a file.
    pub(crate) fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save the configuration to the given path.
    pub(crate) fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Apply command line arguments to override the configuration.
    pub(crate) fn apply_cli_args(&mut self, args: &RunArgs) {
        if let Some(path) = &args.nodes_file {
            self.persistence.nodes_file = path.clone();
        }
        if let Some(debounce) = args.debounce_ms {
            self.persistence.debounce_ms = debounce;
        }
        if let Some(interval) = args.status_interval {
            self.status.interval_secs = interval;
        }
        if let Some(stale) = args.stale_after {
            self.status.stale_after_secs = stale;
        }
        if let Some(threshold) = args.health_check_threshold {
            self.registry.health_check_failure_threshold = threshold;
        }
    }

    pub(crate) fn geo_lookup(&self) -> StaticGeoLookup {
        self.geo
            .iter()
            .map(|(host, geo)| (host.clone(), geo.clone()))
            .collect()
    }
}
