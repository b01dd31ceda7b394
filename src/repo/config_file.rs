use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

use crate::config::MeterConfig;

/// Loads and saves the user-owned meter configuration as a JSON document.
///
/// A missing or unreadable document yields the default configuration rather
/// than an error: on a fresh install there simply is no file yet.
pub struct ConfigRepository {
    path: PathBuf,
}

impl ConfigRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> MeterConfig {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "could not read config document, using defaults");
                return MeterConfig::default();
            }
        };

        match serde_json::from_slice::<MeterConfig>(&bytes) {
            Ok(config) => {
                info!(
                    buy_prices = config.buy_prices.len(),
                    blacklisted = config.repair.blacklist.len(),
                    adjustments = config.repair.adjustments.len(),
                    "config document loaded"
                );
                config
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "could not parse config document, using defaults");
                MeterConfig::default()
            }
        }
    }

    pub async fn save(&self, config: &MeterConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let content = serde_json::to_vec_pretty(config).context("serializing config document")?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("meter-balance-test-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn missing_document_yields_defaults() {
        let repo = ConfigRepository::new(temp_path("missing/config.json"));
        assert_eq!(repo.load().await, MeterConfig::default());
    }

    #[tokio::test]
    async fn corrupt_document_yields_defaults() {
        let path = temp_path("corrupt.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let repo = ConfigRepository::new(&path);
        assert_eq!(repo.load().await, MeterConfig::default());

        fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn save_and_reload_round_trips() {
        let path = temp_path("roundtrip/config.json");
        let repo = ConfigRepository::new(&path);

        let mut config = MeterConfig::default();
        config.sell_price = 0.08;
        config.wallbox_host = "192.168.1.10".to_string();

        repo.save(&config).await.unwrap();
        assert_eq!(repo.load().await, config);

        fs::remove_file(&path).await.ok();
    }
}
