use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::engine::Engine;
use crate::limits::DEFAULT_COMPACT_THRESHOLD;
use crate::notify::{MailTransport, Mailer};
use crate::reaper;

#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    /// Port for the Prometheus exporter; pass to `observability::init`.
    pub metrics_port: Option<u16>,
}

impl MarketplaceConfig {
    /// Read configuration from `POUSADA_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("POUSADA_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let compact_threshold = std::env::var("POUSADA_COMPACT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_COMPACT_THRESHOLD);
        let metrics_port = std::env::var("POUSADA_METRICS_PORT")
            .ok()
            .and_then(|s| s.parse().ok());
        Self {
            data_dir: PathBuf::from(data_dir),
            compact_threshold,
            metrics_port,
        }
    }
}

/// One marketplace: the engine plus its background tasks. The embedding
/// request layer holds this for the life of the process.
pub struct Marketplace {
    engine: Arc<Engine>,
}

impl Marketplace {
    /// Replay the WAL (creating the data directory on first run), wire the
    /// mailer, and spawn the finisher and compactor tasks. Must run inside
    /// a tokio runtime.
    pub fn open(
        config: &MarketplaceConfig,
        transport: Arc<dyn MailTransport>,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.data_dir.join("marketplace.wal");

        let mailer = Mailer::spawn(transport);
        let engine = Arc::new(Engine::new(wal_path, mailer)?);

        tokio::spawn(reaper::run_finisher(engine.clone()));
        tokio::spawn(reaper::run_compactor(engine.clone(), config.compact_threshold));

        info!(
            "marketplace open: data_dir={} compact_threshold={}",
            config.data_dir.display(),
            config.compact_threshold
        );
        Ok(Self { engine })
    }

    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogTransport;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("pousada_test_marketplace").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn open_creates_data_dir_and_wal() {
        let dir = test_data_dir("creates");
        let config = MarketplaceConfig {
            data_dir: dir.clone(),
            compact_threshold: 1000,
            metrics_port: None,
        };
        let _marketplace = Marketplace::open(&config, Arc::new(LogTransport)).unwrap();
        assert!(dir.join("marketplace.wal").exists());
    }

    #[tokio::test]
    async fn reopen_sees_prior_state() {
        let dir = test_data_dir("reopen");
        let config = MarketplaceConfig {
            data_dir: dir,
            compact_threshold: 1000,
            metrics_port: None,
        };

        let first = Marketplace::open(&config, Arc::new(LogTransport)).unwrap();
        let listed = first
            .engine()
            .list_property(
                ulid::Ulid::new(),
                crate::model::PropertySpec {
                    status: crate::model::PropertyStatus::Active,
                    accommodation: crate::model::Accommodation::SharedBedroom,
                    price_cents: 3_500,
                    beds: 1,
                    bedrooms: 1,
                    bathrooms: 1,
                    guest_max: 1,
                    description: "Bunk in a shared room".into(),
                    address: crate::model::Address {
                        country: "BR".into(),
                        state: "BA".into(),
                        city: "Salvador".into(),
                        neighborhood: "Rio Vermelho".into(),
                    },
                    facility: crate::model::Facility {
                        wifi: true,
                        washing_machine: false,
                        clothes_iron: false,
                        towels: false,
                        air_conditioning: true,
                        refrigerator: false,
                        heater: false,
                    },
                },
            )
            .await
            .unwrap();
        drop(first);

        let second = Marketplace::open(&config, Arc::new(LogTransport)).unwrap();
        let info = second.engine().property_info(listed.id).await.unwrap();
        assert_eq!(info, listed);
    }
}
