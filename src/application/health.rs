//! Liveness of the backing stores.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::warn;

use crate::application::repos::HealthProbe;
use crate::cache::Cache;

const TARGET: &str = "marketlens::health";
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: ProbeStatus,
    pub database: ProbeStatus,
    pub cache: ProbeStatus,
    pub version: &'static str,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == ProbeStatus::Up
    }
}

#[derive(Clone)]
pub struct HealthService {
    database: Arc<dyn HealthProbe>,
    cache: Cache,
}

impl HealthService {
    pub fn new(database: Arc<dyn HealthProbe>, cache: Cache) -> Self {
        Self { database, cache }
    }

    pub async fn check(&self) -> HealthReport {
        let (database, cache) = tokio::join!(
            tokio::time::timeout(PROBE_TIMEOUT, self.database.ping()),
            tokio::time::timeout(PROBE_TIMEOUT, self.cache.ping()),
        );

        let database = match database {
            Ok(Ok(())) => ProbeStatus::Up,
            Ok(Err(err)) => {
                warn!(target: TARGET, error = %err, "database probe failed");
                ProbeStatus::Down
            }
            Err(_) => {
                warn!(target: TARGET, "database probe timed out");
                ProbeStatus::Down
            }
        };
        let cache = match cache {
            Ok(Ok(())) => ProbeStatus::Up,
            Ok(Err(err)) => {
                warn!(target: TARGET, error = %err, "cache probe failed");
                ProbeStatus::Down
            }
            Err(_) => {
                warn!(target: TARGET, "cache probe timed out");
                ProbeStatus::Down
            }
        };

        let status = if database == ProbeStatus::Up && cache == ProbeStatus::Up {
            ProbeStatus::Up
        } else {
            ProbeStatus::Down
        };
        HealthReport {
            status,
            database,
            cache,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
