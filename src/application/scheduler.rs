//! Periodic promotion of scheduled content.
//!
//! Each tick flips every due row of every kind to published in a single conditional
//! statement per kind, so concurrent schedulers never double-publish.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use time::OffsetDateTime;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info};

use crate::application::repos::{Promoted, ScheduleRepo};
use crate::cache::{Cache, keys};
use crate::domain::types::ContentKind;

const TARGET: &str = "marketlens::scheduler";
const METRIC_PROMOTED: &str = "marketlens_scheduler_promoted_total";

pub const DEFAULT_CADENCE: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct Scheduler {
    repo: Arc<dyn ScheduleRepo>,
    cache: Cache,
    cadence: Duration,
}

impl Scheduler {
    pub fn new(repo: Arc<dyn ScheduleRepo>, cache: Cache, cadence: Duration) -> Self {
        Self {
            repo,
            cache,
            cadence,
        }
    }

    /// Promote everything due at `now`. A failing kind is logged and the others proceed.
    pub async fn tick(&self, now: OffsetDateTime) -> usize {
        let mut promoted_total = 0;
        for kind in ContentKind::ALL {
            match self.repo.publish_due(kind, now).await {
                Ok(promoted) if promoted.is_empty() => {}
                Ok(promoted) => {
                    counter!(METRIC_PROMOTED, "kind" => kind.as_str())
                        .increment(promoted.len() as u64);
                    info!(
                        target: TARGET,
                        kind = kind.as_str(),
                        count = promoted.len(),
                        "scheduled content published"
                    );
                    self.invalidate(kind, &promoted).await;
                    promoted_total += promoted.len();
                }
                Err(err) => {
                    error!(target: TARGET, kind = kind.as_str(), error = %err, "scheduled publish failed");
                }
            }
        }
        promoted_total
    }

    async fn invalidate(&self, kind: ContentKind, promoted: &[Promoted]) {
        for pattern in keys::family_patterns(kind) {
            self.cache.delete_by_prefix(&pattern).await;
        }
        for row in promoted {
            self.cache.delete(&keys::content_by_id(kind, row.id)).await;
            self.cache.delete(&keys::content_by_slug(kind, &row.slug)).await;
        }
    }

    /// Run `tick` on the configured cadence until `shutdown` flips to `true`.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.cadence);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(target: TARGET, cadence_secs = self.cadence.as_secs(), "scheduler started");

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let promoted = self.tick(OffsetDateTime::now_utc()).await;
                        debug!(target: TARGET, promoted, "scheduler tick finished");
                    }
                }
            }

            info!(target: TARGET, "scheduler stopped");
        })
    }
}
