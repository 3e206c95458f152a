//! Audit trail: a bounded background queue plus read-side queries.
//!
//! `AuditSink::log_async` never blocks the caller; when the queue is full the entry is
//! dropped with a warning. `AuditSink::log` persists inline for paths that must not
//! return before the record exists.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::application::{
    context::{Actor, RequestMeta},
    error::AppError,
    pagination::{PageRequest, Paginated},
    repos::{AuditEntry, AuditFilter, AuditRepo, RepoError},
};
use crate::domain::{
    entities::{AuditRecord, FieldChanges},
    types::AuditOutcome,
};

const TARGET: &str = "marketlens::audit";
const METRIC_DROPPED: &str = "marketlens_audit_dropped_total";
const METRIC_PERSISTED: &str = "marketlens_audit_persisted_total";
const METRIC_FAILED: &str = "marketlens_audit_failed_total";

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

impl AuditEntry {
    pub fn new(action: impl Into<String>, entity_kind: impl Into<String>) -> Self {
        Self {
            principal_id: None,
            principal_email: None,
            principal_role: None,
            action: action.into(),
            entity_kind: entity_kind.into(),
            entity_id: None,
            ip: None,
            user_agent: None,
            request_id: None,
            changes: None,
            status: AuditOutcome::Success,
            error_message: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn actor(mut self, actor: &Actor) -> Self {
        self.principal_id = Some(actor.principal.id);
        self.principal_email = Some(actor.principal.email.clone());
        self.principal_role = Some(actor.principal.role);
        self.request(&actor.meta)
    }

    pub fn request(mut self, meta: &RequestMeta) -> Self {
        self.ip = meta.ip.clone();
        self.user_agent = meta.user_agent.clone();
        self.request_id = meta.request_id.clone();
        self
    }

    /// Attach field-level changes; an empty map is recorded as "no changes known".
    pub fn changes(mut self, changes: FieldChanges) -> Self {
        self.changes = (!changes.is_empty()).then_some(changes);
        self
    }

    pub fn failure(mut self, message: impl Into<String>) -> Self {
        self.status = AuditOutcome::Failure;
        self.error_message = Some(message.into());
        self
    }
}

/// Producer handle for the audit queue. Cheap to clone.
#[derive(Clone)]
pub struct AuditSink {
    sender: mpsc::Sender<AuditEntry>,
    repo: Arc<dyn AuditRepo>,
}

/// Owner of the drain task; `shutdown` flushes what is left.
pub struct AuditWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<usize>,
}

impl AuditSink {
    /// Create the queue and spawn its single consumer.
    pub fn spawn(repo: Arc<dyn AuditRepo>, capacity: usize) -> (Self, AuditWorker) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(drain(repo.clone(), receiver, shutdown_rx));
        (Self { sender, repo }, AuditWorker { shutdown, handle })
    }

    /// Enqueue without waiting. Overflow drops the entry.
    pub fn log_async(&self, entry: AuditEntry) {
        match self.sender.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                counter!(METRIC_DROPPED, "reason" => "full").increment(1);
                warn!(
                    target: TARGET,
                    action = %entry.action,
                    entity_kind = %entry.entity_kind,
                    entity_id = entry.entity_id.as_deref().unwrap_or(""),
                    "audit queue full; dropping entry"
                );
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                counter!(METRIC_DROPPED, "reason" => "closed").increment(1);
                warn!(
                    target: TARGET,
                    action = %entry.action,
                    "audit queue closed; dropping entry"
                );
            }
        }
    }

    /// Persist before returning, bypassing the queue. Used where the caller must not
    /// acknowledge an action whose audit record could still be dropped.
    pub async fn log(&self, entry: AuditEntry) -> Result<AuditRecord, RepoError> {
        match self.repo.append(&entry).await {
            Ok(record) => {
                counter!(METRIC_PERSISTED).increment(1);
                Ok(record)
            }
            Err(err) => {
                counter!(METRIC_FAILED).increment(1);
                Err(err)
            }
        }
    }
}

async fn persist(repo: &dyn AuditRepo, entry: AuditEntry) {
    match repo.append(&entry).await {
        Ok(record) => {
            counter!(METRIC_PERSISTED).increment(1);
            debug!(target: TARGET, id = record.id, action = %record.action, "audit entry persisted");
        }
        Err(err) => {
            counter!(METRIC_FAILED).increment(1);
            error!(
                target: TARGET,
                action = %entry.action,
                entity_kind = %entry.entity_kind,
                error = %err,
                "failed to persist audit entry"
            );
        }
    }
}

async fn drain(
    repo: Arc<dyn AuditRepo>,
    mut receiver: mpsc::Receiver<AuditEntry>,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut processed = 0usize;
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            next = receiver.recv() => match next {
                Some(entry) => {
                    persist(repo.as_ref(), entry).await;
                    processed += 1;
                }
                None => return processed,
            },
        }
    }

    receiver.close();
    while let Some(entry) = receiver.recv().await {
        persist(repo.as_ref(), entry).await;
        processed += 1;
    }
    processed
}

impl AuditWorker {
    /// Stop accepting entries and flush the backlog, giving up after `deadline`.
    pub async fn shutdown(self, deadline: Duration) {
        let _ = self.shutdown.send(true);
        let mut handle = self.handle;
        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(Ok(processed)) => {
                info!(target: TARGET, processed, "audit worker stopped");
            }
            Ok(Err(err)) => {
                error!(target: TARGET, error = %err, "audit worker panicked");
            }
            Err(_) => {
                handle.abort();
                warn!(
                    target: TARGET,
                    deadline_ms = deadline.as_millis() as u64,
                    "audit flush deadline exceeded; remaining entries lost"
                );
            }
        }
    }
}

/// Read-side access to the audit trail.
#[derive(Clone)]
pub struct AuditService {
    repo: Arc<dyn AuditRepo>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> Result<Paginated<AuditRecord>, AppError> {
        Ok(self.repo.list(filter, page).await?)
    }

    pub async fn get(&self, id: u64) -> Result<AuditRecord, AppError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Audit log not found"))
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        let page = PageRequest::new(Some(1), Some(limit));
        Ok(self.repo.list(&AuditFilter::default(), page).await?.items)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;

    /// Appends into a vector; optionally waits for a permit per append.
    struct RecordingRepo {
        records: Mutex<Vec<AuditRecord>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl RecordingRepo {
        fn new(gate: Option<Arc<Semaphore>>) -> Arc<Self> {
            Arc::new(Self {
                records: Mutex::new(Vec::new()),
                gate,
            })
        }

        fn actions(&self) -> Vec<String> {
            self.records
                .lock()
                .expect("lock")
                .iter()
                .map(|record| record.action.clone())
                .collect()
        }
    }

    #[async_trait]
    impl AuditRepo for RecordingRepo {
        async fn append(&self, entry: &AuditEntry) -> Result<AuditRecord, RepoError> {
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate").forget();
            }
            let mut records = self.records.lock().expect("lock");
            let record = AuditRecord {
                id: records.len() as u64 + 1,
                principal_id: entry.principal_id,
                principal_email: entry.principal_email.clone(),
                principal_role: entry.principal_role,
                action: entry.action.clone(),
                entity_kind: entry.entity_kind.clone(),
                entity_id: entry.entity_id.clone(),
                ip: entry.ip.clone(),
                user_agent: entry.user_agent.clone(),
                request_id: entry.request_id.clone(),
                changes: entry.changes.clone(),
                status: entry.status,
                error_message: entry.error_message.clone(),
                created_at: entry.created_at,
            };
            records.push(record.clone());
            Ok(record)
        }

        async fn find_by_id(&self, id: u64) -> Result<Option<AuditRecord>, RepoError> {
            Ok(self
                .records
                .lock()
                .expect("lock")
                .iter()
                .find(|record| record.id == id)
                .cloned())
        }

        async fn list(
            &self,
            _filter: &AuditFilter,
            page: PageRequest,
        ) -> Result<Paginated<AuditRecord>, RepoError> {
            let mut items = self.records.lock().expect("lock").clone();
            items.reverse();
            let total = items.len() as u64;
            Ok(Paginated::new(items, total, page))
        }
    }

    #[tokio::test]
    async fn entries_are_persisted_in_order_and_flushed_on_shutdown() {
        let repo = RecordingRepo::new(None);
        let (sink, worker) = AuditSink::spawn(repo.clone(), 10);

        for index in 0..5 {
            sink.log_async(AuditEntry::new(format!("report.update{index}"), "report"));
        }
        worker.shutdown(Duration::from_secs(5)).await;

        assert_eq!(
            repo.actions(),
            (0..5)
                .map(|index| format!("report.update{index}"))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn overflow_drops_entries_without_blocking() {
        let gate = Arc::new(Semaphore::new(0));
        let repo = RecordingRepo::new(Some(gate.clone()));
        let (sink, worker) = AuditSink::spawn(repo.clone(), 2);

        // The worker takes the first entry and parks on the gate; two more fill the queue.
        sink.log_async(AuditEntry::new("a", "report"));
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        sink.log_async(AuditEntry::new("b", "report"));
        sink.log_async(AuditEntry::new("c", "report"));
        sink.log_async(AuditEntry::new("dropped", "report"));

        gate.add_permits(10);
        worker.shutdown(Duration::from_secs(5)).await;

        assert_eq!(repo.actions(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn synchronous_log_returns_the_record() {
        let repo = RecordingRepo::new(None);
        let (sink, worker) = AuditSink::spawn(repo.clone(), 4);
        let record = sink
            .log(AuditEntry::new("auth.login", "user").entity_id(1).failure("bad password"))
            .await
            .expect("persisted");
        assert_eq!(record.status, AuditOutcome::Failure);
        assert_eq!(record.entity_id.as_deref(), Some("1"));
        worker.shutdown(Duration::from_secs(1)).await;

        let service = AuditService::new(repo);
        assert_eq!(service.get(record.id).await.expect("found").action, "auth.login");
        assert!(matches!(service.get(99).await, Err(AppError::NotFound(_))));
    }
}
