use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use ferry_shared::TenantId;
use tokio::time::Instant;

use super::*;
use crate::blob::{BlobError, BlobUploader};
use crate::credential::{
    CounterTransaction, CredentialError, CredentialStore, Destination, TenantCredential,
};
use crate::staging::{StagedFile, StagingArea};

const KEY: &str = "valid-key";

// ============================================================================
// In-memory credential store
// ============================================================================

#[derive(Default)]
struct Knobs {
    lookup_delay: Duration,
    increment_delay: Duration,
    fail_lookup: bool,
    fail_begin: bool,
    fail_increment: bool,
    fail_commit: bool,
}

struct MemoryStore {
    records: HashMap<String, TenantCredential>,
    counters: Arc<Mutex<HashMap<TenantId, i64>>>,
    rollbacks: Arc<AtomicUsize>,
    knobs: Knobs,
}

impl MemoryStore {
    fn with_tenant(tenant_id: TenantId, knobs: Knobs) -> Self {
        let record = TenantCredential {
            tenant_id,
            destination: Destination::cloudinary("demo", "key", "secret"),
            request_count: 0,
            updated_at: Utc::now(),
        };
        Self {
            records: HashMap::from([(KEY.to_string(), record)]),
            counters: Arc::new(Mutex::new(HashMap::from([(tenant_id, 0)]))),
            rollbacks: Arc::new(AtomicUsize::new(0)),
            knobs,
        }
    }

    fn count(&self, tenant_id: TenantId) -> i64 {
        self.counters.lock().unwrap()[&tenant_id]
    }

    fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

struct MemoryTransaction {
    counters: Arc<Mutex<HashMap<TenantId, i64>>>,
    rollbacks: Arc<AtomicUsize>,
    pending: Vec<(TenantId, i64)>,
    increment_delay: Duration,
    fail_increment: bool,
    fail_commit: bool,
}

impl CredentialStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn lookup(&self, api_key: &str) -> Result<Option<TenantCredential>, CredentialError> {
        tokio::time::sleep(self.knobs.lookup_delay).await;
        if self.knobs.fail_lookup {
            return Err(CredentialError::store("connection refused"));
        }
        Ok(self.records.get(api_key).cloned())
    }

    async fn begin(&self) -> Result<MemoryTransaction, CredentialError> {
        if self.knobs.fail_begin {
            return Err(CredentialError::store("pool exhausted"));
        }
        Ok(MemoryTransaction {
            counters: Arc::clone(&self.counters),
            rollbacks: Arc::clone(&self.rollbacks),
            pending: Vec::new(),
            increment_delay: self.knobs.increment_delay,
            fail_increment: self.knobs.fail_increment,
            fail_commit: self.knobs.fail_commit,
        })
    }
}

impl CounterTransaction for MemoryTransaction {
    async fn increment_counter(&mut self, tenant_id: TenantId, delta: i64) -> Result<(), CredentialError> {
        tokio::time::sleep(self.increment_delay).await;
        if self.fail_increment {
            return Err(CredentialError::store("deadlock detected"));
        }
        if !self.counters.lock().unwrap().contains_key(&tenant_id) {
            return Err(CredentialError::TenantNotFound(tenant_id));
        }
        self.pending.push((tenant_id, delta));
        Ok(())
    }

    async fn commit(self) -> Result<(), CredentialError> {
        if self.fail_commit {
            return Err(CredentialError::store("serialization failure"));
        }
        let mut counters = self.counters.lock().unwrap();
        for (tenant_id, delta) in self.pending {
            *counters.entry(tenant_id).or_default() += delta;
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), CredentialError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Scripted uploader
// ============================================================================

struct ScriptedUploader {
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
    received: Mutex<Vec<usize>>,
}

impl ScriptedUploader {
    fn succeeding() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::succeeding()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::succeeding()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BlobUploader for ScriptedUploader {
    async fn upload(
        &self,
        file: &StagedFile,
        _destination: &Destination,
        tenant_id: TenantId,
    ) -> Result<String, BlobError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = tokio::fs::read(&file.path).await?;
        self.received.lock().unwrap().push(bytes.len());
        tokio::time::sleep(self.delay).await;

        if self.fail {
            return Err(BlobError::Rejected {
                status: 500,
                message: "upstream unavailable".to_string(),
            });
        }
        Ok(format!("https://cdn.test/{tenant_id}/{call}"))
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    service: RelayService<MemoryStore, ScriptedUploader>,
    store: Arc<MemoryStore>,
    uploader: Arc<ScriptedUploader>,
    tenant_id: TenantId,
    dir: PathBuf,
    _tmp: tempfile::TempDir,
}

fn harness(knobs: Knobs, uploader: ScriptedUploader) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("staging");
    harness_in(tmp, dir, knobs, uploader)
}

fn harness_in(
    tmp: tempfile::TempDir,
    dir: PathBuf,
    knobs: Knobs,
    uploader: ScriptedUploader,
) -> Harness {
    let tenant_id = TenantId::new();
    let store = Arc::new(MemoryStore::with_tenant(tenant_id, knobs));
    let uploader = Arc::new(uploader);
    let service = RelayService::new(
        Arc::clone(&store),
        Arc::clone(&uploader),
        StagingArea::new(&dir),
    );
    Harness {
        service,
        store,
        uploader,
        tenant_id,
        dir,
        _tmp: tmp,
    }
}

fn request(api_key: &str, size: usize) -> RelayRequest {
    RelayRequest {
        api_key: api_key.to_string(),
        payload: Bytes::from(vec![42u8; size]),
        filename: Some("photo.png".to_string()),
        content_type: Some("image/png".to_string()),
    }
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map_or(0, Iterator::count)
}

/// Poll until the staging directory is empty or two seconds pass.
async fn drained(dir: &Path) -> bool {
    let give_up = Instant::now() + Duration::from_secs(2);
    while Instant::now() < give_up {
        if entries(dir) == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    entries(dir) == 0
}

// ============================================================================
// Relay outcomes
// ============================================================================

#[tokio::test]
async fn test_valid_key_relays_and_counts() {
    let h = harness(Knobs::default(), ScriptedUploader::succeeding());

    let outcome = h
        .service
        .relay_within(request(KEY, 1024), Duration::from_secs(5))
        .await;

    match outcome {
        RelayOutcome::Success { url } => assert!(url.starts_with("https://cdn.test/")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.store.count(h.tenant_id), 1);
    assert_eq!(*h.uploader.received.lock().unwrap(), vec![1024]);
    assert_eq!(entries(&h.dir), 0);
}

#[tokio::test]
async fn test_repeated_relay_counts_twice() {
    let h = harness(Knobs::default(), ScriptedUploader::succeeding());

    let first = h.service.relay_within(request(KEY, 16), Duration::from_secs(5)).await;
    let second = h.service.relay_within(request(KEY, 16), Duration::from_secs(5)).await;

    let (RelayOutcome::Success { url: a }, RelayOutcome::Success { url: b }) = (first, second)
    else {
        panic!("both attempts should succeed");
    };
    assert_ne!(a, b);
    assert_eq!(h.store.count(h.tenant_id), 2);
}

#[tokio::test]
async fn test_unknown_key_is_rejected_without_leak() {
    let h = harness(Knobs::default(), ScriptedUploader::succeeding());

    let outcome = h
        .service
        .relay_within(request("unknown", 1024), Duration::from_secs(5))
        .await;

    assert_eq!(outcome, RelayOutcome::CredentialNotFound);
    assert_eq!(h.uploader.calls(), 0);
    assert_eq!(h.store.count(h.tenant_id), 0);
    assert!(drained(&h.dir).await);
}

#[tokio::test]
async fn test_lookup_error_is_credential_not_found() {
    let knobs = Knobs {
        fail_lookup: true,
        ..Knobs::default()
    };
    let h = harness(knobs, ScriptedUploader::succeeding());

    let outcome = h.service.relay_within(request(KEY, 8), Duration::from_secs(5)).await;

    assert_eq!(outcome, RelayOutcome::CredentialNotFound);
    assert!(drained(&h.dir).await);
}

#[tokio::test]
async fn test_upload_failure_leaves_counter_unchanged() {
    let h = harness(Knobs::default(), ScriptedUploader::failing());

    let outcome = h
        .service
        .relay_within(request(KEY, 1024), Duration::from_secs(5))
        .await;

    match outcome {
        RelayOutcome::UploadFailed { cause } => assert!(cause.contains("upstream unavailable")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.store.count(h.tenant_id), 0);
    assert_eq!(entries(&h.dir), 0);
}

#[tokio::test]
async fn test_commit_failure_discards_url() {
    let knobs = Knobs {
        fail_commit: true,
        ..Knobs::default()
    };
    let h = harness(knobs, ScriptedUploader::succeeding());

    let outcome = h
        .service
        .relay_within(request(KEY, 1024), Duration::from_secs(5))
        .await;

    match outcome {
        RelayOutcome::AccountingFailed { cause } => {
            assert!(cause.contains("serialization failure"));
            assert!(!cause.contains("https://"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.uploader.calls(), 1);
    assert_eq!(h.store.count(h.tenant_id), 0);
    assert_eq!(entries(&h.dir), 0);
}

#[tokio::test]
async fn test_begin_failure_is_accounting_failed() {
    let knobs = Knobs {
        fail_begin: true,
        ..Knobs::default()
    };
    let h = harness(knobs, ScriptedUploader::succeeding());

    let outcome = h.service.relay_within(request(KEY, 8), Duration::from_secs(5)).await;

    assert!(matches!(outcome, RelayOutcome::AccountingFailed { .. }));
    assert_eq!(h.store.count(h.tenant_id), 0);
}

#[tokio::test]
async fn test_increment_failure_rolls_back() {
    let knobs = Knobs {
        fail_increment: true,
        ..Knobs::default()
    };
    let h = harness(knobs, ScriptedUploader::succeeding());

    let outcome = h.service.relay_within(request(KEY, 8), Duration::from_secs(5)).await;

    assert!(matches!(outcome, RelayOutcome::AccountingFailed { .. }));
    assert_eq!(h.store.rollbacks(), 1);
    assert_eq!(h.store.count(h.tenant_id), 0);
}

#[tokio::test]
async fn test_slow_upload_times_out_and_cleans_up() {
    let h = harness(
        Knobs::default(),
        ScriptedUploader::slow(Duration::from_secs(10)),
    );
    let started = Instant::now();

    let outcome = h
        .service
        .relay_within(request(KEY, 1024), Duration::from_millis(300))
        .await;

    assert_eq!(outcome, RelayOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(h.uploader.calls(), 1);
    assert_eq!(h.store.count(h.tenant_id), 0);
    assert!(drained(&h.dir).await);
}

#[tokio::test]
async fn test_slow_lookup_times_out() {
    let knobs = Knobs {
        lookup_delay: Duration::from_secs(10),
        ..Knobs::default()
    };
    let h = harness(knobs, ScriptedUploader::succeeding());
    let started = Instant::now();

    let outcome = h
        .service
        .relay_within(request(KEY, 1024), Duration::from_millis(200))
        .await;

    assert_eq!(outcome, RelayOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(h.uploader.calls(), 0);
    assert!(drained(&h.dir).await);
}

#[tokio::test]
async fn test_elapsed_deadline_releases_in_flight_staging() {
    let h = harness(Knobs::default(), ScriptedUploader::succeeding());

    for _ in 0..10 {
        let outcome = h
            .service
            .relay(request(KEY, 4 * 1024 * 1024), Instant::now())
            .await;
        assert_eq!(outcome, RelayOutcome::TimedOut);
    }

    assert_eq!(h.uploader.calls(), 0);
    assert_eq!(h.store.count(h.tenant_id), 0);
    assert!(drained(&h.dir).await);
}

#[tokio::test]
async fn test_slow_increment_times_out_and_rolls_back() {
    let knobs = Knobs {
        increment_delay: Duration::from_secs(10),
        ..Knobs::default()
    };
    let h = harness(knobs, ScriptedUploader::succeeding());

    let outcome = h
        .service
        .relay_within(request(KEY, 64), Duration::from_millis(300))
        .await;

    assert_eq!(outcome, RelayOutcome::TimedOut);
    assert_eq!(h.store.rollbacks(), 1);
    assert_eq!(h.store.count(h.tenant_id), 0);
    assert_eq!(entries(&h.dir), 0);
}

#[tokio::test]
async fn test_staging_failure_with_valid_key() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let h = harness_in(
        tmp,
        blocker,
        Knobs::default(),
        ScriptedUploader::succeeding(),
    );

    let outcome = h.service.relay_within(request(KEY, 8), Duration::from_secs(5)).await;

    assert!(matches!(outcome, RelayOutcome::StagingFailed { .. }));
    assert_eq!(h.uploader.calls(), 0);
    assert_eq!(h.store.count(h.tenant_id), 0);
}

#[tokio::test]
async fn test_unknown_key_outranks_staging_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    // Staging fails immediately; the lookup answers later.
    let knobs = Knobs {
        lookup_delay: Duration::from_millis(100),
        ..Knobs::default()
    };
    let h = harness_in(tmp, blocker, knobs, ScriptedUploader::succeeding());

    let outcome = h
        .service
        .relay_within(request("unknown", 8), Duration::from_secs(5))
        .await;

    assert_eq!(outcome, RelayOutcome::CredentialNotFound);
}

#[tokio::test]
async fn test_concurrent_relays_do_not_lose_updates() {
    let h = harness(Knobs::default(), ScriptedUploader::succeeding());

    let attempts = (0..8).map(|_| {
        let service = h.service.clone();
        tokio::spawn(async move {
            service
                .relay_within(request(KEY, 32), Duration::from_secs(5))
                .await
        })
    });
    for attempt in attempts.collect::<Vec<_>>() {
        assert!(attempt.await.unwrap().is_success());
    }

    assert_eq!(h.store.count(h.tenant_id), 8);
    assert_eq!(entries(&h.dir), 0);
}

// ============================================================================
// Accounting state machine
// ============================================================================

async fn open_transaction(store: &MemoryStore) -> Accounting<MemoryTransaction> {
    Accounting::new(store.begin().await.unwrap())
}

#[tokio::test]
async fn test_accounting_commit_applies_increments() {
    let tenant_id = TenantId::new();
    let store = MemoryStore::with_tenant(tenant_id, Knobs::default());
    let mut accounting = open_transaction(&store).await;

    assert_eq!(accounting.state(), AccountingState::Began);
    accounting.increment(tenant_id, 3).await.unwrap();
    assert_eq!(store.count(tenant_id), 0);

    accounting.commit().await.unwrap();
    assert_eq!(accounting.state(), AccountingState::Committed);
    assert_eq!(store.count(tenant_id), 3);
}

#[tokio::test]
async fn test_accounting_rollback_discards_increments() {
    let tenant_id = TenantId::new();
    let store = MemoryStore::with_tenant(tenant_id, Knobs::default());
    let mut accounting = open_transaction(&store).await;

    accounting.increment(tenant_id, 1).await.unwrap();
    accounting.rollback().await.unwrap();
    accounting.rollback().await.unwrap();

    assert_eq!(accounting.state(), AccountingState::RolledBack);
    assert_eq!(store.rollbacks(), 1);
    assert_eq!(store.count(tenant_id), 0);
}

#[tokio::test]
async fn test_accounting_rejects_use_after_end() {
    let tenant_id = TenantId::new();
    let store = MemoryStore::with_tenant(tenant_id, Knobs::default());
    let mut accounting = open_transaction(&store).await;

    accounting.commit().await.unwrap();

    assert!(matches!(
        accounting.increment(tenant_id, 1).await,
        Err(CredentialError::TransactionClosed)
    ));
    assert!(matches!(
        accounting.commit().await,
        Err(CredentialError::TransactionClosed)
    ));
    assert!(matches!(
        accounting.rollback().await,
        Err(CredentialError::TransactionClosed)
    ));
    assert_eq!(accounting.state(), AccountingState::Committed);
}

#[tokio::test]
async fn test_accounting_failed_commit_is_rolled_back() {
    let tenant_id = TenantId::new();
    let knobs = Knobs {
        fail_commit: true,
        ..Knobs::default()
    };
    let store = MemoryStore::with_tenant(tenant_id, knobs);
    let mut accounting = open_transaction(&store).await;

    accounting.increment(tenant_id, 1).await.unwrap();
    assert!(accounting.commit().await.is_err());

    assert_eq!(accounting.state(), AccountingState::RolledBack);
    assert_eq!(store.count(tenant_id), 0);
}

#[tokio::test]
async fn test_accounting_unknown_tenant() {
    let store = MemoryStore::with_tenant(TenantId::new(), Knobs::default());
    let mut accounting = open_transaction(&store).await;
    let stranger = TenantId::new();

    assert!(matches!(
        accounting.increment(stranger, 1).await,
        Err(CredentialError::TenantNotFound(id)) if id == stranger
    ));
}
