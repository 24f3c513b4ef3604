//! Relay orchestration service.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ferry_shared::TenantId;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, error, info, warn};

use super::accounting::Accounting;
use super::outcome::RelayOutcome;
use crate::blob::{BlobError, BlobUploader};
use crate::credential::{CredentialError, CredentialStore, TenantCredential};
use crate::staging::{StagedFile, StagingArea, StagingError};

type StageResult = Result<StagedFile, StagingError>;
type LookupResult = Result<Option<TenantCredential>, CredentialError>;

/// One inbound upload.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    /// Raw API key presented by the caller.
    pub api_key: String,
    /// File contents, already size-checked by the transport.
    pub payload: Bytes,
    /// Original filename, if the caller sent one.
    pub filename: Option<String>,
    /// Content type, if the caller sent one.
    pub content_type: Option<String>,
}

/// Coordinates staging, credential lookup, upload and accounting.
///
/// Handles are injected at construction; the service owns no global state.
pub struct RelayService<S, U> {
    store: Arc<S>,
    uploader: Arc<U>,
    staging: Arc<StagingArea>,
}

impl<S, U> Clone for RelayService<S, U> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            uploader: Arc::clone(&self.uploader),
            staging: Arc::clone(&self.staging),
        }
    }
}

impl<S, U> std::fmt::Debug for RelayService<S, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayService")
            .field("staging", &self.staging.dir())
            .finish_non_exhaustive()
    }
}

impl<S: CredentialStore, U: BlobUploader> RelayService<S, U> {
    /// Create a new relay service.
    #[must_use]
    pub fn new(store: Arc<S>, uploader: Arc<U>, staging: StagingArea) -> Self {
        Self {
            store,
            uploader,
            staging: Arc::new(staging),
        }
    }

    /// Relay with a deadline `budget` from now.
    pub async fn relay_within(&self, request: RelayRequest, budget: Duration) -> RelayOutcome {
        self.relay(request, Instant::now() + budget).await
    }

    /// Relay one upload, finishing by `deadline`.
    ///
    /// Always returns exactly one outcome. The counter is committed only after
    /// the upload succeeds, and the URL is returned only after the commit.
    pub async fn relay(&self, request: RelayRequest, deadline: Instant) -> RelayOutcome {
        let (file, credential) = match self.stage_and_resolve(request, deadline).await {
            Ok(prepared) => prepared,
            Err(outcome) => return outcome,
        };
        let tenant_id = credential.tenant_id;

        let url = match self.upload(&file, credential, deadline).await {
            Ok(url) => url,
            Err(outcome) => return outcome,
        };

        let recorded = self.record_usage(tenant_id, deadline).await;
        self.staging.release(&file).await;

        match recorded {
            Ok(()) => {
                info!(tenant_id = %tenant_id, %url, size = file.size, "Upload relayed");
                RelayOutcome::Success { url }
            }
            Err(outcome) => {
                warn!(tenant_id = %tenant_id, outcome = outcome.label(), "Upload not recorded, URL discarded");
                outcome
            }
        }
    }

    /// Stage the payload and resolve the key concurrently.
    async fn stage_and_resolve(
        &self,
        request: RelayRequest,
        deadline: Instant,
    ) -> Result<(StagedFile, TenantCredential), RelayOutcome> {
        let RelayRequest {
            api_key,
            payload,
            filename,
            content_type,
        } = request;

        let (stage_tx, mut stage_rx) = oneshot::channel::<StageResult>();
        let staging = Arc::clone(&self.staging);
        tokio::spawn(async move {
            let result = staging
                .stage(Cursor::new(payload), filename, content_type)
                .await;
            // Nobody is waiting any more; the file is ours to remove.
            if let Err(Ok(file)) = stage_tx.send(result) {
                staging.release(&file).await;
            }
        });

        let (lookup_tx, mut lookup_rx) = oneshot::channel::<LookupResult>();
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            // A dropped receiver means the attempt already ended; the record is unneeded.
            let _ = lookup_tx.send(store.lookup(&api_key).await);
        });

        let timer = sleep_until(deadline);
        tokio::pin!(timer);

        let mut staged: Option<StageResult> = None;
        let mut credential: Option<TenantCredential> = None;

        let failure = loop {
            if staged.is_some() && credential.is_some() {
                break None;
            }

            tokio::select! {
                result = &mut stage_rx, if staged.is_none() => {
                    staged = Some(result.unwrap_or(Err(StagingError::Interrupted)));
                }
                result = &mut lookup_rx, if credential.is_none() => match resolved(result) {
                    Some(record) => credential = Some(record),
                    None => break Some(RelayOutcome::CredentialNotFound),
                },
                () = &mut timer => break Some(RelayOutcome::TimedOut),
            }
        };

        if let Some(outcome) = failure {
            debug!(outcome = outcome.label(), "Abandoning staged payload");
            self.abandon_staging(staged, stage_rx);
            return Err(outcome);
        }

        match (staged, credential) {
            (Some(Ok(file)), Some(record)) => Ok((file, record)),
            (Some(Err(e)), _) => {
                error!(error = %e, "Staging failed");
                Err(RelayOutcome::StagingFailed {
                    cause: e.to_string(),
                })
            }
            // The loop only exits normally with both results present.
            _ => Err(RelayOutcome::StagingFailed {
                cause: StagingError::Interrupted.to_string(),
            }),
        }
    }

    /// Release whatever staging produced, now or when it finishes.
    fn abandon_staging(
        &self,
        staged: Option<StageResult>,
        pending: oneshot::Receiver<StageResult>,
    ) {
        let staging = Arc::clone(&self.staging);
        match staged {
            Some(Ok(file)) => {
                tokio::spawn(async move { staging.release(&file).await });
            }
            Some(Err(_)) => {}
            None => {
                tokio::spawn(async move {
                    if let Ok(Ok(file)) = pending.await {
                        staging.release(&file).await;
                    }
                });
            }
        }
    }

    /// Upload the staged file, racing the deadline.
    ///
    /// On failure the file is released before returning; on timeout the task
    /// is aborted and released in the background.
    async fn upload(
        &self,
        file: &StagedFile,
        credential: TenantCredential,
        deadline: Instant,
    ) -> Result<String, RelayOutcome> {
        let uploader = Arc::clone(&self.uploader);
        let task_file = file.clone();
        let tenant_id = credential.tenant_id;
        let mut handle: JoinHandle<Result<String, BlobError>> = tokio::spawn(async move {
            uploader
                .upload(&task_file, &credential.destination, credential.tenant_id)
                .await
        });

        match timeout_at(deadline, &mut handle).await {
            Ok(Ok(Ok(url))) => Ok(url),
            Ok(Ok(Err(e))) => {
                warn!(tenant_id = %tenant_id, error = %e, "Upload failed");
                self.staging.release(file).await;
                Err(RelayOutcome::UploadFailed {
                    cause: e.to_string(),
                })
            }
            Ok(Err(e)) => {
                error!(tenant_id = %tenant_id, error = %e, "Upload task ended unexpectedly");
                self.staging.release(file).await;
                Err(RelayOutcome::UploadFailed {
                    cause: "upload task ended unexpectedly".to_string(),
                })
            }
            Err(_) => {
                warn!(tenant_id = %tenant_id, "Upload exceeded deadline, aborting");
                handle.abort();
                let staging = Arc::clone(&self.staging);
                let file = file.clone();
                tokio::spawn(async move {
                    let _ = handle.await;
                    staging.release(&file).await;
                });
                Err(RelayOutcome::TimedOut)
            }
        }
    }

    /// Increment the tenant's counter by one in a single transaction.
    async fn record_usage(&self, tenant_id: TenantId, deadline: Instant) -> Result<(), RelayOutcome> {
        let txn = match timeout_at(deadline, self.store.begin()).await {
            Ok(Ok(txn)) => txn,
            Ok(Err(e)) => {
                error!(tenant_id = %tenant_id, error = %e, "Failed to begin accounting transaction");
                return Err(RelayOutcome::AccountingFailed {
                    cause: e.to_string(),
                });
            }
            Err(_) => return Err(RelayOutcome::TimedOut),
        };
        let mut accounting = Accounting::new(txn);

        let failure = match timeout_at(deadline, accounting.increment(tenant_id, 1)).await {
            Ok(Ok(())) if Instant::now() < deadline => None,
            Ok(Ok(())) | Err(_) => Some(RelayOutcome::TimedOut),
            Ok(Err(e)) => {
                error!(tenant_id = %tenant_id, error = %e, "Failed to increment request counter");
                Some(RelayOutcome::AccountingFailed {
                    cause: e.to_string(),
                })
            }
        };

        if let Some(outcome) = failure {
            if let Err(e) = accounting.rollback().await {
                warn!(tenant_id = %tenant_id, error = %e, "Accounting rollback failed");
            }
            return Err(outcome);
        }

        // An issued commit is awaited to completion, never raced.
        accounting.commit().await.map_err(|e| {
            error!(tenant_id = %tenant_id, error = %e, "Failed to commit accounting transaction");
            RelayOutcome::AccountingFailed {
                cause: e.to_string(),
            }
        })
    }
}

/// Collapse a lookup report into a record, logging store faults.
fn resolved(result: Result<LookupResult, oneshot::error::RecvError>) -> Option<TenantCredential> {
    match result {
        Ok(Ok(record)) => record,
        Ok(Err(e)) => {
            error!(error = %e, "Credential lookup failed");
            None
        }
        Err(_) => {
            error!("Credential lookup task ended unexpectedly");
            None
        }
    }
}
