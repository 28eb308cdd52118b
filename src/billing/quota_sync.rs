use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{channel, error::TrySendError, Sender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::{QuotaProvider, UserDirectory};
use crate::contracts::PermissionSet;

/// key: quota-sync-job -> one propagation attempt
#[derive(Debug, Clone)]
pub struct QuotaSyncJob {
    pub id: Uuid,
    pub user_id: i64,
    pub permissions: PermissionSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaSyncOutcome {
    Applied { identifier: String, quota_gb: u64 },
    Skipped { reason: String },
    Failed { reason: String },
}

impl QuotaSyncOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, QuotaSyncOutcome::Applied { .. })
    }
}

impl fmt::Display for QuotaSyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaSyncOutcome::Applied {
                identifier,
                quota_gb,
            } => write!(f, "applied {quota_gb} GB to {identifier}"),
            QuotaSyncOutcome::Skipped { reason } => write!(f, "skipped: {reason}"),
            QuotaSyncOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Resolves the user's external identifier and pushes the plan's quota to the
/// storage provider. One attempt per job; every failure ends in the log.
#[derive(Clone)]
pub struct QuotaSynchronizer {
    directory: Arc<dyn UserDirectory>,
    provider: Arc<dyn QuotaProvider>,
    quota_attribute: String,
    step_timeout: Duration,
}

impl QuotaSynchronizer {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        provider: Arc<dyn QuotaProvider>,
        quota_attribute: impl Into<String>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            provider,
            quota_attribute: quota_attribute.into(),
            step_timeout,
        }
    }

    pub async fn run(&self, job: &QuotaSyncJob) -> QuotaSyncOutcome {
        let details = match self.bounded(self.directory.user_details(job.user_id)).await {
            Ok(details) => details,
            Err(reason) => {
                return QuotaSyncOutcome::Failed {
                    reason: format!("user lookup failed: {reason}"),
                }
            }
        };

        let Some(quota_gb) = job.permissions.numeric(&self.quota_attribute) else {
            return QuotaSyncOutcome::Skipped {
                reason: format!("no numeric '{}' in permissions", self.quota_attribute),
            };
        };

        match self
            .bounded(self.provider.set_user_quota(&details.email, quota_gb))
            .await
        {
            Ok(()) => QuotaSyncOutcome::Applied {
                identifier: details.email,
                quota_gb,
            },
            Err(reason) => QuotaSyncOutcome::Failed {
                reason: format!("quota update failed: {reason}"),
            },
        }
    }

    async fn bounded<T, F>(&self, step: F) -> Result<T, String>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match timeout(self.step_timeout, step).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(_) => Err(format!("timed out after {:?}", self.step_timeout)),
        }
    }
}

struct Envelope {
    job: QuotaSyncJob,
    reply: oneshot::Sender<QuotaSyncOutcome>,
}

/// Receipt for a dispatched job. Dropping it is the normal fire-and-forget
/// path; awaiting it yields the outcome once the worker is done.
#[derive(Debug)]
pub struct QuotaSyncTicket {
    pub job_id: Uuid,
    receiver: oneshot::Receiver<QuotaSyncOutcome>,
}

impl QuotaSyncTicket {
    pub async fn outcome(self) -> Option<QuotaSyncOutcome> {
        self.receiver.await.ok()
    }
}

/// key: quota-sync-handle -> enqueue interface
#[derive(Clone)]
pub struct QuotaSyncHandle {
    sender: Sender<Envelope>,
}

impl QuotaSyncHandle {
    /// Never waits: a full or closed queue drops the job with a warning.
    pub fn dispatch(&self, user_id: i64, permissions: PermissionSet) -> Option<QuotaSyncTicket> {
        let job = QuotaSyncJob {
            id: Uuid::new_v4(),
            user_id,
            permissions,
        };
        let job_id = job.id;
        let (reply, receiver) = oneshot::channel();
        match self.sender.try_send(Envelope { job, reply }) {
            Ok(()) => Some(QuotaSyncTicket { job_id, receiver }),
            Err(TrySendError::Full(_)) => {
                warn!(%user_id, job = %job_id, "quota sync queue full; dropping job");
                None
            }
            Err(TrySendError::Closed(_)) => {
                warn!(%user_id, job = %job_id, "quota sync worker stopped; dropping job");
                None
            }
        }
    }
}

pub fn start_quota_sync_worker(
    synchronizer: QuotaSynchronizer,
    queue_depth: usize,
) -> (QuotaSyncHandle, JoinHandle<()>) {
    let (tx, mut rx) = channel::<Envelope>(queue_depth.max(1));
    let worker = tokio::spawn(async move {
        while let Some(Envelope { job, reply }) = rx.recv().await {
            let synchronizer = synchronizer.clone();
            tokio::spawn(async move {
                let outcome = synchronizer.run(&job).await;
                match &outcome {
                    QuotaSyncOutcome::Applied {
                        identifier,
                        quota_gb,
                    } => info!(
                        user_id = job.user_id,
                        job = %job.id,
                        %identifier,
                        quota_gb,
                        "external quota updated"
                    ),
                    QuotaSyncOutcome::Skipped { reason } => warn!(
                        user_id = job.user_id,
                        job = %job.id,
                        %reason,
                        "quota sync skipped; external quota left unchanged"
                    ),
                    QuotaSyncOutcome::Failed { reason } => error!(
                        user_id = job.user_id,
                        job = %job.id,
                        %reason,
                        "quota sync failed; external quota may diverge until the next plan change"
                    ),
                }
                let _ = reply.send(outcome);
            });
        }
    });
    (QuotaSyncHandle { sender: tx }, worker)
}
