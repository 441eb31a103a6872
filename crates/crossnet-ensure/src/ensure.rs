//! Create-or-replace reconciliation
//!
//! [`ensure`] makes the store hold exactly the desired object. A fresh name
//! is simply created. An existing object is deleted and recreated in full,
//! never merged, so the result always matches the last submitted spec.
//! Another writer may recreate the object between our delete and create;
//! that contention is retried a bounded number of times with backoff.

use std::fmt;

use kube::{Resource, ResourceExt};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crossnet_common::BackoffPolicy;

use crate::store::{ObjectStore, StoreError};

/// Why an ensure gave up
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FailureReason {
    /// The pre-existing object could not be deleted
    #[error("failed to delete pre-existing object: {0}")]
    Delete(StoreError),

    /// The object could not be created
    #[error("failed to create object: {0}")]
    Create(StoreError),

    /// Another writer kept recreating the object
    #[error("gave up after {attempts} delete and create attempts")]
    ConflictExhausted {
        /// Replace iterations made
        attempts: u32,
    },
}

/// Result of one ensure call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The name was free and the object was created
    Created,
    /// An existing object was replaced with the desired one
    ReplacedAfterConflict,
    /// The store could not be brought to the desired state
    Failed(FailureReason),
}

impl ReconcileOutcome {
    /// True when the store now holds the desired object
    pub fn is_success(&self) -> bool {
        !matches!(self, ReconcileOutcome::Failed(_))
    }

    /// Convert into a `Result`, keeping the failure reason as the error
    pub fn into_result(self) -> Result<ReconcileOutcome, FailureReason> {
        match self {
            ReconcileOutcome::Failed(reason) => Err(reason),
            outcome => Ok(outcome),
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Created => f.write_str("created"),
            ReconcileOutcome::ReplacedAfterConflict => f.write_str("replaced"),
            ReconcileOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Make `store` hold exactly `desired`.
///
/// 1. Create. Success is [`ReconcileOutcome::Created`]; any failure other
///    than `AlreadyExists` is returned as `Failed(Create)` without retry.
/// 2. Otherwise, up to `policy.max_attempts` times: delete by name, then
///    create. A delete failure is `Failed(Delete)`, except that `NotFound`
///    after the first attempt means the object is already gone and the
///    create goes ahead. A create that loses to another writer sleeps for
///    the policy's delay and loops; any other create failure is
///    `Failed(Create)`.
/// 3. Running out of attempts is `Failed(ConflictExhausted)`.
///
/// Any `resourceVersion` on `desired` is cleared before it is submitted.
#[instrument(skip_all, fields(name = %desired.name_any()))]
pub async fn ensure<K, S>(store: &S, desired: &K, policy: &BackoffPolicy) -> ReconcileOutcome
where
    K: Resource + Clone + Send + Sync + 'static,
    S: ObjectStore<K> + ?Sized,
{
    let name = desired.name_any();
    let mut desired = desired.clone();
    desired.meta_mut().resource_version = None;
    let desired = &desired;

    match store.create(desired).await {
        Ok(_) => {
            info!("Created");
            return ReconcileOutcome::Created;
        }
        Err(StoreError::AlreadyExists { .. }) => {
            debug!("Object already exists, replacing");
        }
        Err(e) => {
            warn!(error = %e, "Create failed");
            return ReconcileOutcome::Failed(FailureReason::Create(e));
        }
    }

    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match store.delete(&name).await {
            Ok(()) => {}
            // The previous create lost a conflict without recreating the object
            Err(StoreError::NotFound { .. }) if attempt > 1 => {
                debug!(attempt, "Object already gone, recreating");
            }
            Err(e) => {
                warn!(attempt, error = %e, "Failed to delete pre-existing object");
                return ReconcileOutcome::Failed(FailureReason::Delete(e));
            }
        }

        match store.create(desired).await {
            Ok(_) => {
                info!(attempt, "Replaced pre-existing object");
                return ReconcileOutcome::ReplacedAfterConflict;
            }
            Err(e) if e.is_contention() => {
                if attempt < max_attempts {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Object recreated by another writer, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                warn!(attempt, error = %e, "Create after delete failed");
                return ReconcileOutcome::Failed(FailureReason::Create(e));
            }
        }
    }

    warn!(attempts = max_attempts, "Giving up on contended object");
    ReconcileOutcome::Failed(FailureReason::ConflictExhausted {
        attempts: max_attempts,
    })
}
