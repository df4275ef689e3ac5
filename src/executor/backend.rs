//! The contract between the executor and a provisioning backend.
//!
//! A backend receives one [`ServiceParams`] per identifier and reports the
//! outcome through it exactly once. Reporting is fire-and-forget: the
//! executor's collector records outcomes as they arrive.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::changeset::ActionClass;
use crate::error::BackendError;

/// Success report: identifier and backend payload.
pub(crate) type SuccessReport = (String, String);

/// Failure report: identifier and the error the backend raised.
pub(crate) type FailureReport = (String, BackendError);

/// A provisioning backend.
///
/// Implementations perform the create, update, or delete of a single
/// resource and report the result via [`ServiceParams::succeed`] or
/// [`ServiceParams::fail`]. Returning without reporting is recorded as
/// [`BackendError::NoOutcome`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable backend name, used in logs and results.
    fn name(&self) -> &str;

    /// Creates the resource named by `params`.
    async fn create(&self, params: ServiceParams);

    /// Updates the resource named by `params`.
    async fn update(&self, params: ServiceParams);

    /// Deletes the resource named by `params`.
    async fn delete(&self, params: ServiceParams);

    /// Routes `params` to the operation for `action`.
    async fn dispatch(&self, action: ActionClass, params: ServiceParams) {
        match action {
            ActionClass::Create => self.create(params).await,
            ActionClass::Update => self.update(params).await,
            ActionClass::Delete => self.delete(params).await,
        }
    }
}

/// Per-identifier handle passed to a backend operation.
///
/// The first report wins. Handles cloned inside the executor share that
/// state, so an identifier is delivered to the collector at most once.
#[derive(Debug)]
pub struct ServiceParams {
    /// Resource identifier.
    id: String,
    /// Success channel shared by every operation of one class.
    responses: UnboundedSender<SuccessReport>,
    /// Failure channel shared by every operation of one class.
    errors: UnboundedSender<FailureReport>,
    /// Set once an outcome for `id` has been delivered.
    reported: Arc<AtomicBool>,
    /// Run-wide failure flag read by the dispatcher.
    run_failed: Arc<AtomicBool>,
}

impl ServiceParams {
    pub(crate) fn new(
        id: String,
        responses: UnboundedSender<SuccessReport>,
        errors: UnboundedSender<FailureReport>,
        run_failed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            responses,
            errors,
            reported: Arc::new(AtomicBool::new(false)),
            run_failed,
        }
    }

    /// Returns a handle for the same identifier that shares its report state.
    pub(crate) fn watcher(&self) -> Self {
        Self {
            id: self.id.clone(),
            responses: self.responses.clone(),
            errors: self.errors.clone(),
            reported: Arc::clone(&self.reported),
            run_failed: Arc::clone(&self.run_failed),
        }
    }

    /// Returns the resource identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns true once an outcome has been delivered for this identifier.
    #[must_use]
    pub fn is_reported(&self) -> bool {
        self.reported.load(Ordering::Acquire)
    }

    /// Reports a successful operation with the backend's payload.
    pub fn succeed(self, payload: impl Into<String>) {
        if self.claim() && self.responses.send((self.id.clone(), payload.into())).is_err() {
            debug!("Collector gone, dropping success for {}", self.id);
        }
    }

    /// Reports a failed operation.
    pub fn fail(self, error: BackendError) {
        if !self.claim() {
            return;
        }
        self.run_failed.store(true, Ordering::Release);
        if self.errors.send((self.id.clone(), error)).is_err() {
            debug!("Collector gone, dropping failure for {}", self.id);
        }
    }

    /// Reports `outcome`, whichever way it went.
    pub fn report(self, outcome: Result<String, BackendError>) {
        match outcome {
            Ok(payload) => self.succeed(payload),
            Err(error) => self.fail(error),
        }
    }

    /// Marks the identifier as reported. Returns false if it already was.
    fn claim(&self) -> bool {
        let first = !self.reported.swap(true, Ordering::AcqRel);
        if !first {
            warn!("Ignoring repeated outcome for {}", self.id);
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_first_report_wins() {
        let (ok_tx, mut ok_rx) = mpsc::unbounded_channel();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        let failed = Arc::new(AtomicBool::new(false));

        let params = ServiceParams::new(String::from("vpc"), ok_tx, err_tx, Arc::clone(&failed));
        let watcher = params.watcher();

        params.succeed("stack-id");
        assert!(watcher.is_reported());
        watcher.fail(BackendError::NoOutcome);

        assert_eq!(
            ok_rx.try_recv().expect("success delivered"),
            (String::from("vpc"), String::from("stack-id"))
        );
        assert!(err_rx.try_recv().is_err());
        assert!(!failed.load(Ordering::Acquire));
    }

    #[test]
    fn test_fail_raises_run_flag() {
        let (ok_tx, _ok_rx) = mpsc::unbounded_channel();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        let failed = Arc::new(AtomicBool::new(false));

        let params = ServiceParams::new(String::from("db"), ok_tx, err_tx, Arc::clone(&failed));
        params.report(Err(BackendError::rejected("quota exceeded")));

        assert!(failed.load(Ordering::Acquire));
        let (id, error) = err_rx.try_recv().expect("failure delivered");
        assert_eq!(id, "db");
        assert_eq!(error.to_string(), "quota exceeded");
    }
}
