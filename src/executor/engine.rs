//! The execution engine.
//!
//! A run walks the three action classes in the fixed order create, update,
//! delete. Within a class every identifier is dispatched to the backend,
//! concurrently or one at a time. A collector task owns the outcome maps
//! and records reports as they arrive; the dispatcher only reads the shared
//! failure flag to decide whether to keep going.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::changeset::{ActionClass, ChangeSet};
use crate::error::{BackendError, ExecutionError, Result};
use crate::graph::DependencyGraph;

use super::backend::{Backend, FailureReport, ServiceParams, SuccessReport};
use super::options::ExecutorOptions;
use super::result::{ExecutionResult, OperationResult};

/// Where one class execution currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Dispatching,
    Draining,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Draining => "draining",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Outcomes of one class plus the first failure seen.
#[derive(Debug, Default)]
struct Collected {
    result: OperationResult,
    first_failure: Option<FailureReport>,
}

/// Runs change sets against a [`Backend`].
#[derive(Debug, Clone, Default)]
pub struct Executor {
    options: ExecutorOptions,
}

impl Executor {
    /// Creates an executor with the given options.
    #[must_use]
    pub const fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    /// Returns the executor options.
    #[must_use]
    pub const fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Applies `changes` in the order create, update, delete.
    ///
    /// # Errors
    ///
    /// With `exit_on_error` set, returns [`ExecutionError::Aborted`] carrying
    /// the partial result as soon as a class records a failure. Later classes
    /// are not started.
    pub async fn run<B>(&self, changes: &ChangeSet, backend: Arc<B>) -> Result<ExecutionResult>
    where
        B: Backend + ?Sized + 'static,
    {
        let mut result = ExecutionResult::start(backend.name());
        let run_failed = Arc::new(AtomicBool::new(false));
        info!(
            "Starting run {} with {} ({changes})",
            result.run_id,
            backend.name()
        );

        for action in ActionClass::ALL {
            let collected = self
                .execute_class(action, changes.ids(action), &backend, &run_failed)
                .await;
            let first_failure = collected.first_failure;
            result.result_mut(action).merge(collected.result);

            if let Some(failure) = first_failure {
                self.check_abort(result.clone(), action, failure)?;
            }
        }

        let result = result.finish();
        info!("Finished {result}");
        Ok(result)
    }

    /// Applies `changes` class by class, splitting each class into stages
    /// that follow `graph`.
    ///
    /// Creates and updates run dependencies first; deletes run in the reverse
    /// order. An identifier ordered after a failed one is not dispatched and
    /// is recorded as [`BackendError::DependencyFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the graph has a cycle, or as [`Executor::run`]
    /// when a failure aborts the run.
    pub async fn run_staged<B>(
        &self,
        changes: &ChangeSet,
        backend: Arc<B>,
        graph: &DependencyGraph,
    ) -> Result<ExecutionResult>
    where
        B: Backend + ?Sized + 'static,
    {
        let mut result = ExecutionResult::start(backend.name());
        let run_failed = Arc::new(AtomicBool::new(false));
        info!(
            "Starting staged run {} with {} ({changes})",
            result.run_id,
            backend.name()
        );

        for action in ActionClass::ALL {
            let stages = graph.stages_for_action(action, changes.ids(action))?;

            let mut failed: HashSet<String> = HashSet::new();
            for (index, stage) in stages.iter().enumerate() {
                debug!("{action} stage {}/{}: {}", index + 1, stages.len(), stage.join(", "));

                let mut ready = Vec::with_capacity(stage.len());
                for id in stage {
                    match blocking_failure(graph, action, id, &failed, stages.as_slice()) {
                        Some(blocker) => {
                            warn!("Skipping {action} of {id}: {blocker} failed");
                            result
                                .result_mut(action)
                                .errors
                                .insert(id.clone(), BackendError::DependencyFailed(blocker));
                            failed.insert(id.clone());
                        }
                        None => ready.push(id.clone()),
                    }
                }

                let collected = self
                    .execute_class(action, &ready, &backend, &run_failed)
                    .await;
                failed.extend(collected.result.errors.keys().cloned());
                let first_failure = collected.first_failure;
                result.result_mut(action).merge(collected.result);

                if let Some(failure) = first_failure {
                    self.check_abort(result.clone(), action, failure)?;
                }
            }
        }

        let result = result.finish();
        info!("Finished {result}");
        Ok(result)
    }

    /// Dispatches one action class for `ids` and returns its outcomes.
    ///
    /// Unlike [`Executor::run`], this never fails: with `exit_on_error` set
    /// it stops dispatching after the first failure and returns what was
    /// recorded.
    pub async fn execute<B>(&self, action: ActionClass, ids: &[String], backend: &Arc<B>) -> OperationResult
    where
        B: Backend + ?Sized + 'static,
    {
        let run_failed = Arc::new(AtomicBool::new(false));
        self.execute_class(action, ids, backend, &run_failed)
            .await
            .result
    }

    /// Converts a recorded failure into an abort when `exit_on_error` is set.
    fn check_abort(&self, partial: ExecutionResult, action: ActionClass, failure: FailureReport) -> Result<()> {
        if !self.options.exit_on_error {
            return Ok(());
        }

        let (id, source) = failure;
        let partial = partial.finish();
        error!("Aborting run {} after {action} of {id} failed: {source}", partial.run_id);
        Err(ExecutionError::Aborted {
            backend: partial.backend.clone(),
            action,
            id,
            source,
            partial: Box::new(partial),
        }
        .into())
    }

    async fn execute_class<B>(
        &self,
        action: ActionClass,
        ids: &[String],
        backend: &Arc<B>,
        run_failed: &Arc<AtomicBool>,
    ) -> Collected
    where
        B: Backend + ?Sized + 'static,
    {
        let name = backend.name().to_string();
        let mode = self.options.mode();
        trace_phase(&name, action, Phase::Idle);

        if ids.is_empty() {
            debug!("{name} {action}: nothing to do");
            return Collected::default();
        }

        let (responses_tx, responses_rx) = mpsc::unbounded_channel::<SuccessReport>();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel::<FailureReport>();
        let (done_tx, done_rx) = oneshot::channel();
        let collector = tokio::spawn(collect(
            name.clone(),
            action,
            self.options.exit_on_error,
            responses_rx,
            errors_rx,
            done_rx,
        ));

        let limiter = self
            .options
            .max_concurrency
            .filter(|_| self.options.parallel)
            .map(|limit| Arc::new(Semaphore::new(limit.get())));
        let mut tasks = JoinSet::new();

        trace_phase(&name, action, Phase::Dispatching);
        for id in ids {
            let permit = match &limiter {
                Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
                None => None,
            };

            if self.options.exit_on_error && run_failed.load(Ordering::Acquire) {
                warn!("{name} {action}: failure recorded, not dispatching {id} or later");
                break;
            }

            let params = ServiceParams::new(
                id.clone(),
                responses_tx.clone(),
                errors_tx.clone(),
                Arc::clone(run_failed),
            );
            let call = supervise(Arc::clone(backend), action, params, self.options.operation_timeout);

            debug!("{name} executing {mode} {action} of {id}");
            if self.options.parallel {
                tasks.spawn(async move {
                    let _permit = permit;
                    call.await;
                });
            } else {
                call.await;
            }
        }

        trace_phase(&name, action, Phase::Draining);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("{name} {action} task failed: {e}");
            }
        }

        drop(responses_tx);
        drop(errors_tx);
        if done_tx.send(()).is_err() {
            debug!("{name} {action} collector already stopped");
        }

        let collected = match collector.await {
            Ok(collected) => collected,
            Err(e) => {
                error!("{name} {action} collector failed: {e}");
                Collected::default()
            }
        };

        trace_phase(&name, action, Phase::Done);
        info!(
            "{name} {action}: {} succeeded, {} failed",
            collected.result.responses.len(),
            collected.result.errors.len()
        );
        collected
    }
}

fn trace_phase(backend: &str, action: ActionClass, phase: Phase) {
    debug!("{backend} {action} -> {phase}");
}

/// Returns the failed identifier that must block `id`, if any.
///
/// Creates and updates wait on their dependencies; deletes wait on the
/// identifiers that depend on them.
fn blocking_failure(
    graph: &DependencyGraph,
    action: ActionClass,
    id: &str,
    failed: &HashSet<String>,
    stages: &[Vec<String>],
) -> Option<String> {
    if failed.is_empty() {
        return None;
    }

    match action {
        ActionClass::Create | ActionClass::Update => graph
            .dependencies_of(id)
            .find(|dep| failed.contains(*dep))
            .map(String::from),
        ActionClass::Delete => stages
            .iter()
            .flatten()
            .filter(|other| failed.contains(other.as_str()))
            .find(|other| graph.dependencies_of(other).any(|dep| dep == id))
            .cloned(),
    }
}

/// Runs one backend operation and guarantees exactly one report for it.
async fn supervise<B>(backend: Arc<B>, action: ActionClass, params: ServiceParams, deadline: Option<Duration>)
where
    B: Backend + ?Sized + 'static,
{
    let watcher = params.watcher();
    let mut call = tokio::spawn(async move { backend.dispatch(action, params).await });

    let joined = match deadline {
        Some(limit) => match tokio::time::timeout(limit, &mut call).await {
            Ok(joined) => joined,
            Err(_) => {
                call.abort();
                warn!("{action} of {} timed out after {limit:?}", watcher.id());
                watcher.fail(BackendError::Timeout(limit));
                return;
            }
        },
        None => call.await,
    };

    match joined {
        Ok(()) if watcher.is_reported() => {}
        Ok(()) => {
            warn!("{action} of {} returned without an outcome", watcher.id());
            watcher.fail(BackendError::NoOutcome);
        }
        Err(e) => {
            error!("{action} of {} did not complete: {e}", watcher.id());
            watcher.fail(BackendError::Panicked(panic_message(e)));
        }
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("unknown panic"))
}

/// Records every report for one class until told the class is done.
async fn collect(
    backend: String,
    action: ActionClass,
    exit_on_error: bool,
    mut responses: mpsc::UnboundedReceiver<SuccessReport>,
    mut errors: mpsc::UnboundedReceiver<FailureReport>,
    mut done: oneshot::Receiver<()>,
) -> Collected {
    let mut collected = Collected::default();

    loop {
        tokio::select! {
            biased;
            Some((id, payload)) = responses.recv() => {
                debug!("{backend} {action} of {id} succeeded");
                collected.result.responses.insert(id, payload);
            }
            Some((id, err)) = errors.recv() => {
                record_failure(&backend, action, exit_on_error, &mut collected, id, err);
            }
            _ = &mut done => break,
        }
    }

    while let Ok((id, payload)) = responses.try_recv() {
        collected.result.responses.insert(id, payload);
    }
    while let Ok((id, err)) = errors.try_recv() {
        record_failure(&backend, action, exit_on_error, &mut collected, id, err);
    }

    collected
}

fn record_failure(
    backend: &str,
    action: ActionClass,
    exit_on_error: bool,
    collected: &mut Collected,
    id: String,
    err: BackendError,
) {
    if exit_on_error {
        error!("{backend} {action} encountered an error on {id}, aborting: {err}");
    } else {
        error!("{backend} {action} encountered an error on {id}, continuing: {err}");
    }
    if collected.first_failure.is_none() {
        collected.first_failure = Some((id.clone(), err.clone()));
    }
    collected.result.errors.insert(id, err);
}
