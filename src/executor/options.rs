//! Executor options.

use std::num::NonZeroUsize;
use std::time::Duration;

/// How the executor dispatches operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Dispatch every operation of a class concurrently.
    pub parallel: bool,
    /// Stop dispatching after the first recorded failure.
    pub exit_on_error: bool,
    /// Upper bound on in-flight operations in parallel mode.
    pub max_concurrency: Option<NonZeroUsize>,
    /// Deadline for a single operation.
    pub operation_timeout: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            exit_on_error: true,
            max_concurrency: None,
            operation_timeout: None,
        }
    }
}

impl ExecutorOptions {
    /// Sets parallel or sequential dispatch.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets whether the first failure stops the run.
    #[must_use]
    pub const fn with_exit_on_error(mut self, exit_on_error: bool) -> Self {
        self.exit_on_error = exit_on_error;
        self
    }

    /// Caps concurrent operations in parallel mode.
    #[must_use]
    pub const fn with_max_concurrency(mut self, limit: Option<NonZeroUsize>) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Sets the per-operation deadline.
    #[must_use]
    pub const fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Returns the dispatch mode as a word, for logs.
    #[must_use]
    pub const fn mode(&self) -> &'static str {
        if self.parallel { "parallel" } else { "sequential" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExecutorOptions::default();
        assert!(options.parallel);
        assert!(options.exit_on_error);
        assert!(options.max_concurrency.is_none());
        assert!(options.operation_timeout.is_none());
        assert_eq!(options.mode(), "parallel");
    }

    #[test]
    fn test_builders() {
        let options = ExecutorOptions::default()
            .with_parallel(false)
            .with_exit_on_error(false)
            .with_max_concurrency(NonZeroUsize::new(4))
            .with_operation_timeout(Some(Duration::from_secs(30)));

        assert_eq!(options.mode(), "sequential");
        assert!(!options.exit_on_error);
        assert_eq!(options.max_concurrency.map(NonZeroUsize::get), Some(4));
        assert_eq!(options.operation_timeout, Some(Duration::from_secs(30)));
    }
}
