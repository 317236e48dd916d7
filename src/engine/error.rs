//! Error types for dispatcher configuration and execution.
//!
//! Layout mistakes (a work-unit count that does not divide evenly, a schedule
//! whose length disagrees with `MAX_STEP`, a primary variant with a different
//! schedule) are rejected at compile time and never reach these types. What is
//! left are the failures that can only be observed while setting up or driving
//! a run:
//!
//! * invalid run options ([`ConfigError`]),
//! * the worker pool could not be created,
//! * a step transitioned outside the schedule.
//!
//! A participant miscount at the barrier is *not* an error value: it
//! deadlocks, and the process has to be restarted.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] gives a short single-line message for logs.
//! * [`fmt::Debug`] (derived) keeps the full structure.

use std::fmt;

use crate::engine::types::{ControlCode, StepIndex, ThreadIndex};

/// Returned when [`RunOptions`](crate::engine::config::RunOptions) fail
/// validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The worker thread name prefix is empty.
    EmptyThreadName,

    /// A stack size was requested that cannot hold a worker.
    StackTooSmall {
        /// Requested stack size in bytes.
        requested: usize,

        /// Smallest accepted stack size in bytes.
        minimum: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyThreadName => f.write_str("worker thread name prefix is empty"),
            ConfigError::StackTooSmall { requested, minimum } => write!(
                f,
                "worker stack size {} bytes is below the minimum of {} bytes",
                requested, minimum
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Returned when a step reports a next step beyond the schedule.
///
/// ### Fields
/// * `thread`: Worker that observed the transition.
/// * `from`: Step that produced the code.
/// * `code`: Offending control code.
/// * `max_step`: Highest valid step index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutOfRangeError {
    /// Worker that observed the transition.
    pub thread: ThreadIndex,

    /// Step that produced the code.
    pub from: StepIndex,

    /// Offending control code.
    pub code: ControlCode,

    /// Highest valid step index.
    pub max_step: StepIndex,
}

impl fmt::Display for StepOutOfRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thread {} step {} transitioned to {} (max step {})",
            self.thread, self.from, self.code, self.max_step
        )
    }
}

impl std::error::Error for StepOutOfRangeError {}

/// Aggregate error of [`Dispatcher::run`](crate::engine::dispatcher::Dispatcher::run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Run options were rejected.
    Config(ConfigError),

    /// The worker pool could not be built; carries the pool's message.
    ThreadPool(String),

    /// A step transitioned outside `[0, MAX_STEP]`.
    StepOutOfRange(StepOutOfRangeError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Config(e) => write!(f, "invalid run options: {e}"),
            DispatchError::ThreadPool(msg) => write!(f, "failed to start worker pool: {msg}"),
            DispatchError::StepOutOfRange(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Config(e) => Some(e),
            DispatchError::ThreadPool(_) => None,
            DispatchError::StepOutOfRange(e) => Some(e),
        }
    }
}

impl From<ConfigError> for DispatchError {
    fn from(e: ConfigError) -> Self { DispatchError::Config(e) }
}

impl From<StepOutOfRangeError> for DispatchError {
    fn from(e: StepOutOfRangeError) -> Self { DispatchError::StepOutOfRange(e) }
}

impl From<rayon::ThreadPoolBuildError> for DispatchError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self { DispatchError::ThreadPool(e.to_string()) }
}

/// Result alias for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn messages_are_single_line() {
        let e = DispatchError::from(StepOutOfRangeError { thread: 2, from: 1, code: 9, max_step: 3 });
        assert_eq!(e.to_string(), "thread 2 step 1 transitioned to 9 (max step 3)");
        assert!(e.source().is_some());

        let c = DispatchError::from(ConfigError::StackTooSmall { requested: 1, minimum: 4096 });
        assert!(!c.to_string().contains('\n'));
    }
}
