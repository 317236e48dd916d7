//! Run-time options.
//!
//! The layout of a run (`Z`, `THREADS`, lanes per instance) is part of the
//! dispatcher's type and checked at compile time. [`RunOptions`] carries the
//! remaining knobs that only matter to the operating system and to
//! diagnostics.
//!
//! ```
//! use lockstep::RunOptions;
//!
//! let options = RunOptions::new()
//!     .with_thread_name("solver")
//!     .with_stack_size(4 << 20)
//!     .with_step_tracing(true)
//!     .build()
//!     .unwrap();
//! assert_eq!(options.thread_name(3), "solver-3");
//! ```

use crate::engine::error::ConfigError;
use crate::engine::types::ThreadIndex;

/// Smallest worker stack accepted by [`RunOptions::validate`].
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Options applied to every run of a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    thread_name: String,
    stack_size: Option<usize>,
    trace_steps: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            thread_name: "lockstep".to_string(),
            stack_size: None,
            trace_steps: false,
        }
    }
}

impl RunOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the options for values the worker pool cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        if let Some(requested) = self.stack_size {
            if requested < MIN_STACK_SIZE {
                return Err(ConfigError::StackTooSmall {
                    requested,
                    minimum: MIN_STACK_SIZE,
                });
            }
        }
        Ok(())
    }

    /// Validates and returns the options.
    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Set the worker thread name prefix.
    pub fn with_thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Set the worker stack size in bytes.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Log every step transition at `trace` level.
    pub fn with_step_tracing(mut self, enabled: bool) -> Self {
        self.trace_steps = enabled;
        self
    }

    /// Name given to worker `thread`.
    pub fn thread_name(&self, thread: ThreadIndex) -> String {
        format!("{}-{}", self.thread_name, thread)
    }

    /// Requested worker stack size, if any.
    pub fn stack_size(&self) -> Option<usize> {
        self.stack_size
    }

    /// Whether step transitions are logged.
    pub fn trace_steps(&self) -> bool {
        self.trace_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RunOptions::default().validate().is_ok());
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let err = RunOptions::new().with_thread_name("").build().unwrap_err();
        assert_eq!(err, ConfigError::EmptyThreadName);
    }

    #[test]
    fn tiny_stacks_are_rejected() {
        let err = RunOptions::new().with_stack_size(1024).build().unwrap_err();
        assert_eq!(
            err,
            ConfigError::StackTooSmall { requested: 1024, minimum: MIN_STACK_SIZE }
        );
    }
}
