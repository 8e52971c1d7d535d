#![deny(missing_docs)]
//! Shared logging utilities for the jobfill workspace.
//!
//! This crate provides the `fill_*` logging macros used across the codebase,
//! a per-thread execution-context tag that prefixes every message, and a
//! minimal test initializer for the global logger.

use std::cell::Cell;
use std::fmt;

/// The isolated execution context a thread is currently working for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecContext {
    /// No context was assigned (tests, startup).
    #[default]
    Unassigned,
    /// The user-visible control surface.
    Foreground,
    /// The long-lived controller that owns outbound requests.
    Background,
    /// The agent operating on the target page document.
    Page,
}

impl ExecContext {
    /// Short tag used as the log line prefix.
    pub fn tag(self) -> &'static str {
        match self {
            ExecContext::Unassigned => "-",
            ExecContext::Foreground => "foreground",
            ExecContext::Background => "background",
            ExecContext::Page => "page",
        }
    }
}

impl fmt::Display for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

thread_local! {
    /// Thread-local storage for the execution context of the current thread.
    static EXEC_CONTEXT: Cell<ExecContext> = const { Cell::new(ExecContext::Unassigned) };
}

/// Sets the execution context for the current thread.
/// Worker threads of a context runtime call this once when they start.
pub fn set_context(context: ExecContext) {
    EXEC_CONTEXT.with(|v| v.set(context));
}

/// Retrieves the execution context for the current thread.
/// Returns `ExecContext::Unassigned` if the context has not been set.
pub fn current_context() -> ExecContext {
    EXEC_CONTEXT.with(|v| v.get())
}

/// Logs a trace-level message tagged with the current execution context.
#[macro_export]
macro_rules! fill_trace {
    ($($arg:tt)*) => {{
        log::trace!("[{}] {}", $crate::current_context(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message tagged with the current execution context.
#[macro_export]
macro_rules! fill_info {
    ($($arg:tt)*) => {{
        log::info!("[{}] {}", $crate::current_context(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message tagged with the current execution context.
#[macro_export]
macro_rules! fill_debug {
    ($($arg:tt)*) => {{
        log::debug!("[{}] {}", $crate::current_context(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message tagged with the current execution context.
#[macro_export]
macro_rules! fill_warn {
    ($($arg:tt)*) => {{
        log::warn!("[{}] {}", $crate::current_context(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message tagged with the current execution context.
#[macro_export]
macro_rules! fill_error {
    ($($arg:tt)*) => {{
        log::error!("[{}] {}", $crate::current_context(), format_args!($($arg)*));
    }};
}

/// Installs a logger whose output the test harness captures per test.
///
/// `JOBFILL_TEST_LOG` (e.g. `trace`) overrides the level. Repeated calls and
/// calls after another logger was installed are ignored.
pub fn initialize_for_tests() {
    use simplelog::{Config, TestLogger};

    let level = std::env::var("JOBFILL_TEST_LOG")
        .ok()
        .and_then(|raw| raw.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Debug);

    let _ = TestLogger::init(level, Config::default());
}
