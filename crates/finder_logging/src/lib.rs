#![deny(missing_docs)]
//! Log macros shared by the engine, the core and the command line app.
//!
//! Every crate logs through `finder_*` so the sink can be swapped in one
//! place; the binary picks terminal, file or both at startup. The macros
//! expand to `log::` paths, so a calling crate needs `log` as a dependency.

/// Per-request detail such as query URLs.
#[macro_export]
macro_rules! finder_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Run lifecycle: start, finish, token refresh, interrupts.
#[macro_export]
macro_rules! finder_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Paging progress: offsets, page sizes and offset caps.
#[macro_export]
macro_rules! finder_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Recoverable trouble: retried calls, skipped playlists, unknown owners.
#[macro_export]
macro_rules! finder_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Failures that end a run.
#[macro_export]
macro_rules! finder_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Terminal logger for tests; later calls in the same process do nothing.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Paging lines are debug level.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
