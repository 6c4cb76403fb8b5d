//! Logging integration for macaron.
//!
//! Every statement sent to SQLite is logged through [`tracing`] at `debug`
//! level. [`setup_logging`] installs a subscriber configured from
//! [`Settings`](crate::settings::Settings) for programs that do not bring
//! their own.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level` (e.g. "debug",
/// "macaron_db=debug"). In debug mode a pretty, human-readable format is
/// used; otherwise a structured JSON format is used. Calling this more than
/// once is harmless: the second subscriber is simply not installed.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one unit of work (for example, one request
/// handled by a host framework).
///
/// # Examples
///
/// ```
/// use macaron_core::logging::unit_of_work_span;
///
/// let span = unit_of_work_span("members.db");
/// let _guard = span.enter();
/// tracing::debug!("running queries");
/// ```
pub fn unit_of_work_span(database: &str) -> tracing::Span {
    tracing::debug_span!("unit_of_work", database)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice_is_harmless() {
        let settings = Settings {
            log_level: "not a valid filter ===".to_string(),
            ..Settings::default()
        };
        setup_logging(&settings);
        setup_logging(&Settings::default());
    }

    #[test]
    fn test_unit_of_work_span() {
        let span = unit_of_work_span(":memory:");
        let _guard = span.enter();
    }
}
