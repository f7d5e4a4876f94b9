//! Logging utilities with indicatif integration

use indicatif::MultiProgress;

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Default filter: our crates at `level`, dependencies at warn.
fn default_filter(level: &str) -> String {
    format!("warn,firmpanel={level},firmpanel_core={level},firmpanel_panel={level},firmpanel_merge={level},firmpanel_store={level},firmpanel_pipeline={level}")
}

/// Logger that prints through indicatif MultiProgress to avoid mixing with progress bars.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            let (pre, label, post) = level_style(record.level(), true);
            let line = format!("[{pre}{label}{post}] {}", record.args());
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize logging with optional TTY mode (indicatif integration).
///
/// `RUST_LOG` overrides the level chosen from `quiet`/`debug`. Calling this
/// twice is harmless: the second logger is ignored.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let env = env_logger::Env::default().default_filter_or(default_filter(level));

    if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .build();
        let max_level = logger.filter();

        if log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone()))).is_ok() {
            log::set_max_level(max_level);
        }
    } else {
        // Non-TTY: no ANSI colors, plain lines for log aggregation
        let _ = env_logger::Builder::from_env(env)
            .format(|buf, record| {
                let (_, label, _) = level_style(record.level(), false);
                writeln!(buf, "[{label}] {}", record.args())
            })
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_labels_are_padded() {
        assert_eq!(level_style(log::Level::Warn, false), ("", "WARN ", ""));
        assert_eq!(level_style(log::Level::Error, false).1.len(), 5);
    }

    #[test]
    fn color_wraps_label() {
        let (pre, _, post) = level_style(log::Level::Info, true);
        assert!(pre.starts_with("\x1b["));
        assert_eq!(post, "\x1b[0m");
    }

    #[test]
    fn default_filter_covers_crates() {
        let f = default_filter("debug");
        assert!(f.starts_with("warn,"));
        assert!(f.contains("firmpanel_panel=debug"));
    }

    #[test]
    fn init_twice_does_not_panic() {
        init_logging(true, false, None);
        init_logging(false, true, None);
    }
}
