//! Timing of long-running operations

use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// Logs how long an operation took when finished or dropped
pub struct DurationInfo {
    operation: String,
    started: Instant,
    logged: bool,
}

impl DurationInfo {
    pub fn start(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        tracing::debug!(operation = %operation, "starting");
        Self {
            operation,
            started: Instant::now(),
            logged: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log the duration now and return it
    pub fn finish(mut self) -> Duration {
        self.log();
        self.elapsed()
    }

    fn log(&mut self) {
        if !self.logged {
            self.logged = true;
            info!("{}: duration {}", self.operation, FormattedDuration(self.elapsed()));
        }
    }
}

impl Drop for DurationInfo {
    fn drop(&mut self) {
        self.log();
    }
}

/// `m:ss.mmm`, with hours when needed
pub struct FormattedDuration(pub Duration);

impl fmt::Display for FormattedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();
        let hours = millis / 3_600_000;
        let minutes = (millis / 60_000) % 60;
        let seconds = (millis / 1000) % 60;
        let ms = millis % 1000;
        if hours > 0 {
            write!(f, "{}:{:02}:{:02}.{:03}", hours, minutes, seconds, ms)
        } else {
            write!(f, "{}:{:02}.{:03}", minutes, seconds, ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(FormattedDuration(Duration::from_millis(0)).to_string(), "0:00.000");
        assert_eq!(FormattedDuration(Duration::from_millis(61_005)).to_string(), "1:01.005");
        assert_eq!(
            FormattedDuration(Duration::from_secs(3 * 3600 + 5)).to_string(),
            "3:00:05.000"
        );
    }

    #[test]
    fn test_finish_logs_once() {
        let timer = DurationInfo::start("listing");
        let elapsed = timer.finish();
        assert!(elapsed < Duration::from_secs(60));
    }
}
