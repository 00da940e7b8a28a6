//! Operation metrics.
//!
//! Counters and timings are emitted through the `metrics` facade (a no-op until
//! the binary installs a recorder) and also tallied locally so a session can
//! report them without an exporter.

use metrics::{counter, histogram};
use std::time::Duration;

/// Metric names
pub const OPERATIONS_TOTAL: &str = "phonebook_operations_total";
pub const OPERATION_DURATION: &str = "phonebook_operation_duration_seconds";
pub const ERRORS_TOTAL: &str = "phonebook_errors_total";
pub const PICTURE_BYTES_TOTAL: &str = "phonebook_picture_bytes_total";

/// Metrics collection and management
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    pub operations_total: u64,
    pub errors_total: u64,
    pub picture_bytes_written: u64,
    pub picture_bytes_read: u64,
}

impl MetricsCollector {
    /// Record one operation and its outcome
    pub fn record_operation(&mut self, operation: &'static str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };

        counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
        histogram!(OPERATION_DURATION, "operation" => operation).record(duration.as_secs_f64());
        self.operations_total += 1;

        if !success {
            counter!(ERRORS_TOTAL, "operation" => operation).increment(1);
            self.errors_total += 1;
        }
    }

    /// Record picture bytes streamed into the database
    pub fn record_picture_write(&mut self, bytes: u64) {
        counter!(PICTURE_BYTES_TOTAL, "direction" => "write").increment(bytes);
        self.picture_bytes_written += bytes;
    }

    /// Record picture bytes streamed out of the database
    pub fn record_picture_read(&mut self, bytes: u64) {
        counter!(PICTURE_BYTES_TOTAL, "direction" => "read").increment(bytes);
        self.picture_bytes_read += bytes;
    }

    /// Fraction of operations that failed
    pub fn error_rate(&self) -> f64 {
        if self.operations_total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.errors_total as f64 / self.operations_total as f64;
            rate
        }
    }
}
