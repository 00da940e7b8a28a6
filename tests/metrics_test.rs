//! Unit tests for metrics.rs module

use std::time::Duration;
use phone_book::metrics::MetricsCollector;

#[test]
fn test_metrics_collector_default() {
    let collector = MetricsCollector::default();
    assert_eq!(collector.operations_total, 0);
    assert_eq!(collector.errors_total, 0);
    assert_eq!(collector.picture_bytes_written, 0);
    assert_eq!(collector.picture_bytes_read, 0);
}

#[test]
fn test_record_operation_success() {
    let mut collector = MetricsCollector::default();
    collector.record_operation("insert_contact", Duration::from_millis(100), true);
    assert_eq!(collector.operations_total, 1);
    assert_eq!(collector.errors_total, 0);
}

#[test]
fn test_record_operation_failure() {
    let mut collector = MetricsCollector::default();
    collector.record_operation("remove_contact", Duration::from_millis(100), false);
    assert_eq!(collector.operations_total, 1);
    assert_eq!(collector.errors_total, 1);
}

#[test]
fn test_picture_bytes_accumulate() {
    let mut collector = MetricsCollector::default();
    collector.record_picture_write(256);
    collector.record_picture_write(1);
    collector.record_picture_read(257);
    assert_eq!(collector.picture_bytes_written, 257);
    assert_eq!(collector.picture_bytes_read, 257);
}

#[test]
fn test_error_rate_with_no_operations() {
    let collector = MetricsCollector::default();
    assert_eq!(collector.error_rate(), 0.0);
}

#[test]
fn test_error_rate_calculation() {
    let mut collector = MetricsCollector::default();
    for _ in 0..3 {
        collector.record_operation("list_contacts", Duration::from_millis(1), true);
    }
    collector.record_operation("export_picture", Duration::from_millis(1), false);
    assert!((collector.error_rate() - 0.25).abs() < f64::EPSILON);
}

#[test]
fn test_metrics_collector_clone() {
    let mut collector = MetricsCollector::default();
    collector.record_operation("tx_start", Duration::from_millis(1), true);
    let cloned = collector.clone();
    assert_eq!(cloned.operations_total, collector.operations_total);
}
