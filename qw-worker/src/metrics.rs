//! Metrics (spec.md §6.4), grounded on the teacher's
//! `lgn-worker/src/metrics/mod.rs` `Metrics` wrapper around the
//! `metrics` facade crate, renamed from `zkmr_worker_*` to `qw_worker_*`.

use metrics::counter;
use metrics::gauge;
use metrics::histogram;
use metrics::SharedString;

#[derive(Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    pub fn increment_tasks_received(&self, handler_id: &str) {
        let handler_id = SharedString::from(handler_id.to_string());
        counter!("qw_worker_tasks_received_total", "handler" => handler_id).increment(1);
    }

    pub fn increment_tasks_processed(&self, handler_id: &str) {
        let handler_id = SharedString::from(handler_id.to_string());
        counter!("qw_worker_tasks_processed_total", "handler" => handler_id).increment(1);
    }

    pub fn increment_tasks_failed(&self, handler_id: &str) {
        let handler_id = SharedString::from(handler_id.to_string());
        counter!("qw_worker_tasks_failed_total", "handler" => handler_id).increment(1);
    }

    pub fn observe_task_processing_duration(&self, handler_id: &str, duration: f64) {
        let handler_id = SharedString::from(handler_id.to_string());
        histogram!("qw_worker_task_processing_duration_seconds", "handler" => handler_id)
            .record(duration);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        gauge!("qw_worker_queue_depth").set(depth as f64);
    }

    pub fn increment_queue_full(&self) {
        counter!("qw_worker_queue_full_total").increment(1);
    }

    pub fn increment_registry_errors(&self) {
        counter!("qw_worker_registry_errors_total").increment(1);
    }
}
