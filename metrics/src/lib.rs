//! Prometheus metrics shared by the scheduler's components.
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Gauge, HistogramVec,
};
use std::time::Duration;

lazy_static! {
    pub static ref HTTP_REQUEST_COUNT: CounterVec = register_counter_vec!(
        "sched_http_request_count",
        "the number of RPC requests received, by method",
        &["method"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_MILLIS: HistogramVec = register_histogram_vec!(
        "sched_http_request_duration_millis",
        "the duration of RPC requests, by method and status",
        &["method", "status"]
    )
    .unwrap();

    pub static ref JOBS_CREATED_COUNT: CounterVec = register_counter_vec!(
        "sched_jobs_created_count",
        "the number of jobs created, by repo",
        &["repo"]
    )
    .unwrap();

    pub static ref TASKS_LEASED_COUNT: CounterVec = register_counter_vec!(
        "sched_tasks_leased_count",
        "the number of tasks leased by dispatcher workers, by queue",
        &["queue"]
    )
    .unwrap();

    pub static ref TASK_LEASE_DURATION_MILLIS: HistogramVec = register_histogram_vec!(
        "sched_task_lease_duration_millis",
        "wall time a task spent leased before the worker reported a result",
        &["queue", "outcome"]
    )
    .unwrap();

    pub static ref DISPATCHER_BUSY_WORKERS: Gauge = register_gauge!(
        "sched_dispatcher_busy_workers",
        "number of dispatcher worker slots currently holding a lease"
    )
    .unwrap();

    pub static ref SKIP_RULE_EVALUATIONS: Counter = register_counter!(
        "sched_skip_rule_evaluations_total",
        "the number of times a task was evaluated against the skip-rule set"
    )
    .unwrap();
}

pub fn inc_http_request(method: &str) {
    HTTP_REQUEST_COUNT.with_label_values(&[method]).inc();
}

pub fn observe_http_request_duration(method: &str, status: &str, duration: Duration) {
    HTTP_REQUEST_DURATION_MILLIS
        .with_label_values(&[method, status])
        .observe(duration.as_millis() as f64);
}

pub fn inc_jobs_created(repo: &str) {
    JOBS_CREATED_COUNT.with_label_values(&[repo]).inc();
}

pub fn inc_tasks_leased(queue: &str) {
    TASKS_LEASED_COUNT.with_label_values(&[queue]).inc();
}

pub fn observe_task_lease_duration(queue: &str, outcome: &str, duration: Duration) {
    TASK_LEASE_DURATION_MILLIS
        .with_label_values(&[queue, outcome])
        .observe(duration.as_millis() as f64);
}

pub fn set_dispatcher_busy_workers(count: f64) {
    DISPATCHER_BUSY_WORKERS.set(count);
}

pub fn inc_skip_rule_evaluations() {
    SKIP_RULE_EVALUATIONS.inc();
}

/// Renders the process registry in Prometheus text exposition format.
pub fn render() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    encoder.encode(&metric_families, &mut buf).unwrap();
    String::from_utf8(buf).unwrap_or_default()
}
