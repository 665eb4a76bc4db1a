//! Metrics collection.
//!
//! # Metrics
//! - `gate_admissions_total` (counter): granted acquisitions by gate
//! - `gate_wait_seconds` (histogram): time from acquire to grant
//! - `gate_rejections_total` (counter): timeouts and cancellations, by reason
//! - `gate_running` (gauge): slots currently held
//! - `retry_attempts_total` (counter): attempt outcomes
//! - `circuit_transitions_total` (counter): state changes, by target state
//! - `circuit_rejections_total` (counter): calls refused, by state
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; nothing is exported until the
//!   host application installs a recorder
//! - Labels are gate/breaker names plus a small fixed set of reasons

use std::time::Duration;

use ::metrics::{counter, gauge, histogram};

use crate::resilience::circuit_breaker::CircuitState;

pub fn record_admission(gate: &str, waited: Duration) {
    counter!("gate_admissions_total", "gate" => gate.to_owned()).increment(1);
    histogram!("gate_wait_seconds", "gate" => gate.to_owned()).record(waited.as_secs_f64());
}

pub fn record_gate_rejection(gate: &str, reason: &'static str) {
    counter!("gate_rejections_total", "gate" => gate.to_owned(), "reason" => reason).increment(1);
}

pub fn set_gate_running(gate: &str, running: usize) {
    gauge!("gate_running", "gate" => gate.to_owned()).set(running as f64);
}

pub fn record_retry_attempt(outcome: &'static str) {
    counter!("retry_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_circuit_transition(breaker: &str, to: CircuitState) {
    counter!(
        "circuit_transitions_total",
        "breaker" => breaker.to_owned(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_circuit_rejection(breaker: &str, state: CircuitState) {
    counter!(
        "circuit_rejections_total",
        "breaker" => breaker.to_owned(),
        "state" => state.as_str()
    )
    .increment(1);
}
