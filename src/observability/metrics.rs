//! Metrics collection.
//!
//! # Metrics
//! - `ingress_requests_admitted_total` (counter): requests handed to the consumer
//! - `ingress_requests_rejected_total` (counter): 503s at the edge, by `reason`
//! - `ingress_listener_errors_total` (counter): native listener errors
//! - `ingress_responses_total` (counter): finalized responses, by `status`
//! - `ingress_server_state_transitions_total` (counter): lifecycle moves, by `to`

use crate::lifecycle::ServerState;

pub fn record_admitted() {
    metrics::counter!("ingress_requests_admitted_total").increment(1);
}

pub fn record_rejected(reason: &'static str) {
    metrics::counter!("ingress_requests_rejected_total", "reason" => reason).increment(1);
}

pub fn record_listener_error() {
    metrics::counter!("ingress_listener_errors_total").increment(1);
}

pub fn record_response(status: u16) {
    metrics::counter!("ingress_responses_total", "status" => status.to_string()).increment(1);
}

pub fn record_state(to: ServerState) {
    metrics::counter!("ingress_server_state_transitions_total", "to" => to.as_str()).increment(1);
}
