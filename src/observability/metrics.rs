//! Metrics collection and exposition.
//!
//! # Metrics
//! - `nchain_blocks_ingested_total` (counter): headers applied, by network
//! - `nchain_daemon_reconnects_total` (counter): feed restarts, by network
//! - `nchain_daemon_mode` (gauge): 1=streaming, 0=polling
//! - `nchain_nonce_allocations_total` (counter): by source (chain, cache, explicit)
//! - `nchain_broadcasts_total` (counter): by outcome
//! - `nchain_gas_recoveries_total` (counter): insufficient-gas retries
//! - `nchain_tx_latency_seconds` (histogram): publish, broadcast and e2e phases
//! - `nchain_receipts_total` (counter): finalized transactions by status
//! - `nchain_tokens_discovered_total` (counter)
//! - `nchain_redeliveries_total` (counter): pub/sub redeliveries, by subject
//! - `nchain_cache_errors_total` (counter): by operation

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

pub fn record_block_ingested(network: &str) {
    counter!("nchain_blocks_ingested_total", "network" => network.to_string()).increment(1);
}

pub fn record_daemon_reconnect(network: &str) {
    counter!("nchain_daemon_reconnects_total", "network" => network.to_string()).increment(1);
}

pub fn record_daemon_mode(network: &str, streaming: bool) {
    gauge!("nchain_daemon_mode", "network" => network.to_string())
        .set(if streaming { 1.0 } else { 0.0 });
}

pub fn record_nonce_allocation(source: &'static str) {
    counter!("nchain_nonce_allocations_total", "source" => source).increment(1);
}

pub fn record_broadcast(outcome: &'static str) {
    counter!("nchain_broadcasts_total", "outcome" => outcome).increment(1);
}

pub fn record_gas_recovery() {
    counter!("nchain_gas_recoveries_total").increment(1);
}

/// Record one latency phase, given in milliseconds.
pub fn record_tx_latency(phase: &'static str, millis: u64) {
    histogram!("nchain_tx_latency_seconds", "phase" => phase).record(millis as f64 / 1000.0);
}

pub fn record_receipt(status: &'static str) {
    counter!("nchain_receipts_total", "status" => status).increment(1);
}

pub fn record_token_discovered() {
    counter!("nchain_tokens_discovered_total").increment(1);
}

pub fn record_redelivery(subject: &str) {
    counter!("nchain_redeliveries_total", "subject" => subject.to_string()).increment(1);
}

pub fn record_cache_error(operation: &'static str) {
    counter!("nchain_cache_errors_total", "operation" => operation).increment(1);
}
