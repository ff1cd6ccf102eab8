use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Mining settlements by mode ("chain" or "simulated").
    pub static ref MINE_SETTLEMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "wallet_engine_mine_settlements_total",
        "Completed mining settlements by settlement mode",
        &["mode"]
    )
    .expect("mine settlements counter registration");

    pub static ref TRANSFERS_TOTAL: IntCounter = register_int_counter!(
        "wallet_engine_transfers_total",
        "Completed peer-to-peer transfers"
    )
    .expect("transfers counter registration");

    /// Escrow state transitions by resulting state.
    pub static ref ESCROW_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "wallet_engine_escrow_transitions_total",
        "Escrow state transitions by resulting state",
        &["state"]
    )
    .expect("escrow transitions counter registration");

    pub static ref RECONCILIATION_CORRECTIONS_TOTAL: IntCounter = register_int_counter!(
        "wallet_engine_reconciliation_corrections_total",
        "Local wallet rows overwritten with chain ledger values"
    )
    .expect("reconciliation corrections counter registration");

    pub static ref REMOTE_LEDGER_ERRORS_TOTAL: IntCounter = register_int_counter!(
        "wallet_engine_remote_ledger_errors_total",
        "Failed calls to the chain ledger"
    )
    .expect("remote ledger errors counter registration");
}

/// Render the default registry in Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
