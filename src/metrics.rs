// Prometheus metrics for the NodeConsole gateway
//
// - Policy decisions by level and outcome (counter)
// - Executions by connector type and error type (counter)
// - Execution latency by connector type (histogram)
// - Approval requests and answers (counter)
// - Connection tests by connector type and result (counter)

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramVec, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref POLICY_DECISIONS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("nodeconsole_policy_decisions_total", "Policy decisions by safety level"),
        &["level", "decision"]
    ).expect("Failed to create policy decisions metric");

    pub static ref EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("nodeconsole_executions_total", "Commands dispatched to a connector"),
        &["connector", "error_type"]
    ).expect("Failed to create executions metric");

    pub static ref EXECUTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("nodeconsole_execution_duration_seconds", "Connector execution time in seconds"),
        &["connector"]
    ).expect("Failed to create execution duration metric");

    pub static ref APPROVAL_REQUESTS_TOTAL: IntCounter = IntCounter::new(
        "nodeconsole_approval_requests_total",
        "Total number of approval requests"
    ).expect("Failed to create approval requests metric");

    pub static ref APPROVALS_GRANTED_TOTAL: IntCounter = IntCounter::new(
        "nodeconsole_approvals_granted_total",
        "Total number of approvals granted"
    ).expect("Failed to create approvals granted metric");

    pub static ref APPROVALS_DENIED_TOTAL: IntCounter = IntCounter::new(
        "nodeconsole_approvals_denied_total",
        "Total number of approvals denied"
    ).expect("Failed to create approvals denied metric");

    pub static ref CONNECTION_TESTS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("nodeconsole_connection_tests_total", "Node connection tests"),
        &["connector", "result"]
    ).expect("Failed to create connection tests metric");
}

/// Register all gateway metrics; repeated calls are harmless
pub fn init() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(POLICY_DECISIONS_TOTAL.clone()),
        Box::new(EXECUTIONS_TOTAL.clone()),
        Box::new(EXECUTION_DURATION_SECONDS.clone()),
        Box::new(APPROVAL_REQUESTS_TOTAL.clone()),
        Box::new(APPROVALS_GRANTED_TOTAL.clone()),
        Box::new(APPROVALS_DENIED_TOTAL.clone()),
        Box::new(CONNECTION_TESTS_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
