use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CYCLES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_cycles_total",
        "Total poll-and-publish cycles run"
    ))
    .unwrap();
    pub static ref FAILED_CYCLES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_failed_cycles_total",
        "Cycles where at least one device gave no reading"
    ))
    .unwrap();
    pub static ref LOGIN_ATTEMPTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_login_attempts_total",
        "Total portal login attempts"
    ))
    .unwrap();
    pub static ref LOGIN_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_login_failures_total",
        "Portal logins that failed or were rejected"
    ))
    .unwrap();
    pub static ref READ_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_read_failures_total",
        "Device telemetry reads that failed"
    ))
    .unwrap();
    pub static ref PUBLISH_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "bridge_publish_failures_total",
        "MQTT publishes that failed or were not acknowledged"
    ))
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY.register(Box::new(CYCLES_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(FAILED_CYCLES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(LOGIN_ATTEMPTS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(LOGIN_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(READ_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(PUBLISH_FAILURES_TOTAL.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
