use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};

static LIFECYCLE_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "stream_service_lifecycle_transitions_total",
            "Stream lifecycle operations by outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("failed to create stream_service_lifecycle_transitions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register stream_service_lifecycle_transitions_total");
    counter
});

static PROVIDER_CALL_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "stream_service_provider_call_duration_seconds",
            "Latency of media provider calls, including retries",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["provider", "operation", "outcome"],
    )
    .expect("failed to create stream_service_provider_call_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register stream_service_provider_call_duration_seconds");
    histogram
});

static WEBHOOK_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "stream_service_webhook_events_total",
            "Provider webhook deliveries by event and outcome",
        ),
        &["event", "outcome"],
    )
    .expect("failed to create stream_service_webhook_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register stream_service_webhook_events_total");
    counter
});

static INTENTS_RESOLVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "stream_service_intents_resolved_total",
            "Stream intents resolved, by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("failed to create stream_service_intents_resolved_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register stream_service_intents_resolved_total");
    counter
});

pub fn record_transition(operation: &str, outcome: &str) {
    LIFECYCLE_TRANSITIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn observe_provider_call(provider: &str, operation: &str, success: bool, elapsed: Duration) {
    let outcome = if success { "ok" } else { "error" };
    PROVIDER_CALL_DURATION_SECONDS
        .with_label_values(&[provider, operation, outcome])
        .observe(elapsed.as_secs_f64());
}

pub fn record_webhook_event(event: &str, outcome: &str) {
    WEBHOOK_EVENTS_TOTAL.with_label_values(&[event, outcome]).inc();
}

pub fn record_intent_resolved(operation: &str, outcome: &str) {
    INTENTS_RESOLVED_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
