use actix_web::{http::header::ContentType, HttpResponse};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_chat_messages_sent_total",
            "Messages persisted, by kind",
        ),
        &["kind"],
    )
    .expect("failed to create realtime_chat_messages_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_chat_messages_sent_total");
    counter
});

pub static WS_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_chat_ws_events_total",
            "Inbound WebSocket events, by event and outcome",
        ),
        &["event", "outcome"],
    )
    .expect("failed to create realtime_chat_ws_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_chat_ws_events_total");
    counter
});

pub static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "realtime_chat_ws_connections",
        "Currently open WebSocket connections",
    )
    .expect("failed to create realtime_chat_ws_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register realtime_chat_ws_connections");
    gauge
});

pub static DECRYPTION_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_chat_decryption_failures_total",
            "Stored message bodies that could not be decrypted",
        ),
        &["reason"],
    )
    .expect("failed to create realtime_chat_decryption_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_chat_decryption_failures_total");
    counter
});

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .insert_header(ContentType(
            encoder
                .format_type()
                .parse()
                .unwrap_or(mime::TEXT_PLAIN_UTF_8),
        ))
        .body(buffer)
}
