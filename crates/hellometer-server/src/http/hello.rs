use axum::{extract::State, Json};
use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::obs::HELLO_REQUESTS_KEY;

pub const HELLO_MESSAGE: &str = "Hello, OpenTelemetry!";

#[derive(Debug, Serialize, Deserialize)]
pub struct HelloResponse {
    pub message: String,
    pub time: String,
}

/// `GET /hello`. Both instrument calls are in-memory and infallible.
pub async fn hello(State(state): State<AppState>) -> Json<HelloResponse> {
    state.hello_counter().add(1);
    state.statsd().increment(HELLO_REQUESTS_KEY, 1, 1.0);

    Json(HelloResponse {
        message: HELLO_MESSAGE.to_string(),
        time: Local::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}
