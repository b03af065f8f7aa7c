use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use futures::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;

use unityctl_protocol::LogEntry;

use crate::logs::SourceFilter;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TailQuery {
    #[serde(default = "default_lines")]
    pub lines: usize,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub full: bool,
}

fn default_lines() -> usize {
    100
}
fn default_source() -> String {
    "all".to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TailResponse {
    pub entries: Vec<LogEntry>,
    pub watermark: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear_reason: Option<String>,
}

fn parse_filter(source: &str) -> Result<SourceFilter, (StatusCode, String)> {
    SourceFilter::parse(source).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("unknown source filter: {}", source),
        )
    })
}

fn tail_response(state: &AppState, lines: usize, filter: SourceFilter, full: bool) -> TailResponse {
    let tail = state.logs.tail(lines, filter, full);
    TailResponse {
        entries: tail.entries,
        watermark: tail.watermark,
        cleared_at: tail.cleared_at,
        clear_reason: tail.clear_reason,
    }
}

/// `GET /logs/tail?lines=N&source=…&full=bool`
pub async fn tail(
    State(state): State<AppState>,
    Query(query): Query<TailQuery>,
) -> Result<Json<TailResponse>, (StatusCode, String)> {
    let filter = parse_filter(&query.source)?;
    Ok(Json(tail_response(&state, query.lines, filter, query.full)))
}

#[derive(Deserialize)]
pub struct ClearQuery {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub watermark: u64,
}

/// `POST /logs/clear?reason=…`
pub async fn clear(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Json<ClearResponse> {
    let watermark = state.logs.clear(query.reason);
    Json(ClearResponse {
        success: true,
        watermark,
    })
}

#[derive(Deserialize)]
pub struct StreamQuery {
    #[serde(default = "default_source")]
    pub source: String,
}

/// `GET /logs/stream?source=…` — server-sent events, one `data:` frame per
/// entry. The stream ends when the fan-out drops this subscriber (client
/// too slow) or the client disconnects.
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, (StatusCode, String)> {
    let filter = parse_filter(&query.source)?;
    let rx = state.logs.subscribe(filter);
    let stream = ReceiverStream::new(rx).map(|entry| {
        let data = serde_json::to_string(&entry).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().data(data))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Deserialize)]
pub struct ConsoleTailQuery {
    #[serde(default = "default_lines")]
    pub lines: usize,
    #[serde(default)]
    pub full: bool,
}

/// `GET /console/tail` — legacy alias for a console-only tail.
pub async fn console_tail(
    State(state): State<AppState>,
    Query(query): Query<ConsoleTailQuery>,
) -> Json<TailResponse> {
    Json(tail_response(
        &state,
        query.lines,
        SourceFilter::Console,
        query.full,
    ))
}

/// `POST /console/clear` — legacy alias for `/logs/clear`.
pub async fn console_clear(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Json<ClearResponse> {
    let reason = query.reason.or_else(|| Some("console-clear".to_string()));
    let watermark = state.logs.clear(reason);
    Json(ClearResponse {
        success: true,
        watermark,
    })
}
