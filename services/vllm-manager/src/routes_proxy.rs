use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method},
    response::Response,
};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ManagerError, Result};
use crate::state::SharedState;

const REQUEST_ID: &str = "x-request-id";
const FORWARDED_HEADERS: [header::HeaderName; 2] = [header::CONTENT_TYPE, header::ACCEPT];

/// Target of a forwarded call, taken from the JSON body.
#[derive(Debug, PartialEq)]
pub struct Dispatch {
    pub model: String,
    pub stream: bool,
}

pub fn parse_dispatch(body: &[u8]) -> Result<Dispatch> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ManagerError::MissingModel);
    }
    let v: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ManagerError::InvalidBody(e.to_string()))?;
    let model = v
        .get("model")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .ok_or(ManagerError::MissingModel)?;
    let stream = v.get("stream").and_then(|s| s.as_bool()).unwrap_or(false);

    Ok(Dispatch {
        model: model.to_string(),
        stream,
    })
}

/// Terminal SSE frame sent when the backend dies mid-response.
pub fn error_frame(model: &str, message: &str) -> Bytes {
    let err = ManagerError::BackendUnreachable {
        model: model.to_string(),
        message: message.to_string(),
    };
    let json = serde_json::to_string(&err.body()).unwrap_or_default();
    Bytes::from(format!("data: {json}\n\n"))
}

/// `ANY /v1/*path`: lazily start the model named in the body, then relay
/// the backend's response byte for byte.
pub async fn proxy(
    State(state): State<SharedState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request_id = headers
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // fail fast: nothing below runs without a known model
    let dispatch = parse_dispatch(&body)?;
    let model = dispatch.model;
    let manager = state.manager.clone();

    manager.start(&model).await?;
    manager.touch(&model).await;

    let mut url = format!("{}/v1/{}", manager.endpoint(&model)?, path);
    if let Some(q) = query {
        url.push('?');
        url.push_str(&q);
    }
    info!(
        request_id = %request_id,
        model = %model,
        %method,
        path = %path,
        stream = dispatch.stream,
        "proxy: dispatch"
    );

    let mut req = state
        .http
        .request(method, &url)
        .header(REQUEST_ID, request_id.as_str())
        .body(body);
    for name in FORWARDED_HEADERS {
        if let Some(v) = headers.get(&name) {
            req = req.header(name, v.clone());
        }
    }

    let upstream = req.send().await.map_err(|e| {
        warn!(request_id = %request_id, model = %model, "proxy: backend unreachable: {e}");
        ManagerError::BackendUnreachable {
            model: model.clone(),
            message: e.to_string(),
        }
    })?;
    let status = upstream.status();

    let (tx, rx) = mpsc::channel::<Bytes>(32);
    tokio::spawn(async move {
        let mut chunks = upstream.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    if tx.send(bytes).await.is_err() {
                        debug!(request_id = %request_id, "proxy: client went away");
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        model = %model,
                        "proxy: backend failed mid-stream: {e}"
                    );
                    let _ = tx.send(error_frame(&model, &e.to_string())).await;
                    break;
                }
            }
        }
        // long generations count as use until their last byte
        manager.touch(&model).await;
    });

    let content_type = if dispatch.stream { "text/event-stream" } else { "application/json" };
    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    Ok(resp)
}
