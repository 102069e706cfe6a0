//! GET/POST request handlers and error rendering.

use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use objrpc::{EndpointPath, ProtocolConfig, RpcError};
use serde_json::Value as Json;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, warn};

/// An [`RpcError`] rendered as a plain-text HTTP error.
///
/// The body reads `HTTP <code>: <reason>:\n<message>`.
#[derive(Debug)]
pub struct ApiError(pub RpcError);

impl From<RpcError> for ApiError {
    fn from(err: RpcError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
        if status == StatusCode::NOT_FOUND {
            debug!("{}", self.0);
        } else {
            warn!("{}: {}", status, self.0);
        }
        let body = format!(
            "HTTP {}: {}:\n{}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
            self.0
        );
        (
            status,
            [(header::CONTENT_TYPE, ProtocolConfig::TEXT_CONTENT_TYPE)],
            body,
        )
            .into_response()
    }
}

fn json_response(tree: &Json) -> Result<Response, ApiError> {
    let body = serde_json::to_string(tree).map_err(RpcError::from)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, ProtocolConfig::JSON_CONTENT_TYPE)],
        body,
    )
        .into_response())
}

/// Reject POST bodies that are not JSON. A missing header counts as JSON.
fn check_content_type(headers: &HeaderMap) -> Result<(), RpcError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_else(|| ProtocolConfig::DEFAULT_MEDIA_TYPE.to_string());
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if ProtocolConfig::ACCEPTED_MEDIA_TYPES.contains(&media_type.as_str()) {
        Ok(())
    } else {
        Err(RpcError::UnsupportedMediaType { content_type })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// Run resolver work off the async runtime. A panic becomes a call failure.
async fn run_blocking<F>(path: &EndpointPath, work: F) -> Result<Json, RpcError>
where
    F: FnOnce() -> Result<Json, RpcError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(join_error) => {
            let trace = match join_error.try_into_panic() {
                Ok(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
                Err(join_error) => join_error.to_string(),
            };
            Err(RpcError::CallFailed {
                endpoint: path.endpoint(),
                trace,
            })
        }
    }
}

/// `GET <path>`: resolve and return the named value.
pub async fn handle_get(
    State(state): State<Arc<AppState>>,
    uri: Uri,
) -> Result<Response, ApiError> {
    debug!("GET {}", uri.path());
    let path = EndpointPath::parse(uri.path())?;
    let resolver = state.resolver.clone();
    let target = path.clone();
    let tree = run_blocking(&path, move || resolver.get(&target)).await?;
    json_response(&tree)
}

/// `POST <path>`: call the named object with the arguments in the body.
pub async fn handle_post(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    debug!("POST {} ({} byte body)", uri.path(), body.len());
    check_content_type(&headers)?;
    let path = EndpointPath::parse(uri.path())?;
    let resolver = state.resolver.clone();
    let target = path.clone();
    let tree = run_blocking(&path, move || resolver.post(&target, &body)).await?;
    json_response(&tree)
}
