use crate::{client_ip::ClientAddress, error::AppError, pipeline::Visit, shortcode, AppState};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};

/// GET /l/:id
///
/// 1. Capture the client address and headers as a typed [`Visit`].
/// 2. Run the redirect pipeline (lookup, bounded geo enrichment, click write)
///    in a spawned task that outlives a disconnecting client.
/// 3. Return a 302 to the destination, or a plain-text 404.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    // Ids outside the generator's alphabet can never exist.
    if !shortcode::is_valid(&id) {
        return not_found();
    }

    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip());
    let visit = Visit {
        id,
        client: ClientAddress::from_headers(&headers, peer),
        user_agent: header_string(&headers, header::USER_AGENT),
        referrer: header_string(&headers, header::REFERER),
    };

    // The pipeline runs in its own task so the click is still recorded if the
    // client hangs up and hyper drops this handler future.
    let pipeline = state.pipeline.clone();
    let task = tokio::spawn(async move { pipeline.run(visit).await });

    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Redirect task failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
        }
    };

    match outcome {
        Ok(destination) => (StatusCode::FOUND, [(header::LOCATION, destination)]).into_response(),
        Err(AppError::NotFound(_)) => not_found(),
        Err(e) => e.into_response(),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
