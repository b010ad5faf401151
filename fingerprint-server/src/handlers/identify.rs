//! Identify handler

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use device_fingerprint_core::logic::network::HeaderSnapshot;
use device_fingerprint_core::IdentifyResponse;
use validator::Validate;

use crate::models::IdentifyBody;
use crate::{AppResult, AppState};

/// Full pipeline: match, persist, record visit, score risk
pub async fn identify(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<IdentifyBody>,
) -> AppResult<Json<IdentifyResponse>> {
    body.validate()?;

    let hops = state.config.trusted_proxy_hops;
    let snapshot = header_snapshot(&headers);
    let client_ip = client_ip(&snapshot, peer.map(|ConnectInfo(addr)| addr), hops);
    let request = body.into_request(snapshot.trust_forwarding_hops(hops), client_ip);

    let response = state.engine.identify_default(request).await?;

    tracing::debug!(
        "Identified {} as {} (score {:.3}, confidence {:.3}, risk {:.2})",
        response.visitor_id,
        response.classification,
        response.match_score,
        response.confidence,
        response.risk.risk_score
    );

    Ok(Json(response))
}

/// Header names and values in the order the server saw them
pub fn header_snapshot(headers: &HeaderMap) -> HeaderSnapshot {
    let mut snapshot = HeaderSnapshot::new();
    for (name, value) in headers.iter() {
        snapshot.push(name.as_str(), value.to_str().unwrap_or_default());
    }
    snapshot
}

/// Behind `trusted_hops` proxies the address the outermost one saw,
/// otherwise the TCP peer
pub fn client_ip(snapshot: &HeaderSnapshot, peer: Option<SocketAddr>, trusted_hops: usize) -> Option<String> {
    snapshot
        .forwarded_client(trusted_hops)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}
