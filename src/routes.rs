//! HTTP/WS route filters.
//!
//! Grounded on the teacher's `chat()` combinator
//! (`warp::path("chat").and(warp::ws()).and(warp::path::param::<String>())`),
//! generalized from one fixed path segment to three channel prefixes and
//! extended with token/origin extraction ahead of the upgrade, since
//! admission here must authenticate before a socket is ever handed to a
//! room.

use std::collections::HashMap;

use warp::{ws::Ws, Filter, Rejection};

#[derive(Debug)]
pub struct Unauthorized;
impl warp::reject::Reject for Unauthorized {}

#[derive(Debug)]
pub struct OriginForbidden;
impl warp::reject::Reject for OriginForbidden {}

/// Extracts `(Ws, room_id, bearer_token)` for requests to
/// `/ws/{channel}/{roomId}?token=...`. The bearer token travels as a query
/// parameter because browser `WebSocket` clients can't set an `Authorization`
/// header on the handshake request.
pub fn ws_route(
    channel: &'static str,
) -> impl Filter<Extract = (Ws, String, String), Error = Rejection> + Clone {
    warp::path("ws")
        .and(warp::path(channel))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::ws())
        .and(
            warp::query::<HashMap<String, String>>()
                .map(|q: HashMap<String, String>| q.get("token").cloned().unwrap_or_default()),
        )
        .map(|room_id: String, ws: Ws, token: String| (ws, room_id, token))
        .untuple_one()
}

/// Extracts the `Origin` header, if present, for the allow-list check.
pub fn origin(
) -> impl Filter<Extract = (Option<String>,), Error = std::convert::Infallible> + Clone {
    warp::header::optional::<String>("origin")
}

pub async fn recover(err: Rejection) -> Result<impl warp::Reply, std::convert::Infallible> {
    let (code, message) = if err.find::<Unauthorized>().is_some() {
        (warp::http::StatusCode::UNAUTHORIZED, "unauthorized")
    } else if err.find::<OriginForbidden>().is_some() {
        (warp::http::StatusCode::FORBIDDEN, "origin not allowed")
    } else if err.is_not_found() {
        (warp::http::StatusCode::NOT_FOUND, "not found")
    } else {
        (
            warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            "internal error",
        )
    };
    Ok(warp::reply::with_status(message, code))
}
