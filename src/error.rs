//! The error taxonomy from the core's error-handling design.
//!
//! Most of these variants never leave the layer that produces them — per the
//! propagation policy, authorization/payload/capacity failures are observed,
//! logged, and handled locally by the room loop, not bubbled up through `?`.
//! The type exists so those log sites carry a consistent, typed shape rather
//! than ad hoc strings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("client {client_id} lacks the role required for {event}")]
    Authorization { client_id: String, event: String },

    #[error("malformed payload for {event}: {reason}")]
    Payload { event: String, reason: String },

    #[error("outbound queue full for client {client_id}")]
    Capacity { client_id: String },

    #[error("internal error: {0}")]
    System(String),
}
