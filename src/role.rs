//! Role hierarchy and authorization gates.
//!
//! A client's admission role is one of three disjoint tiers: `Waiting`,
//! `Participant`, `Host`. `Host` is a strict capability superset of
//! `Participant` — it is not a fourth, mutually exclusive bucket.
//!
//! Screen-share grant and hand-raise are *not* part of this hierarchy: they
//! are independent per-client flags tracked in `crate::room::RoomMember`,
//! since a host can also raise a hand or hold the screen-share grant without
//! losing host capabilities. See DESIGN.md for why the wire-level `Role`
//! enum named in the data model collapses into this three-tier hierarchy
//! plus two flags internally.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseRole {
    Waiting,
    Participant,
    Host,
}

/// The role gate a dispatch-table entry requires of the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredRole {
    /// Any connected client, including those still waiting.
    Any,
    ParticipantOrAbove,
    HostOnly,
}

impl BaseRole {
    pub fn satisfies(self, required: RequiredRole) -> bool {
        match required {
            RequiredRole::Any => true,
            RequiredRole::ParticipantOrAbove => {
                matches!(self, BaseRole::Participant | BaseRole::Host)
            }
            RequiredRole::HostOnly => matches!(self, BaseRole::Host),
        }
    }

    pub fn is_host(self) -> bool {
        matches!(self, BaseRole::Host)
    }

    pub fn is_waiting(self) -> bool {
        matches!(self, BaseRole::Waiting)
    }
}
