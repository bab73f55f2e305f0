//! Wire protocol: the incoming/outgoing event schemas and the dispatch
//! table's role gate.
//!
//! Every message is one JSON text frame shaped `{ "event": ..., "payload":
//! ... }`. `event` names are snake_case; payload field names are camelCase
//! (`targetId`, `chatContent`, `sdpMid`, ...). Incoming payloads never carry
//! `clientId`/`displayName` — "overwrite with the authenticated identity" is
//! satisfied structurally: outgoing payloads are always built fresh from the
//! sender's authenticated `ClientInfo`, never copied from client input.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::role::RequiredRole;

/// Payload for event kinds that carry no fields of their own. An
/// adjacently-tagged enum's bare unit variants only skip deserializing
/// `payload` entirely when the key is altogether absent from the frame —
/// internally they still try to read it as `()`, which rejects an explicit
/// `{}` with "invalid type: map, expected unit". Since real clients
/// uniformly send `{ "event": ..., "payload": {...} }` (sometimes omitting
/// `payload` for no-argument events, sometimes sending it empty), these
/// event kinds carry this type instead of being bare unit variants, and its
/// `Deserialize` impl below accepts an absent value, `null`, or `{}` alike.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmptyPayload;

impl<'de> Deserialize<'de> for EmptyPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EmptyPayloadVisitor;

        impl<'de> Visitor<'de> for EmptyPayloadVisitor {
            type Value = EmptyPayload;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an empty object, null, or nothing")
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(EmptyPayload)
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                while map.next_entry::<de::IgnoredAny, de::IgnoredAny>()?.is_some() {}
                Ok(EmptyPayload)
            }
        }

        deserializer.deserialize_any(EmptyPayloadVisitor)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum IncomingEvent {
    Offer(SdpSignalPayload),
    Answer(SdpSignalPayload),
    Candidate(CandidatePayload),
    Renegotiate(RenegotiatePayload),
    AddChat(AddChatPayload),
    DeleteChat(DeleteChatPayload),
    GetRecentChats(EmptyPayload),
    RaiseHand(EmptyPayload),
    LowerHand(EmptyPayload),
    RequestWaiting(EmptyPayload),
    AcceptWaiting(TargetPayload),
    DenyWaiting(TargetPayload),
    RequestScreenshare(EmptyPayload),
    AcceptScreenshare(TargetPayload),
    DenyScreenshare(TargetPayload),
    Ping(EmptyPayload),
}

impl IncomingEvent {
    /// The role a sender must hold for this event kind to be dispatched.
    pub fn required_role(&self) -> RequiredRole {
        use IncomingEvent::*;
        match self {
            Offer(_) | Answer(_) | Candidate(_) | Renegotiate(_) => RequiredRole::ParticipantOrAbove,
            AddChat(_) | DeleteChat(_) | GetRecentChats(_) => RequiredRole::ParticipantOrAbove,
            RaiseHand(_) | LowerHand(_) => RequiredRole::ParticipantOrAbove,
            RequestWaiting(_) => RequiredRole::Any,
            AcceptWaiting(_) | DenyWaiting(_) => RequiredRole::HostOnly,
            RequestScreenshare(_) => RequiredRole::ParticipantOrAbove,
            AcceptScreenshare(_) | DenyScreenshare(_) => RequiredRole::HostOnly,
            Ping(_) => RequiredRole::Any,
        }
    }

    pub fn name(&self) -> &'static str {
        use IncomingEvent::*;
        match self {
            Offer(_) => "offer",
            Answer(_) => "answer",
            Candidate(_) => "candidate",
            Renegotiate(_) => "renegotiate",
            AddChat(_) => "add_chat",
            DeleteChat(_) => "delete_chat",
            GetRecentChats(_) => "get_recent_chats",
            RaiseHand(_) => "raise_hand",
            LowerHand(_) => "lower_hand",
            RequestWaiting(_) => "request_waiting",
            AcceptWaiting(_) => "accept_waiting",
            DenyWaiting(_) => "deny_waiting",
            RequestScreenshare(_) => "request_screenshare",
            AcceptScreenshare(_) => "accept_screenshare",
            DenyScreenshare(_) => "deny_screenshare",
            Ping(_) => "ping",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpSignalPayload {
    pub target_id: String,
    pub sdp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    pub target_id: String,
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenegotiatePayload {
    pub target_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChatPayload {
    pub chat_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteChatPayload {
    pub chat_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPayload {
    pub target_id: String,
}

// --- Outgoing (server-originated) wire shapes -----------------------------

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum OutgoingEvent {
    Offer(SdpSignalWire),
    Answer(SdpSignalWire),
    Candidate(CandidateWire),
    Renegotiate(RenegotiateWire),
    AddChat(ChatWire),
    DeleteChat(ChatDeleteWire),
    GetRecentChats(RecentChatsWire),
    RaiseHand(IdentityWire),
    LowerHand(IdentityWire),
    RequestWaiting(IdentityWire),
    AcceptWaiting(IdentityWire),
    DenyWaiting(IdentityWire),
    RequestScreenshare(IdentityWire),
    AcceptScreenshare(IdentityWire),
    DenyScreenshare(IdentityWire),
    Pong(IdentityWire),
    RoomState(RoomStateWire),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityWire {
    pub client_id: String,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpSignalWire {
    pub client_id: String,
    pub display_name: String,
    pub target_id: String,
    pub sdp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateWire {
    pub client_id: String,
    pub display_name: String,
    pub target_id: String,
    pub candidate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenegotiateWire {
    pub client_id: String,
    pub display_name: String,
    pub target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatWire {
    pub client_id: String,
    pub display_name: String,
    pub chat_id: u64,
    pub chat_content: String,
    pub timestamp: u64,
}

impl From<&crate::chat::ChatEntry> for ChatWire {
    fn from(entry: &crate::chat::ChatEntry) -> Self {
        ChatWire {
            client_id: entry.author_id.clone(),
            display_name: entry.display_name.clone(),
            chat_id: entry.chat_id,
            chat_content: entry.content.clone(),
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDeleteWire {
    pub client_id: String,
    pub display_name: String,
    pub chat_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChatsWire {
    pub client_id: String,
    pub display_name: String,
    pub chats: Vec<ChatWire>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateWire {
    pub room_id: String,
    pub hosts: Vec<IdentityWire>,
    pub participants: Vec<IdentityWire>,
    pub waiting: Vec<IdentityWire>,
    pub screensharing: Vec<IdentityWire>,
    pub hands_raised: Vec<IdentityWire>,
}
