//! The authoritative per-room state machine.
//!
//! A `Room` is driven by exactly one task reading from a bounded
//! `mpsc::Receiver<RoomCommand>` — register, unregister, and event delivery
//! are unified into one ordered command queue, which gives total ordering
//! across all three for free (a simplification over three separate channels
//! plus a `select!`, documented as a deliberate choice in DESIGN.md). Room
//! state itself (`RoomState`) never leaves this task; nothing outside ever
//! locks or reads its fields directly.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use warp::ws::Message;

use crate::auth::ClientInfo;
use crate::chat::ChatLog;
use crate::error::CoreError;
use crate::event::{
    ChatDeleteWire, IdentityWire, IncomingEvent, OutgoingEvent, RoomStateWire,
};
use crate::hub::Hub;
use crate::role::{BaseRole, RequiredRole};

/// Bound on the room's inbound command queue (register/unregister/event).
/// A full queue means a handler is stuck; the reader drops the event rather
/// than blocking the transport layer.
pub const ROOM_COMMAND_CAP: usize = 1024;

pub enum RoomCommand {
    Register {
        info: ClientInfo,
        tx: mpsc::Sender<Message>,
    },
    Unregister {
        client_id: String,
    },
    Event {
        client_id: String,
        event: IncomingEvent,
    },
    /// Graceful-shutdown instruction: tell every client the room is
    /// closing and drop their outbound senders so writer pumps drain and
    /// close the transport on their own.
    Shutdown,
}

struct RoomMember {
    info: ClientInfo,
    base_role: BaseRole,
    screensharing: bool,
    hand_raised: bool,
    tx: mpsc::Sender<Message>,
    joined_at: u64,
}

/// Spawns a room's event-loop task and returns the sender half of its
/// command channel. `generation` disambiguates this room instance from any
/// later room created for the same `room_id` after this one is reaped, so a
/// connection never attaches to a room that has already begun teardown.
pub fn spawn_room(room_id: String, generation: u64, hub: Arc<Hub>) -> mpsc::Sender<RoomCommand> {
    let (tx, rx) = mpsc::channel(ROOM_COMMAND_CAP);
    tokio::spawn(run(room_id, generation, hub, rx));
    tx
}

async fn run(room_id: String, generation: u64, hub: Arc<Hub>, mut rx: mpsc::Receiver<RoomCommand>) {
    let mut room = RoomState::new(room_id.clone());
    tracing::info!(room = %room_id, "room created");

    while let Some(cmd) = rx.recv().await {
        let shutting_down = matches!(cmd, RoomCommand::Shutdown);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| room.handle(cmd)));
        if let Err(panic) = outcome {
            tracing::error!(room = %room_id, ?panic, "room handler panicked; room loop continues");
        }
        if shutting_down || room.clients.is_empty() {
            hub.reap(&room_id, generation).await;
        }
        if shutting_down {
            break;
        }
    }

    tracing::info!(room = %room_id, "room loop exiting");
}

struct RoomState {
    room_id: String,
    clients: HashMap<String, RoomMember>,
    join_seq: u64,
    chat_log: ChatLog,
}

impl RoomState {
    fn new(room_id: String) -> Self {
        RoomState {
            room_id,
            clients: HashMap::new(),
            join_seq: 0,
            chat_log: ChatLog::new(),
        }
    }

    fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Register { info, tx } => self.on_register(info, tx),
            RoomCommand::Unregister { client_id } => self.remove_client(&client_id),
            RoomCommand::Event { client_id, event } => self.on_event(&client_id, event),
            RoomCommand::Shutdown => self.on_shutdown(),
        }
    }

    // --- admission -------------------------------------------------------

    fn on_register(&mut self, info: ClientInfo, tx: mpsc::Sender<Message>) {
        let client_id = info.client_id.clone();
        let role = if self.clients.is_empty() {
            BaseRole::Host
        } else {
            BaseRole::Waiting
        };
        self.join_seq += 1;
        tracing::info!(room = %self.room_id, client = %client_id, ?role, "client registered");
        self.clients.insert(
            client_id.clone(),
            RoomMember {
                info,
                base_role: role,
                screensharing: false,
                hand_raised: false,
                tx,
                joined_at: self.join_seq,
            },
        );

        match role {
            BaseRole::Host => self.broadcast_room_state(),
            BaseRole::Waiting => {
                self.notify_hosts_waiting(&client_id);
                self.send_minimal_state(&client_id);
            }
            BaseRole::Participant => unreachable!("admission only ever assigns Host or Waiting"),
        }
    }

    /// Removes a client from every role set, promotes a replacement host if
    /// needed, and either broadcasts the new room state or leaves the room
    /// empty for the caller to reap. Used both
    /// for the reader pump's own unregister and as the common path for
    /// dropping a slow consumer or closing a denied client.
    fn remove_client(&mut self, client_id: &str) {
        let Some(removed) = self.clients.remove(client_id) else {
            return;
        };
        tracing::info!(room = %self.room_id, client = %client_id, "client removed");

        if removed.base_role.is_host() && !self.clients.values().any(|m| m.base_role.is_host()) {
            if let Some(promoted) = self.earliest_participant() {
                tracing::info!(room = %self.room_id, client = %promoted, "promoted to host");
                if let Some(m) = self.clients.get_mut(&promoted) {
                    m.base_role = BaseRole::Host;
                }
            }
        }

        if !self.clients.is_empty() {
            self.broadcast_room_state();
        }
    }

    fn earliest_participant(&self) -> Option<String> {
        self.clients
            .iter()
            .filter(|(_, m)| matches!(m.base_role, BaseRole::Participant))
            .min_by_key(|(_, m)| m.joined_at)
            .map(|(id, _)| id.clone())
    }

    // --- event dispatch ----------------------------------------------------

    fn on_event(&mut self, client_id: &str, event: IncomingEvent) {
        let Some(sender_role) = self.clients.get(client_id).map(|m| m.base_role) else {
            // Event from a client the room doesn't know about (e.g. raced
            // with its own unregister). Nothing to authorize against.
            return;
        };

        let required = event.required_role();
        if !sender_role.satisfies(required) {
            let err = CoreError::Authorization {
                client_id: client_id.to_string(),
                event: event.name().to_string(),
            };
            tracing::warn!(room = %self.room_id, error = %err, "authorization denied");
            return;
        }

        match event {
            IncomingEvent::Offer(p) => self.forward_signal(client_id, &p.target_id, |info| {
                OutgoingEvent::Offer(crate::event::SdpSignalWire {
                    client_id: info.client_id.clone(),
                    display_name: info.display_name.clone(),
                    target_id: p.target_id.clone(),
                    sdp: p.sdp.clone(),
                })
            }),
            IncomingEvent::Answer(p) => self.forward_signal(client_id, &p.target_id, |info| {
                OutgoingEvent::Answer(crate::event::SdpSignalWire {
                    client_id: info.client_id.clone(),
                    display_name: info.display_name.clone(),
                    target_id: p.target_id.clone(),
                    sdp: p.sdp.clone(),
                })
            }),
            IncomingEvent::Candidate(p) => self.forward_signal(client_id, &p.target_id, |info| {
                OutgoingEvent::Candidate(crate::event::CandidateWire {
                    client_id: info.client_id.clone(),
                    display_name: info.display_name.clone(),
                    target_id: p.target_id.clone(),
                    candidate: p.candidate.clone(),
                    sdp_mid: p.sdp_mid.clone(),
                    sdp_m_line_index: p.sdp_m_line_index,
                })
            }),
            IncomingEvent::Renegotiate(p) => self.forward_signal(client_id, &p.target_id, |info| {
                OutgoingEvent::Renegotiate(crate::event::RenegotiateWire {
                    client_id: info.client_id.clone(),
                    display_name: info.display_name.clone(),
                    target_id: p.target_id.clone(),
                    reason: p.reason.clone(),
                })
            }),
            IncomingEvent::AddChat(p) => self.add_chat(client_id, &p.chat_content),
            IncomingEvent::DeleteChat(p) => self.delete_chat(client_id, p.chat_id),
            IncomingEvent::GetRecentChats(_) => self.send_recent_chats(client_id),
            IncomingEvent::RaiseHand(_) => self.set_hand(client_id, true),
            IncomingEvent::LowerHand(_) => self.set_hand(client_id, false),
            IncomingEvent::RequestWaiting(_) => self.notify_hosts_waiting(client_id),
            IncomingEvent::AcceptWaiting(p) => self.accept_waiting(&p.target_id),
            IncomingEvent::DenyWaiting(p) => self.deny_waiting(&p.target_id),
            IncomingEvent::RequestScreenshare(_) => self.notify_hosts_screenshare(client_id),
            IncomingEvent::AcceptScreenshare(p) => self.accept_screenshare(&p.target_id),
            IncomingEvent::DenyScreenshare(p) => self.deny_screenshare(&p.target_id),
            IncomingEvent::Ping(_) => self.pong(client_id),
        }
    }

    fn on_shutdown(&mut self) {
        for (_, member) in self.clients.drain() {
            drop(member.tx);
        }
    }

    // --- signaling ---------------------------------------------------------

    fn forward_signal(
        &mut self,
        sender_id: &str,
        target_id: &str,
        build: impl FnOnce(&ClientInfo) -> OutgoingEvent,
    ) {
        let Some(sender_info) = self.clients.get(sender_id).map(|m| m.info.clone()) else {
            return;
        };
        let event = build(&sender_info);
        // Unknown target: silently dropped, sender not notified.
        self.send_to(target_id, &event);
    }

    // --- chat ---------------------------------------------------------------

    fn add_chat(&mut self, sender_id: &str, content: &str) {
        let Some(info) = self.clients.get(sender_id).map(|m| m.info.clone()) else {
            return;
        };
        let Some(entry) = self
            .chat_log
            .append(&info.client_id, &info.display_name, content)
        else {
            tracing::warn!(room = %self.room_id, client = %sender_id, "chat content rejected (empty or >1000 chars)");
            return;
        };
        self.broadcast(&OutgoingEvent::AddChat((&entry).into()), |m| {
            !m.base_role.is_waiting()
        });
    }

    fn delete_chat(&mut self, sender_id: &str, chat_id: u64) {
        let Some(member) = self.clients.get(sender_id) else {
            return;
        };
        let is_host = member.base_role.is_host();
        let sender_client_id = member.info.client_id.clone();

        let Some(existing) = self.chat_log.find(chat_id) else {
            return;
        };
        let authorized = is_host || existing.author_id == sender_client_id;
        if !authorized {
            tracing::warn!(room = %self.room_id, client = %sender_id, chat_id, "delete_chat denied: not host or author");
            return;
        }
        self.chat_log.remove(chat_id);

        let info = self.clients[sender_id].info.clone();
        self.broadcast(
            &OutgoingEvent::DeleteChat(ChatDeleteWire {
                client_id: info.client_id,
                display_name: info.display_name,
                chat_id,
            }),
            |m| !m.base_role.is_waiting(),
        );
    }

    fn send_recent_chats(&mut self, requester_id: &str) {
        let Some(info) = self.clients.get(requester_id).map(|m| m.info.clone()) else {
            return;
        };
        let chats = self.chat_log.entries().map(Into::into).collect();
        self.send_to(
            requester_id,
            &OutgoingEvent::GetRecentChats(crate::event::RecentChatsWire {
                client_id: info.client_id,
                display_name: info.display_name,
                chats,
            }),
        );
    }

    // --- hand raise ----------------------------------------------------------

    fn set_hand(&mut self, client_id: &str, raised: bool) {
        let Some(member) = self.clients.get_mut(client_id) else {
            return;
        };
        member.hand_raised = raised;
        let info = member.info.clone();
        let identity = IdentityWire {
            client_id: info.client_id,
            display_name: info.display_name,
        };
        let event = if raised {
            OutgoingEvent::RaiseHand(identity)
        } else {
            OutgoingEvent::LowerHand(identity)
        };
        self.broadcast(&event, |m| !m.base_role.is_waiting());
        self.broadcast_room_state();
    }

    // --- waiting room --------------------------------------------------------

    fn notify_hosts_waiting(&mut self, client_id: &str) {
        let Some(info) = self.clients.get(client_id).map(|m| m.info.clone()) else {
            return;
        };
        let identity = IdentityWire {
            client_id: info.client_id,
            display_name: info.display_name,
        };
        self.broadcast(&OutgoingEvent::RequestWaiting(identity), |m| {
            m.base_role.is_host()
        });
    }

    fn accept_waiting(&mut self, target_id: &str) {
        let Some(target) = self.clients.get_mut(target_id) else {
            return; // unknown target: silently dropped
        };
        if !target.base_role.is_waiting() {
            return;
        }
        target.base_role = BaseRole::Participant;
        let info = target.info.clone();
        self.send_to(
            target_id,
            &OutgoingEvent::AcceptWaiting(IdentityWire {
                client_id: info.client_id,
                display_name: info.display_name,
            }),
        );
        self.broadcast_room_state();
    }

    fn deny_waiting(&mut self, target_id: &str) {
        let Some(target) = self.clients.get(target_id) else {
            return;
        };
        if !target.base_role.is_waiting() {
            return;
        }
        let info = target.info.clone();
        self.send_to(
            target_id,
            &OutgoingEvent::DenyWaiting(IdentityWire {
                client_id: info.client_id,
                display_name: info.display_name,
            }),
        );
        // The room removes and closes the denied client.
        self.remove_client(target_id);
    }

    // --- screen share --------------------------------------------------------

    fn notify_hosts_screenshare(&mut self, client_id: &str) {
        let Some(info) = self.clients.get(client_id).map(|m| m.info.clone()) else {
            return;
        };
        let identity = IdentityWire {
            client_id: info.client_id,
            display_name: info.display_name,
        };
        self.broadcast(&OutgoingEvent::RequestScreenshare(identity), |m| {
            m.base_role.is_host()
        });
    }

    fn accept_screenshare(&mut self, target_id: &str) {
        let Some(target) = self.clients.get_mut(target_id) else {
            return;
        };
        if target.base_role.is_waiting() {
            return; // must already be admitted
        }
        target.screensharing = true;
        let info = target.info.clone();
        self.send_to(
            target_id,
            &OutgoingEvent::AcceptScreenshare(IdentityWire {
                client_id: info.client_id,
                display_name: info.display_name,
            }),
        );
        self.broadcast_room_state();
    }

    fn deny_screenshare(&mut self, target_id: &str) {
        // Denial only cancels the request; no state change.
        let Some(target) = self.clients.get(target_id) else {
            return;
        };
        let info = target.info.clone();
        self.send_to(
            target_id,
            &OutgoingEvent::DenyScreenshare(IdentityWire {
                client_id: info.client_id,
                display_name: info.display_name,
            }),
        );
    }

    // --- heartbeat -------------------------------------------------------------

    fn pong(&mut self, client_id: &str) {
        let Some(info) = self.clients.get(client_id).map(|m| m.info.clone()) else {
            return;
        };
        self.send_to(
            client_id,
            &OutgoingEvent::Pong(IdentityWire {
                client_id: info.client_id,
                display_name: info.display_name,
            }),
        );
    }

    // --- room state snapshot / fan-out ------------------------------------------

    fn broadcast_room_state(&mut self) {
        let full = self.snapshot();
        let non_waiting: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, m)| !m.base_role.is_waiting())
            .map(|(id, _)| id.clone())
            .collect();
        for id in non_waiting {
            self.send_to(&id, &OutgoingEvent::RoomState(full.clone_wire()));
        }

        let waiting: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, m)| m.base_role.is_waiting())
            .map(|(id, _)| id.clone())
            .collect();
        for id in waiting {
            self.send_minimal_state(&id);
        }
    }

    fn send_minimal_state(&mut self, client_id: &str) {
        let Some(info) = self.clients.get(client_id).map(|m| m.info.clone()) else {
            return;
        };
        let snapshot = RoomStateWire {
            room_id: self.room_id.clone(),
            hosts: vec![],
            participants: vec![],
            waiting: vec![IdentityWire {
                client_id: info.client_id,
                display_name: info.display_name,
            }],
            screensharing: vec![],
            hands_raised: vec![],
        };
        self.send_to(client_id, &OutgoingEvent::RoomState(snapshot));
    }

    fn snapshot(&self) -> RoomStateWire {
        let mut hosts = Vec::new();
        let mut participants = Vec::new();
        let mut waiting = Vec::new();
        let mut screensharing = Vec::new();
        let mut hands_raised = Vec::new();

        for m in self.clients.values() {
            let identity = IdentityWire {
                client_id: m.info.client_id.clone(),
                display_name: m.info.display_name.clone(),
            };
            match m.base_role {
                BaseRole::Host => hosts.push(identity.clone()),
                BaseRole::Participant => participants.push(identity.clone()),
                BaseRole::Waiting => waiting.push(identity.clone()),
            }
            if m.screensharing {
                screensharing.push(identity.clone());
            }
            if m.hand_raised {
                hands_raised.push(identity);
            }
        }

        RoomStateWire {
            room_id: self.room_id.clone(),
            hosts,
            participants,
            waiting,
            screensharing,
            hands_raised,
        }
    }

    /// Sends to a single client. Unknown recipient: silently dropped. Full
    /// outbound queue: the recipient is a slow consumer and is torn down,
    /// but this never delays the caller.
    fn send_to(&mut self, client_id: &str, event: &OutgoingEvent) {
        let Some(text) = encode(event) else { return };
        let Some(member) = self.clients.get(client_id) else {
            return;
        };
        if member.tx.try_send(Message::text(text)).is_err() {
            let err = CoreError::Capacity {
                client_id: client_id.to_string(),
            };
            tracing::warn!(room = %self.room_id, error = %err, "dropping client");
            self.remove_client(client_id);
        }
    }

    /// Sends to every client matching `recipients`, dropping slow consumers
    /// only after the fan-out pass completes (so one stuck recipient never
    /// delays or skips delivery to the others).
    fn broadcast(&mut self, event: &OutgoingEvent, recipients: impl Fn(&RoomMember) -> bool) {
        let Some(text) = encode(event) else { return };
        let mut dead = Vec::new();
        for (id, member) in self.clients.iter() {
            if !recipients(member) {
                continue;
            }
            if member.tx.try_send(Message::text(text.clone())).is_err() {
                dead.push(id.clone());
            }
        }
        for id in dead {
            let err = CoreError::Capacity {
                client_id: id.clone(),
            };
            tracing::warn!(room = %self.room_id, error = %err, "dropping client");
            self.remove_client(&id);
        }
    }
}

fn encode(event: &OutgoingEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(s) => Some(s),
        Err(e) => {
            let err = CoreError::System(e.to_string());
            tracing::error!(error = %err, "failed to encode outgoing event");
            None
        }
    }
}

trait CloneWire {
    fn clone_wire(&self) -> RoomStateWire;
}

impl CloneWire for RoomStateWire {
    fn clone_wire(&self) -> RoomStateWire {
        RoomStateWire {
            room_id: self.room_id.clone(),
            hosts: self.hosts.clone(),
            participants: self.participants.clone(),
            waiting: self.waiting.clone(),
            screensharing: self.screensharing.clone(),
            hands_raised: self.hands_raised.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn info(id: &str) -> ClientInfo {
        ClientInfo {
            client_id: id.to_string(),
            display_name: format!("Name-{id}"),
        }
    }

    /// A registered fake client: its outbound receiver lets tests observe
    /// exactly what the room would have written to the transport.
    struct Fixture {
        room: RoomState,
        rx: HashMap<String, mpsc::Receiver<Message>>,
    }

    impl Fixture {
        fn new(room_id: &str) -> Self {
            Fixture {
                room: RoomState::new(room_id.to_string()),
                rx: HashMap::new(),
            }
        }

        fn register(&mut self, id: &str) {
            let (tx, rx) = mpsc::channel(OUTBOUND_TEST_CAP);
            self.room.handle(RoomCommand::Register { info: info(id), tx });
            self.rx.insert(id.to_string(), rx);
        }

        fn send(&mut self, id: &str, event: IncomingEvent) {
            self.room.handle(RoomCommand::Event {
                client_id: id.to_string(),
                event,
            });
        }

        fn unregister(&mut self, id: &str) {
            self.room.handle(RoomCommand::Unregister {
                client_id: id.to_string(),
            });
        }

        fn drain(&mut self, id: &str) -> Vec<serde_json::Value> {
            let rx = self.rx.get_mut(id).unwrap();
            let mut out = Vec::new();
            loop {
                match rx.try_recv() {
                    Ok(msg) => out.push(serde_json::from_str(msg.to_str().unwrap()).unwrap()),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
            out
        }

        fn role_of(&self, id: &str) -> BaseRole {
            self.room.clients[id].base_role
        }
    }

    const OUTBOUND_TEST_CAP: usize = 16;

    #[test]
    fn first_client_becomes_host() {
        let mut f = Fixture::new("R1");
        f.register("A");
        assert_eq!(f.role_of("A"), BaseRole::Host);
        let msgs = f.drain("A");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["event"], "room_state");
        assert_eq!(msgs[0]["payload"]["hosts"][0]["clientId"], "A");
    }

    #[test]
    fn second_client_waits_and_hosts_are_notified() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");
        f.register("B");
        assert_eq!(f.role_of("B"), BaseRole::Waiting);

        let a_msgs = f.drain("A");
        assert_eq!(a_msgs[0]["event"], "request_waiting");
        assert_eq!(a_msgs[0]["payload"]["clientId"], "B");

        let b_msgs = f.drain("B");
        assert_eq!(b_msgs[0]["event"], "room_state");
        assert_eq!(b_msgs[0]["payload"]["waiting"][0]["clientId"], "B");
        assert!(b_msgs[0]["payload"]["hosts"].as_array().unwrap().is_empty());
    }

    #[test]
    fn accept_waiting_promotes_and_broadcasts_room_state() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");
        f.register("B");
        f.drain("A");
        f.drain("B");

        f.send(
            "A",
            IncomingEvent::AcceptWaiting(crate::event::TargetPayload {
                target_id: "B".into(),
            }),
        );
        assert_eq!(f.role_of("B"), BaseRole::Participant);

        let b_msgs = f.drain("B");
        assert_eq!(b_msgs[0]["event"], "accept_waiting");
        assert_eq!(b_msgs[0]["payload"]["clientId"], "B");
        assert_eq!(b_msgs[1]["event"], "room_state");
        assert_eq!(b_msgs[1]["payload"]["participants"][0]["clientId"], "B");

        let a_msgs = f.drain("A");
        assert_eq!(a_msgs[0]["event"], "room_state");
        assert_eq!(a_msgs[0]["payload"]["hosts"][0]["clientId"], "A");
        assert_eq!(a_msgs[0]["payload"]["participants"][0]["clientId"], "B");
    }

    #[test]
    fn non_host_accept_waiting_is_silently_dropped() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");
        f.register("B");
        f.drain("A");
        f.drain("B");

        // B (waiting) cannot accept_waiting on itself.
        f.send(
            "B",
            IncomingEvent::AcceptWaiting(crate::event::TargetPayload {
                target_id: "B".into(),
            }),
        );
        assert_eq!(f.role_of("B"), BaseRole::Waiting);
        assert!(f.drain("A").is_empty());
        assert!(f.drain("B").is_empty());
    }

    #[test]
    fn chat_round_trip_and_delete_policy() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");
        f.register("B");
        f.drain("A");
        f.drain("B");
        f.send(
            "A",
            IncomingEvent::AcceptWaiting(crate::event::TargetPayload {
                target_id: "B".into(),
            }),
        );
        f.drain("A");
        f.drain("B");

        f.send(
            "B",
            IncomingEvent::AddChat(crate::event::AddChatPayload {
                chat_content: "hi".into(),
            }),
        );
        let a_chat = f.drain("A");
        let b_chat = f.drain("B");
        assert_eq!(a_chat[0]["event"], "add_chat");
        assert_eq!(a_chat[0]["payload"]["chatId"], 1);
        assert_eq!(a_chat[0]["payload"]["displayName"], "Name-B");
        assert_eq!(b_chat[0]["event"], "add_chat");

        f.send("B", IncomingEvent::GetRecentChats(crate::event::EmptyPayload));
        let recent = f.drain("B");
        assert_eq!(recent.len(), 1);
        let chats = recent[0]["payload"]["chats"].as_array().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0]["chatId"], 1);
        assert_eq!(chats[0]["chatContent"], "hi");

        // A third client (participant, not host, not author) cannot delete.
        f.register("C");
        f.drain("A");
        f.drain("B");
        f.send(
            "A",
            IncomingEvent::AcceptWaiting(crate::event::TargetPayload {
                target_id: "C".into(),
            }),
        );
        f.drain("A");
        f.drain("B");
        f.drain("C");

        f.send(
            "C",
            IncomingEvent::DeleteChat(crate::event::DeleteChatPayload { chat_id: 1 }),
        );
        assert!(f.drain("A").is_empty());
        assert!(f.drain("B").is_empty());
        assert!(f.drain("C").is_empty());

        // The host can delete it.
        f.send(
            "A",
            IncomingEvent::DeleteChat(crate::event::DeleteChatPayload { chat_id: 1 }),
        );
        let deletions: Vec<_> = f.drain("B");
        assert_eq!(deletions[0]["event"], "delete_chat");
        assert_eq!(deletions[0]["payload"]["chatId"], 1);

        f.send("B", IncomingEvent::GetRecentChats(crate::event::EmptyPayload));
        let recent = f.drain("B");
        assert!(recent[0]["payload"]["chats"].as_array().unwrap().is_empty());
    }

    #[test]
    fn raise_hand_then_lower_hand_restores_prior_state() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");

        f.send("A", IncomingEvent::RaiseHand(crate::event::EmptyPayload));
        assert!(f.room.clients["A"].hand_raised);
        f.drain("A");

        f.send("A", IncomingEvent::RaiseHand(crate::event::EmptyPayload));
        // Idempotent: still present exactly once.
        assert!(f.room.clients["A"].hand_raised);
        f.drain("A");

        f.send("A", IncomingEvent::LowerHand(crate::event::EmptyPayload));
        assert!(!f.room.clients["A"].hand_raised);
    }

    #[test]
    fn host_handoff_promotes_earliest_joined_participant() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");
        f.register("B");
        f.drain("A");
        f.drain("B");
        f.send(
            "A",
            IncomingEvent::AcceptWaiting(crate::event::TargetPayload {
                target_id: "B".into(),
            }),
        );
        f.drain("A");
        f.drain("B");

        f.unregister("A");
        assert_eq!(f.role_of("B"), BaseRole::Host);
        let b_msgs = f.drain("B");
        assert_eq!(b_msgs[0]["event"], "room_state");
        assert_eq!(b_msgs[0]["payload"]["hosts"][0]["clientId"], "B");
        assert!(b_msgs[0]["payload"]["participants"].as_array().unwrap().is_empty());
    }

    #[test]
    fn deny_waiting_closes_the_target() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");
        f.register("B");
        f.drain("A");
        f.drain("B");

        f.send(
            "A",
            IncomingEvent::DenyWaiting(crate::event::TargetPayload {
                target_id: "B".into(),
            }),
        );
        let b_msgs = f.drain("B");
        assert_eq!(b_msgs[0]["event"], "deny_waiting");
        assert!(!f.room.clients.contains_key("B"));
    }

    #[test]
    fn unknown_target_is_silently_dropped() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");

        f.send(
            "A",
            IncomingEvent::Offer(crate::event::SdpSignalPayload {
                target_id: "ghost".into(),
                sdp: "v=0".into(),
            }),
        );
        assert!(f.drain("A").is_empty());
    }

    #[test]
    fn ping_yields_pong_with_no_state_change() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");

        f.send("A", IncomingEvent::Ping(crate::event::EmptyPayload));
        let msgs = f.drain("A");
        assert_eq!(msgs[0]["event"], "pong");
        assert_eq!(msgs[0]["payload"]["clientId"], "A");
    }

    #[test]
    fn chat_log_is_capped_and_evicts_oldest() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");

        for i in 0..51 {
            f.send(
                "A",
                IncomingEvent::AddChat(crate::event::AddChatPayload {
                    chat_content: format!("m{i}"),
                }),
            );
            f.drain("A");
        }
        f.send("A", IncomingEvent::GetRecentChats(crate::event::EmptyPayload));
        let recent = f.drain("A");
        let chats = recent[0]["payload"]["chats"].as_array().unwrap();
        assert_eq!(chats.len(), 50);
        assert_eq!(chats.first().unwrap()["chatId"], 2);
        assert_eq!(chats.last().unwrap()["chatId"], 51);
    }

    #[test]
    fn screenshare_denial_does_not_change_state() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");

        f.send(
            "A",
            IncomingEvent::DenyScreenshare(crate::event::TargetPayload {
                target_id: "A".into(),
            }),
        );
        assert!(!f.room.clients["A"].screensharing);
        let msgs = f.drain("A");
        assert_eq!(msgs[0]["event"], "deny_screenshare");
    }

    #[test]
    fn slow_consumer_is_dropped_without_affecting_others() {
        let mut f = Fixture::new("R1");
        f.register("A");
        f.drain("A");

        // Register B with a channel capacity of 0 effectively by filling it.
        let (tx, mut rx) = mpsc::channel(1);
        f.room.handle(RoomCommand::Register {
            info: info("B"),
            tx,
        });
        f.drain("A");
        // Drain B's own room_state/minimal-state message, then fill the
        // channel so the next broadcast to B fails.
        let _ = rx.try_recv();
        // Fill the single slot.
        let _ = f
            .room
            .clients
            .get("B")
            .unwrap()
            .tx
            .try_send(Message::text("filler"));

        f.send(
            "A",
            IncomingEvent::AcceptWaiting(crate::event::TargetPayload {
                target_id: "B".into(),
            }),
        );
        // B never satisfied waiting in this setup (registered directly as
        // waiting since room was non-empty); accept should have tried to
        // notify B and, finding the queue full, dropped B.
        assert!(!f.room.clients.contains_key("B"));
        // A is unaffected and still present, sees the resulting room_state.
        let a_msgs = f.drain("A");
        assert!(!a_msgs.is_empty());
    }
}
