use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    cursor_color_for, CursorPosition, CursorState, DocumentOperation, PresenceEntry,
    PresenceStatus, RelayError, SelectionRange, ServerMessage, TypingState,
};
use crate::relay::offline_queue::OfflineQueue;
use crate::relay::sequencer::DocumentSequencer;
use crate::relay::session::{
    OutboundSender, Session, CLOSE_LIVENESS_TIMEOUT, CLOSE_SUPERSEDED,
};

/// Presence entry plus the bookkeeping the sweep needs. The entry survives a
/// disconnect for the grace window so a quick reconnect keeps identity and
/// queued messages.
#[derive(Debug)]
struct PresenceRecord {
    entry: PresenceEntry,
    disconnected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct HubState {
    sessions: HashMap<String, Session>,
    presence: HashMap<String, PresenceRecord>,
    cursors: HashMap<String, CursorState>,
    sequencer: DocumentSequencer,
    queue: OfflineQueue,
}

/// Everything a freshly admitted connection needs to send down the wire
pub struct Admission {
    pub session: Session,
    pub roster: Vec<PresenceEntry>,
    pub queued: Vec<ServerMessage>,
}

/// Result of one liveness sweep over a hub
#[derive(Debug, Default)]
pub struct SweepStats {
    pub marked_idle: usize,
    pub evicted: usize,
    pub expired: usize,
}

/// All live state of one workspace: sessions, presence, cursors, document
/// version counters, and the offline queue. Every mutation goes through the
/// single state mutex, so concurrent joins/leaves/edits within a workspace
/// are serialized while different workspaces never contend.
#[derive(Debug)]
pub struct WorkspaceHub {
    pub workspace_id: String,
    state: Mutex<HubState>,
}

impl WorkspaceHub {
    pub fn new(workspace_id: &str, queue_capacity: usize) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            state: Mutex::new(HubState {
                queue: OfflineQueue::new(queue_capacity),
                ..HubState::default()
            }),
        }
    }

    /// Admit a new session for a user. A prior session for the same user is
    /// closed first (superseding semantics) without a `user_left` broadcast;
    /// the rest of the workspace then sees a single `user_joined`.
    pub async fn connect(
        &self,
        user_id: &str,
        username: &str,
        outbound: OutboundSender,
    ) -> Admission {
        let mut state = self.state.lock().await;

        if let Some(prior) = state.sessions.remove(user_id) {
            info!(
                "Superseding session {} for user {} in workspace {}",
                prior.session_id, user_id, self.workspace_id
            );
            prior.close(CLOSE_SUPERSEDED, "superseded by a newer connection");
        }

        let cursor_color = cursor_color_for(user_id);
        let session = Session::new(user_id, username, &self.workspace_id, &cursor_color, outbound);
        state.sessions.insert(user_id.to_string(), session.clone());

        let record = state
            .presence
            .entry(user_id.to_string())
            .or_insert_with(|| PresenceRecord {
                entry: PresenceEntry::new(user_id, username, &cursor_color),
                disconnected_at: None,
            });
        record.entry.username = username.to_string();
        record.entry.status = PresenceStatus::Active;
        record.entry.typing = TypingState::default();
        record.disconnected_at = None;

        let queued = state.queue.drain(user_id);

        let joined = ServerMessage::UserJoined {
            id: user_id.to_string(),
            username: username.to_string(),
            cursor_color: cursor_color.clone(),
            status: PresenceStatus::Active,
        };
        Self::broadcast_locked(&state, &joined, Some(user_id));

        info!(
            "User {} joined workspace {} (session {})",
            user_id, self.workspace_id, session.session_id
        );

        Admission {
            session,
            roster: Self::roster_locked(&state),
            queued,
        }
    }

    /// Remove a session and broadcast `user_left` exactly once. A stale
    /// session id (superseded connection, or one the sweep already evicted)
    /// is a no-op, which is what makes the single-broadcast guarantee hold.
    pub async fn disconnect(&self, user_id: &str, session_id: Uuid) {
        let mut state = self.state.lock().await;

        match state.sessions.get(user_id) {
            Some(current) if current.session_id == session_id => {}
            _ => return,
        }
        let session = state.sessions.remove(user_id).expect("session checked above");
        state.cursors.remove(user_id);

        if let Some(record) = state.presence.get_mut(user_id) {
            record.entry.status = PresenceStatus::Offline;
            record.entry.typing = TypingState::default();
            record.disconnected_at = Some(Utc::now());
        }

        let left = ServerMessage::UserLeft {
            user_id: user_id.to_string(),
            username: session.username.clone(),
        };
        Self::broadcast_locked(&state, &left, Some(user_id));

        info!(
            "User {} left workspace {} (session {})",
            user_id, self.workspace_id, session_id
        );
    }

    /// Refresh liveness for a user. Called for every inbound message,
    /// heartbeats included; any traffic moves idle back to active.
    pub async fn touch(&self, user_id: &str) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(session) = state.sessions.get_mut(user_id) {
            session.last_seen_at = now;
        }
        if let Some(record) = state.presence.get_mut(user_id) {
            if record.entry.status != PresenceStatus::Active {
                record.entry.status = PresenceStatus::Active;
            }
        }
    }

    /// Store the latest cursor for a user (last-write-wins) and relay it to
    /// every other session in the workspace.
    pub async fn update_cursor(
        &self,
        user_id: &str,
        position: CursorPosition,
        selection: Option<SelectionRange>,
        file_path: Option<String>,
    ) {
        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.get(user_id).cloned() else {
            return;
        };

        let file_path = file_path
            .or_else(|| state.cursors.get(user_id).map(|c| c.file_path.clone()))
            .unwrap_or_default();

        state.cursors.insert(
            user_id.to_string(),
            CursorState {
                user_id: user_id.to_string(),
                file_path: file_path.clone(),
                position,
                selection,
                color: session.cursor_color.clone(),
            },
        );

        let update = ServerMessage::CursorUpdate {
            user_id: user_id.to_string(),
            username: session.username.clone(),
            cursor_color: session.cursor_color.clone(),
            position,
            selection,
            file_path,
        };
        Self::broadcast_locked(&state, &update, Some(user_id));
    }

    /// Accept a document operation in arrival order, assign the next version
    /// for the document, and broadcast it to the rest of the workspace.
    /// `base_version` is informational: a stale base is logged, never
    /// rejected. Receivers spot the gap and request a resync.
    pub async fn apply_document_update(
        &self,
        user_id: &str,
        document_id: &str,
        base_version: Option<u64>,
        operation: DocumentOperation,
    ) -> Option<u64> {
        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.get(user_id).cloned() else {
            return None;
        };

        if let Some(base) = base_version {
            let current = state.sequencer.current(document_id);
            if base < current {
                debug!(
                    "Stale base_version {} for document {} (current {}); accepting in arrival order",
                    base, document_id, current
                );
            }
        }

        let version = state.sequencer.next_version(document_id);
        let update = ServerMessage::DocumentUpdate {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            username: session.username.clone(),
            version,
            operation,
        };
        Self::broadcast_locked(&state, &update, Some(user_id));
        Some(version)
    }

    /// Update a user's activity descriptor and fan it out. Activity messages
    /// are queueable: members inside the disconnect grace window receive them
    /// on reconnect.
    pub async fn update_activity(
        &self,
        user_id: &str,
        activity: String,
        details: Option<serde_json::Value>,
    ) {
        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.get(user_id).cloned() else {
            return;
        };

        if let Some(record) = state.presence.get_mut(user_id) {
            record.entry.current_activity = Some(activity.clone());
            record.entry.activity_details = details.clone();
        }

        let update = ServerMessage::ActivityUpdate {
            user_id: user_id.to_string(),
            username: session.username.clone(),
            activity,
            details,
        };
        Self::fan_out_locked(&mut state, update, Some(user_id));
    }

    /// Update a user's typing indicator and relay it. Typing state is too
    /// short-lived to queue.
    pub async fn update_typing(&self, user_id: &str, is_typing: bool, location: Option<String>) {
        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.get(user_id).cloned() else {
            return;
        };

        if let Some(record) = state.presence.get_mut(user_id) {
            record.entry.typing = TypingState { is_typing, location: location.clone() };
        }

        let update = ServerMessage::UserTyping {
            user_id: user_id.to_string(),
            username: session.username.clone(),
            is_typing,
            location,
        };
        Self::broadcast_locked(&state, &update, Some(user_id));
    }

    /// Point-in-time presence list for the workspace
    pub async fn snapshot(&self) -> Vec<PresenceEntry> {
        let state = self.state.lock().await;
        Self::roster_locked(&state)
    }

    /// Full resync payload for one user: the presence roster plus anything
    /// queued while they were briefly away. Cursor and document state are
    /// re-derived from live traffic, not back-filled.
    pub async fn sync_state(&self, user_id: &str) -> (Vec<PresenceEntry>, Vec<ServerMessage>) {
        let mut state = self.state.lock().await;
        let queued = state.queue.drain(user_id);
        (Self::roster_locked(&state), queued)
    }

    /// System-initiated broadcast to every member. Queueable messages are
    /// additionally held for members inside the disconnect grace window.
    pub async fn broadcast_system(&self, message: ServerMessage) -> (u32, u32) {
        let mut state = self.state.lock().await;
        Self::fan_out_locked(&mut state, message, None)
    }

    /// One pass of the liveness monitor: mark quiet sessions idle, evict dead
    /// ones (with exactly one `user_left` each), and expire presence entries
    /// whose grace window has lapsed.
    pub async fn sweep(
        &self,
        idle_after: Duration,
        offline_after: Duration,
        grace: Duration,
    ) -> SweepStats {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut stats = SweepStats::default();

        let silent_for = |last_seen: DateTime<Utc>| {
            (now - last_seen).to_std().unwrap_or_default()
        };

        // Eviction first, so a dead session cannot also be marked idle
        let dead: Vec<String> = state
            .sessions
            .iter()
            .filter(|(_, session)| silent_for(session.last_seen_at) > offline_after)
            .map(|(user_id, _)| user_id.clone())
            .collect();
        for user_id in dead {
            let session = state.sessions.remove(&user_id).expect("collected above");
            warn!(
                "{} in workspace {} (no heartbeat for over {:?}); evicting session {}",
                RelayError::LivenessTimeout(user_id.clone()),
                self.workspace_id,
                offline_after,
                session.session_id
            );
            session.close(CLOSE_LIVENESS_TIMEOUT, "liveness timeout");
            state.cursors.remove(&user_id);
            if let Some(record) = state.presence.get_mut(&user_id) {
                record.entry.status = PresenceStatus::Offline;
                record.entry.typing = TypingState::default();
                record.disconnected_at = Some(now);
            }
            let left = ServerMessage::UserLeft {
                user_id: user_id.clone(),
                username: session.username.clone(),
            };
            Self::broadcast_locked(&state, &left, Some(&user_id));
            stats.evicted += 1;
        }

        // Idle marking for sessions that are quiet but not yet presumed dead
        let quiet: Vec<String> = state
            .sessions
            .iter()
            .filter(|(_, session)| silent_for(session.last_seen_at) > idle_after)
            .map(|(user_id, _)| user_id.clone())
            .collect();
        for user_id in quiet {
            if let Some(record) = state.presence.get_mut(&user_id) {
                if record.entry.status == PresenceStatus::Active {
                    record.entry.status = PresenceStatus::Idle;
                    stats.marked_idle += 1;
                }
            }
        }

        // Presence entries whose grace window has lapsed are gone for good,
        // together with anything still queued for them
        let expired: Vec<String> = state
            .presence
            .iter()
            .filter(|(user_id, record)| {
                !state.sessions.contains_key(*user_id)
                    && record
                        .disconnected_at
                        .map_or(false, |at| (now - at).to_std().unwrap_or_default() > grace)
            })
            .map(|(user_id, _)| user_id.clone())
            .collect();
        for user_id in expired {
            state.presence.remove(&user_id);
            state.queue.remove(&user_id);
            debug!(
                "Presence entry for user {} in workspace {} expired after grace window",
                user_id, self.workspace_id
            );
            stats.expired += 1;
        }

        stats
    }

    pub async fn list_active(&self) -> Vec<Session> {
        let state = self.state.lock().await;
        state.sessions.values().cloned().collect()
    }

    /// A hub with no sessions and no presence entries can be dropped
    pub async fn is_empty(&self) -> bool {
        let state = self.state.lock().await;
        state.sessions.is_empty() && state.presence.is_empty()
    }

    /// (sessions, presence entries, documents, queued messages)
    pub async fn stats(&self) -> (u32, u32, u32, u32) {
        let state = self.state.lock().await;
        (
            state.sessions.len() as u32,
            state.presence.len() as u32,
            state.sequencer.document_count() as u32,
            state.queue.queued_total() as u32,
        )
    }

    fn roster_locked(state: &HubState) -> Vec<PresenceEntry> {
        let mut roster: Vec<PresenceEntry> =
            state.presence.values().map(|record| record.entry.clone()).collect();
        roster.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        roster
    }

    /// Deliver to every live session except `exclude_user`. A failed send is
    /// logged and skipped: one unresponsive recipient never aborts the loop
    /// or backpressures the sender; the liveness sweep will reap it.
    fn broadcast_locked(
        state: &HubState,
        message: &ServerMessage,
        exclude_user: Option<&str>,
    ) -> u32 {
        let mut delivered = 0;
        for (user_id, session) in &state.sessions {
            if exclude_user == Some(user_id.as_str()) {
                continue;
            }
            if session.send(message.clone()) {
                delivered += 1;
            } else {
                warn!(
                    "{} in workspace {}; leaving eviction to the liveness sweep",
                    RelayError::Broadcast(user_id.clone()),
                    session.workspace_id
                );
            }
        }
        delivered
    }

    /// Broadcast plus offline queueing for members in the grace window.
    /// Returns (delivered, queued).
    fn fan_out_locked(
        state: &mut HubState,
        message: ServerMessage,
        exclude_user: Option<&str>,
    ) -> (u32, u32) {
        let delivered = Self::broadcast_locked(state, &message, exclude_user);

        let mut queued = 0;
        if message.is_queueable() {
            let HubState { sessions, presence, queue, .. } = state;
            for (user_id, record) in presence.iter() {
                if exclude_user == Some(user_id.as_str()) {
                    continue;
                }
                if record.disconnected_at.is_some() && !sessions.contains_key(user_id) {
                    queue.enqueue(user_id, message.clone());
                    queued += 1;
                }
            }
        }
        (delivered, queued)
    }

    #[cfg(test)]
    pub(crate) async fn force_last_seen(&self, user_id: &str, last_seen_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.sessions.get_mut(user_id) {
            session.last_seen_at = last_seen_at;
        }
    }

    #[cfg(test)]
    pub(crate) async fn force_disconnected_at(&self, user_id: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(record) = state.presence.get_mut(user_id) {
            record.disconnected_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::session::{Outbound, OutboundReceiver};
    use tokio::sync::mpsc;

    fn hub() -> WorkspaceHub {
        WorkspaceHub::new("7", 100)
    }

    async fn join(hub: &WorkspaceHub, user_id: &str) -> (Session, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let admission = hub.connect(user_id, user_id, tx).await;
        (admission.session, rx)
    }

    fn collect(rx: &mut OutboundReceiver) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    fn messages(rx: &mut OutboundReceiver) -> Vec<ServerMessage> {
        collect(rx)
            .into_iter()
            .filter_map(|frame| match frame {
                Outbound::Message(msg) => Some(msg),
                Outbound::Close { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn cursor_update_reaches_peers_but_not_sender() {
        let hub = hub();
        let (_a, mut rx_a) = join(&hub, "alice").await;
        let (_b, mut rx_b) = join(&hub, "bob").await;

        hub.update_cursor(
            "alice",
            CursorPosition { line: 3, column: 5 },
            None,
            Some("x.js".to_string()),
        )
        .await;

        let to_bob = messages(&mut rx_b);
        assert!(to_bob.iter().any(|msg| matches!(
            msg,
            ServerMessage::CursorUpdate { user_id, position, file_path, .. }
                if user_id == "alice" && position.line == 3 && position.column == 5 && file_path == "x.js"
        )));

        let to_alice = messages(&mut rx_a);
        assert!(!to_alice.iter().any(|msg| matches!(msg, ServerMessage::CursorUpdate { .. })));
    }

    #[tokio::test]
    async fn later_cursor_update_wins() {
        let hub = hub();
        let (_a, _rx_a) = join(&hub, "alice").await;
        let (_b, mut rx_b) = join(&hub, "bob").await;

        hub.update_cursor("alice", CursorPosition { line: 1, column: 1 }, None, Some("x.js".into()))
            .await;
        hub.update_cursor("alice", CursorPosition { line: 9, column: 2 }, None, None).await;

        let cursor_updates: Vec<CursorPosition> = messages(&mut rx_b)
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::CursorUpdate { position, .. } => Some(position),
                _ => None,
            })
            .collect();
        let last = cursor_updates.last().expect("bob saw cursor updates");
        assert_eq!((last.line, last.column), (9, 2));
    }

    #[tokio::test]
    async fn second_connection_supersedes_first() {
        let hub = hub();
        let (first, mut rx_first) = join(&hub, "alice").await;
        let (second, _rx_second) = join(&hub, "alice").await;

        assert_ne!(first.session_id, second.session_id);
        let active = hub.list_active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, second.session_id);

        let frames = collect(&mut rx_first);
        assert!(frames
            .iter()
            .any(|frame| matches!(frame, Outbound::Close { code: CLOSE_SUPERSEDED, .. })));

        // The stale session id must not tear down the new session
        hub.disconnect("alice", first.session_id).await;
        assert_eq!(hub.list_active().await.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_broadcasts_user_left_once() {
        let hub = hub();
        let (a, _rx_a) = join(&hub, "alice").await;
        let (_b, mut rx_b) = join(&hub, "bob").await;

        hub.disconnect("alice", a.session_id).await;
        hub.disconnect("alice", a.session_id).await;

        let left_count = messages(&mut rx_b)
            .iter()
            .filter(|msg| matches!(msg, ServerMessage::UserLeft { user_id, .. } if user_id == "alice"))
            .count();
        assert_eq!(left_count, 1);
    }

    #[tokio::test]
    async fn document_versions_increase_across_users() {
        let hub = hub();
        let (_a, _rx_a) = join(&hub, "alice").await;
        let (_b, _rx_b) = join(&hub, "bob").await;

        let op = DocumentOperation {
            kind: "insert".to_string(),
            position: serde_json::json!(0),
            content: Some(serde_json::json!("hi")),
        };
        let v1 = hub.apply_document_update("alice", "d1", Some(0), op.clone()).await;
        let v2 = hub.apply_document_update("bob", "d1", Some(1), op.clone()).await;
        let v_other = hub.apply_document_update("alice", "d2", None, op).await;

        assert_eq!(v1, Some(1));
        assert_eq!(v2, Some(2));
        assert_eq!(v_other, Some(1));
    }

    #[tokio::test]
    async fn sweep_marks_idle_then_evicts_with_single_user_left() {
        let hub = hub();
        let (_a, mut rx_a) = join(&hub, "alice").await;
        let (_b, mut rx_b) = join(&hub, "bob").await;

        let idle = Duration::from_secs(45);
        let offline = Duration::from_secs(90);
        let grace = Duration::from_secs(300);

        // Quiet for one interval: idle, still connected
        hub.force_last_seen("alice", Utc::now() - chrono::Duration::seconds(50)).await;
        let stats = hub.sweep(idle, offline, grace).await;
        assert_eq!(stats.marked_idle, 1);
        assert_eq!(stats.evicted, 0);
        let roster = hub.snapshot().await;
        let alice = roster.iter().find(|e| e.user_id == "alice").unwrap();
        assert_eq!(alice.status, PresenceStatus::Idle);

        // Quiet past two intervals: evicted, offline, one user_left
        hub.force_last_seen("alice", Utc::now() - chrono::Duration::seconds(95)).await;
        let stats = hub.sweep(idle, offline, grace).await;
        assert_eq!(stats.evicted, 1);
        let stats = hub.sweep(idle, offline, grace).await;
        assert_eq!(stats.evicted, 0);

        let left_count = messages(&mut rx_b)
            .iter()
            .filter(|msg| matches!(msg, ServerMessage::UserLeft { user_id, .. } if user_id == "alice"))
            .count();
        assert_eq!(left_count, 1);

        let frames = collect(&mut rx_a);
        assert!(frames
            .iter()
            .any(|frame| matches!(frame, Outbound::Close { code: CLOSE_LIVENESS_TIMEOUT, .. })));

        let roster = hub.snapshot().await;
        let alice = roster.iter().find(|e| e.user_id == "alice").unwrap();
        assert_eq!(alice.status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn activity_is_queued_for_user_in_grace_window_and_drained_in_order() {
        let hub = hub();
        let (a, _rx_a) = join(&hub, "alice").await;
        let (_b, _rx_b) = join(&hub, "bob").await;

        hub.disconnect("alice", a.session_id).await;

        hub.update_activity("bob", "commented on task 1".to_string(), None).await;
        hub.update_activity("bob", "commented on task 2".to_string(), None).await;

        let admission = {
            let (tx, _rx) = mpsc::unbounded_channel();
            hub.connect("alice", "alice", tx).await
        };
        let activities: Vec<String> = admission
            .queued
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::ActivityUpdate { activity, .. } => Some(activity),
                _ => None,
            })
            .collect();
        assert_eq!(activities, vec!["commented on task 1", "commented on task 2"]);
    }

    #[tokio::test]
    async fn expired_presence_drops_entry_and_queue() {
        let hub = hub();
        let (a, _rx_a) = join(&hub, "alice").await;
        let (_b, _rx_b) = join(&hub, "bob").await;

        hub.disconnect("alice", a.session_id).await;
        hub.update_activity("bob", "commented".to_string(), None).await;
        hub.force_disconnected_at("alice", Utc::now() - chrono::Duration::seconds(120)).await;

        let stats = hub
            .sweep(Duration::from_secs(45), Duration::from_secs(90), Duration::from_secs(60))
            .await;
        assert_eq!(stats.expired, 1);
        assert!(hub.snapshot().await.iter().all(|e| e.user_id != "alice"));

        // A late reconnect starts clean: nothing queued any more
        let (tx, _rx) = mpsc::unbounded_channel();
        let admission = hub.connect("alice", "alice", tx).await;
        assert!(admission.queued.is_empty());
    }
}
