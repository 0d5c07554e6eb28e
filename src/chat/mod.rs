//! Chat sessions.
//!
//! A [`ChatSession`] is one conversation thread owned by one persona: an
//! append-only message log numbered from a configurable offset, the set of
//! participants, and the save/close timer that drives its lifecycle. Every
//! append that grows the log asks for a save; indicator-only traffic asks
//! for a close. Saving writes the whole log to the store and only advances
//! the flushed mark on success, so a failed save is retried by the next one.

pub mod timer;

use chrono::Utc;
use parley_proto::{Address, Affiliation, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::metrics;
use crate::store::{ChatHandle, ChatStore, StoreError, Transcript};

pub use timer::{ChatKey, ChatTimer, ChatTimers, TimerAction, TimerKind, TimerState};

/// One logged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub seq: u64,
    /// Sender; `None` for lines generated by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Room nickname of the sender in multi-user chats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

/// A message about to be appended; the session assigns sequence and time.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub from: Option<Address>,
    pub nick: Option<String>,
    pub to: Option<Address>,
    pub subject: Option<String>,
    pub body: String,
}

impl NewMessage {
    pub fn from(from: Address, body: impl Into<String>) -> Self {
        Self {
            from: Some(from),
            body: body.into(),
            ..Self::default()
        }
    }

    /// A line generated by the server.
    pub fn system(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn with_nick(mut self, nick: Option<String>) -> Self {
        self.nick = nick;
        self
    }

    pub fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub address: Address,
    pub nick: Option<String>,
    pub role: Role,
    pub affiliation: Affiliation,
}

impl Participant {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            nick: None,
            role: Role::default(),
            affiliation: Affiliation::default(),
        }
    }
}

/// Result of one [`ChatSession::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing new since the last successful flush.
    UpToDate,
    /// Chat logging is disabled; the new messages were acknowledged unsaved.
    Skipped,
    Written(ChatHandle),
    /// The store rejected the write; the flushed mark did not move.
    Failed,
}

impl FlushOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FlushOutcome::UpToDate => "up_to_date",
            FlushOutcome::Skipped => "skipped",
            FlushOutcome::Written(_) => "written",
            FlushOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug)]
pub struct ChatSession {
    thread_id: String,
    multi_user: bool,
    room: Option<Address>,
    first_seq: u64,
    messages: Vec<ChatMessage>,
    participants: BTreeMap<Address, Participant>,
    closed: bool,
    last_flushed_seq: u64,
    saved: Option<ChatHandle>,
    timer_state: TimerState,
    timer: Option<ChatTimer>,
}

impl ChatSession {
    pub fn new(thread_id: impl Into<String>, first_seq: u64) -> Self {
        Self {
            thread_id: thread_id.into(),
            multi_user: false,
            room: None,
            first_seq,
            messages: Vec::new(),
            participants: BTreeMap::new(),
            closed: false,
            last_flushed_seq: first_seq,
            saved: None,
            timer_state: TimerState::None,
            timer: None,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn is_multi_user(&self) -> bool {
        self.multi_user
    }

    /// Room backing a multi-user chat.
    pub fn room(&self) -> Option<&Address> {
        self.room.as_ref()
    }

    pub(crate) fn make_multi_user(&mut self, room: Address) {
        self.multi_user = true;
        self.room = Some(room);
    }

    pub fn first_seq(&self) -> u64 {
        self.first_seq
    }

    pub fn highest_seq(&self) -> u64 {
        self.first_seq.saturating_add(self.messages.len() as u64)
    }

    pub fn last_flushed_seq(&self) -> u64 {
        self.last_flushed_seq
    }

    pub fn saved_handle(&self) -> Option<ChatHandle> {
        self.saved
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn timer_state(&self) -> TimerState {
        self.timer_state
    }

    /// One-line summary for display to the owner.
    pub fn describe(&self) -> String {
        let kind = match &self.room {
            Some(room) if self.multi_user => format!("multi-user chat in {room}"),
            _ => "one-to-one chat".to_string(),
        };
        let participants: Vec<&str> = self.participants.keys().map(Address::as_str).collect();
        format!(
            "{}: {kind}, {} messages, participants: {}",
            self.thread_id,
            self.messages.len(),
            participants.join(", ")
        )
    }

    /// Snapshot of the participants.
    pub fn participants(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn has_participant(&self, address: &Address) -> bool {
        self.participants.contains_key(address)
    }

    /// Returns true if the participant was not already present.
    pub fn add_participant(&mut self, participant: Participant) -> bool {
        self.participants
            .insert(participant.address.clone(), participant)
            .is_none()
    }

    pub fn remove_participant(&mut self, address: &Address) -> Option<Participant> {
        self.participants.remove(address)
    }

    /// Append a message and return its sequence number.
    pub fn append(&mut self, message: NewMessage) -> u64 {
        let seq = self.highest_seq().saturating_add(1);
        self.messages.push(ChatMessage {
            seq,
            from: message.from,
            nick: message.nick,
            to: message.to,
            subject: message.subject,
            body: message.body,
            timestamp: Utc::now().timestamp_millis(),
        });
        seq
    }

    /// Apply the timer request table.
    pub fn request_timer(&mut self, requested: TimerState, owner: &Address, timers: &ChatTimers) {
        let action = self.timer_state.on_request(requested);
        match action {
            TimerAction::Keep => {}
            TimerAction::Cancel => self.cancel_timer(),
            TimerAction::StartSave => self.arm(TimerKind::Save, owner, timers),
            TimerAction::StartClose => self.arm(TimerKind::Close, owner, timers),
        }
        self.timer_state = action.next_state(self.timer_state);
    }

    fn arm(&mut self, kind: TimerKind, owner: &Address, timers: &ChatTimers) {
        if let Some(previous) = self.timer.take() {
            previous.cancel();
        }
        let key = ChatKey {
            owner: owner.clone(),
            thread: self.thread_id.clone(),
        };
        self.timer = Some(timers.schedule(key, kind));
    }

    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.timer_state = TimerState::None;
    }

    /// Claim the pending timer if `ticket` still names it.
    ///
    /// Called from inside the timer task itself, so the timer is released
    /// without being aborted.
    pub(crate) fn take_fired_timer(&mut self, ticket: u64) -> Option<TimerKind> {
        if self.timer.as_ref().map(ChatTimer::ticket) != Some(ticket) {
            return None;
        }
        let kind = self.timer.take().map(|t| t.kind());
        self.timer_state = TimerState::None;
        kind
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }

    pub fn transcript(&self, owner: &Address) -> Transcript {
        Transcript {
            owner: owner.clone(),
            thread_id: self.thread_id.clone(),
            multi_user: self.multi_user,
            room: self.room.clone(),
            participants: self.participants.keys().cloned().collect(),
            first_seq: self.first_seq,
            messages: self.messages.clone(),
            flushed_at: Utc::now().timestamp_millis(),
        }
    }

    /// Write the transcript if anything was appended since the last flush.
    pub async fn flush(&mut self, owner: &Address, store: &dyn ChatStore, log_chats: bool) -> FlushOutcome {
        let highest = self.highest_seq();
        if self.last_flushed_seq >= highest {
            return FlushOutcome::UpToDate;
        }

        let outcome = if log_chats {
            self.write(owner, store, highest).await
        } else {
            self.last_flushed_seq = highest;
            FlushOutcome::Skipped
        };
        metrics::record_chat_flush(outcome.as_str());
        outcome
    }

    async fn write(&mut self, owner: &Address, store: &dyn ChatStore, highest: u64) -> FlushOutcome {
        let transcript = self.transcript(owner);
        let mut result = store.flush_chat(self.saved, &transcript).await;
        if let Err(StoreError::StaleHandle(stale)) = &result {
            debug!(persona = %owner, thread = %self.thread_id, handle = %stale, "Retrying flush without stale handle");
            result = store.flush_chat(None, &transcript).await;
        }

        match result {
            Ok(handle) => {
                self.saved = Some(handle);
                self.last_flushed_seq = highest;
                debug!(persona = %owner, thread = %self.thread_id, %handle, seq = highest, "Chat transcript saved");
                FlushOutcome::Written(handle)
            }
            Err(e) => {
                warn!(persona = %owner, thread = %self.thread_id, error = %e, "Failed to save chat transcript");
                FlushOutcome::Failed
            }
        }
    }
}
