//! Save/close timers for chat sessions.
//!
//! Each chat holds at most one pending timer. The timer task captures only
//! the chat's identity and a ticket; when it fires it re-resolves the owning
//! persona through the switchboard, takes that persona's lock, and checks the
//! ticket against the chat's current timer so a replaced timer is ignored.

use parley_proto::Address;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::AbortHandle;

use crate::switchboard::Switchboard;

/// Lifecycle state of a chat's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    None,
    WaitingToSave,
    WaitingToClose,
}

/// What a timer request does to the pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Keep,
    StartSave,
    StartClose,
    Cancel,
}

impl TimerState {
    /// Resolve a request for `requested` made while in `self`.
    pub fn on_request(self, requested: TimerState) -> TimerAction {
        match (self, requested) {
            (TimerState::None, TimerState::None) => TimerAction::Keep,
            (_, TimerState::None) => TimerAction::Cancel,
            (TimerState::WaitingToClose, TimerState::WaitingToSave) => TimerAction::StartSave,
            (TimerState::None, TimerState::WaitingToSave) => TimerAction::StartSave,
            (TimerState::WaitingToSave, TimerState::WaitingToSave) => TimerAction::Keep,
            (TimerState::None, TimerState::WaitingToClose) => TimerAction::StartClose,
            (TimerState::WaitingToSave, TimerState::WaitingToClose) => TimerAction::Keep,
            (TimerState::WaitingToClose, TimerState::WaitingToClose) => TimerAction::Keep,
        }
    }
}

impl TimerAction {
    /// State after applying this action to `current`.
    pub fn next_state(self, current: TimerState) -> TimerState {
        match self {
            TimerAction::Keep => current,
            TimerAction::StartSave => TimerState::WaitingToSave,
            TimerAction::StartClose => TimerState::WaitingToClose,
            TimerAction::Cancel => TimerState::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Save,
    Close,
}

/// Identity of a chat: owning persona and thread id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatKey {
    pub owner: Address,
    pub thread: String,
}

/// A scheduled timer. Dropping it does not cancel it; call [`ChatTimer::cancel`].
#[derive(Debug)]
pub struct ChatTimer {
    ticket: u64,
    kind: TimerKind,
    handle: Option<AbortHandle>,
}

impl ChatTimer {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn cancel(self) {
        if let Some(handle) = self.handle {
            handle.abort();
        }
    }
}

/// Shared timer facility for every chat of every persona.
pub struct ChatTimers {
    hub: Option<Weak<Switchboard>>,
    save_after: Duration,
    close_after: Duration,
    tickets: AtomicU64,
}

impl ChatTimers {
    pub(crate) fn new(hub: Weak<Switchboard>, save_after: Duration, close_after: Duration) -> Self {
        Self {
            hub: Some(hub),
            save_after,
            close_after,
            tickets: AtomicU64::new(0),
        }
    }

    /// Timers that hand out tickets but never fire.
    pub fn detached(save_after: Duration, close_after: Duration) -> Self {
        Self {
            hub: None,
            save_after,
            close_after,
            tickets: AtomicU64::new(0),
        }
    }

    pub fn save_after(&self) -> Duration {
        self.save_after
    }

    pub fn close_after(&self) -> Duration {
        self.close_after
    }

    pub(crate) fn schedule(&self, key: ChatKey, kind: TimerKind) -> ChatTimer {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        let delay = match kind {
            TimerKind::Save => self.save_after,
            TimerKind::Close => self.close_after,
        };
        let handle = self.hub.clone().map(|hub| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(hub) = hub.upgrade() {
                    hub.fire_chat_timer(key, ticket).await;
                }
            })
            .abort_handle()
        });
        ChatTimer {
            ticket,
            kind,
            handle,
        }
    }
}
