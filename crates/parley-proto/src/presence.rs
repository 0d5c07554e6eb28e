//! Presence records.

use std::fmt;

/// Availability reported by a connected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Show {
    /// Temporarily away.
    Away,
    /// Actively interested in chatting.
    Chat,
    /// Do not disturb.
    Dnd,
    /// Away for an extended period.
    ExtendedAway,
    /// Available with no further qualification.
    #[default]
    Online,
    /// Not connected.
    Offline,
}

impl Show {
    /// Short lowercase name, as used in logs and notifications.
    pub fn as_str(self) -> &'static str {
        match self {
            Show::Away => "away",
            Show::Chat => "chat",
            Show::Dnd => "dnd",
            Show::ExtendedAway => "xa",
            Show::Online => "online",
            Show::Offline => "offline",
        }
    }
}

impl fmt::Display for Show {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A presence record: show state, priority and optional status text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Presence {
    /// Availability.
    pub show: Show,
    /// Resource priority; higher wins when several resources are connected.
    pub priority: i8,
    /// Free-form status message.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub status: Option<String>,
}

impl Presence {
    /// A presence with no status text.
    pub fn new(show: Show, priority: i8) -> Self {
        Self {
            show,
            priority,
            status: None,
        }
    }

    /// The OFFLINE, priority 0 sentinel.
    pub fn offline() -> Self {
        Self::new(Show::Offline, 0)
    }

    /// Attach a status message.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// The same priority and status with the show state forced to OFFLINE.
    pub fn as_offline(&self) -> Self {
        Self {
            show: Show::Offline,
            priority: self.priority,
            status: self.status.clone(),
        }
    }

    /// Whether this presence reports any availability at all.
    pub fn is_available(&self) -> bool {
        self.show != Show::Offline
    }
}

impl Default for Presence {
    fn default() -> Self {
        Self::new(Show::Online, 1)
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.show, self.priority)?;
        if let Some(status) = &self.status {
            write!(f, " ({status})")?;
        }
        Ok(())
    }
}
