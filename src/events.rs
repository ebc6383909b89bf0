//! Events published by the session controller for frontends to render

use crate::transcript::ChatEntry;
use chrono::{DateTime, Local};
use std::fmt;

/// Severity of a transient user notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeLevel::Info => write!(f, "info"),
            NoticeLevel::Success => write!(f, "ok"),
            NoticeLevel::Warning => write!(f, "warn"),
            NoticeLevel::Error => write!(f, "error"),
        }
    }
}

/// State of the push connection to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Connected,
    Lost,
    Reconnecting { attempt: u32 },
    /// Retries exhausted; a reconnect command re-arms the loop
    Offline,
}

/// UI-relevant effect of a controller operation
#[derive(Debug, Clone)]
pub(crate) enum UiEvent {
    Notice {
        level: NoticeLevel,
        message: String,
    },
    /// A transcript entry was appended
    Transcript(ChatEntry),
    /// An optimistically shown user message got no reply
    DeliveryFailed {
        content: String,
    },
    /// The code snapshot was replaced (or its timestamp refreshed)
    CodeUpdated {
        code: String,
        at: DateTime<Local>,
    },
    InterviewActive(bool),
    RecordingActive(bool),
    AutoScrapeActive(bool),
    Connection(ConnectionState),
    VolumeChanged(f32),
}
