use std::time::{Duration, Instant};

/// How long upload-limit and model-switch notices stay visible.
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

/// The single error line shown to the user.
///
/// Transient messages carry a deadline instead of a timer. Writing a new
/// message replaces the old one together with its deadline, so there is never
/// more than one pending clear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorSlot {
    current: Option<Notice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Notice {
    message: String,
    expires_at: Option<Instant>,
}

impl ErrorSlot {
    /// Stays until the next action clears or replaces it.
    pub fn set(&mut self, message: impl Into<String>) {
        self.current = Some(Notice {
            message: message.into(),
            expires_at: None,
        });
    }

    pub fn set_transient(&mut self, message: impl Into<String>, now: Instant) {
        self.current = Some(Notice {
            message: message.into(),
            expires_at: Some(now + NOTICE_TTL),
        });
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn message_at(&self, now: Instant) -> Option<&str> {
        self.current
            .as_ref()
            .filter(|n| n.expires_at.is_none_or(|deadline| now < deadline))
            .map(|n| n.message.as_str())
    }

    pub fn message(&self) -> Option<&str> {
        self.message_at(Instant::now())
    }
}
