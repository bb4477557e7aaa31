use std::collections::VecDeque;
use std::time::Duration;

/// How long a notice stays on screen unless dismissed.
pub const NOTICE_TTL: Duration = Duration::from_secs(4);

const MAX_NOTICES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A transient, dismissable message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub message: String,
}

/// Notices in arrival order; the oldest is dropped past a small limit.
#[derive(Debug, Default)]
pub struct NoticeQueue {
    notices: VecDeque<Notice>,
    next_id: u64,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: NoticeLevel, message: impl Into<String>) -> u64 {
        self.next_id += 1;
        let notice = Notice {
            id: self.next_id,
            level,
            message: message.into(),
        };
        match level {
            NoticeLevel::Error => tracing::warn!(message = %notice.message, "notice"),
            _ => tracing::info!(message = %notice.message, "notice"),
        }
        self.notices.push_back(notice);
        while self.notices.len() > MAX_NOTICES {
            self.notices.pop_front();
        }
        self.next_id
    }

    pub fn info(&mut self, message: impl Into<String>) -> u64 {
        self.push(NoticeLevel::Info, message)
    }

    pub fn success(&mut self, message: impl Into<String>) -> u64 {
        self.push(NoticeLevel::Success, message)
    }

    pub fn error(&mut self, message: impl Into<String>) -> u64 {
        self.push(NoticeLevel::Error, message)
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.id != id);
        self.notices.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}
