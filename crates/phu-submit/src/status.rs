//! The shared busy indicator and message area all backend calls report to.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum Notice {
    Success(String),
    Error(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Success(m) | Notice::Error(m) => m,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Notice::Success(_))
    }
}

/// Busy while any call is in flight; shows at most one notice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRegion {
    in_flight: usize,
    notice: Option<Notice>,
}

impl StatusRegion {
    /// A call was triggered: count it and hide the previous notice.
    pub fn begin(&mut self) {
        self.in_flight += 1;
        self.notice = None;
    }

    /// A call settled. Each `begin` is matched by exactly one `settle`.
    pub fn settle(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn show(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    pub fn busy(&self) -> bool {
        self.in_flight > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_until_every_call_settles() {
        let mut status = StatusRegion::default();
        status.show(Notice::Error("old".into()));
        status.begin();
        assert_eq!(status.notice(), None);
        status.begin();
        status.settle();
        assert!(status.busy());
        status.settle();
        assert!(!status.busy());
        status.settle();
        assert_eq!(status.in_flight(), 0);
    }

    #[test]
    fn new_notice_replaces_old() {
        let mut status = StatusRegion::default();
        status.show(Notice::Error("first".into()));
        status.show(Notice::Success("second".into()));
        assert_eq!(status.notice().map(|n| n.message()), Some("second"));
        assert!(status.notice().is_some_and(|n| n.is_success()));
    }
}
