//! Editorial state machine shared by reports, blogs and press releases.

use std::fmt;

use serde::Serialize;

use super::types::ContentStatus;

/// Named workflow actions with a restricted set of source states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    SubmitForReview,
    Approve,
    Reject,
    Unpublish,
    Schedule,
}

impl Transition {
    pub fn action(self) -> &'static str {
        match self {
            Transition::SubmitForReview => "submit-review",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Unpublish => "unpublish",
            Transition::Schedule => "schedule",
        }
    }

    /// Verb used in audit action names (`report.approve`, ...).
    pub fn audit_verb(self) -> &'static str {
        match self {
            Transition::SubmitForReview => "submit_review",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Unpublish => "unpublish",
            Transition::Schedule => "schedule",
        }
    }

    pub fn allowed_from(self) -> &'static [ContentStatus] {
        match self {
            Transition::SubmitForReview => &[ContentStatus::Draft],
            Transition::Approve | Transition::Reject => &[ContentStatus::Review],
            Transition::Unpublish => &[ContentStatus::Published],
            Transition::Schedule => &[ContentStatus::Draft, ContentStatus::Review],
        }
    }

    /// Resulting status, or `None` when the action leaves the status untouched.
    pub fn target(self) -> Option<ContentStatus> {
        match self {
            Transition::SubmitForReview => Some(ContentStatus::Review),
            Transition::Approve => Some(ContentStatus::Published),
            Transition::Reject | Transition::Unpublish => Some(ContentStatus::Draft),
            Transition::Schedule => None,
        }
    }

    /// Validate `current` against the source set and return the resulting status.
    pub fn apply(self, current: ContentStatus) -> Result<ContentStatus, InvalidTransition> {
        if self.allowed_from().contains(&current) {
            Ok(self.target().unwrap_or(current))
        } else {
            Err(InvalidTransition {
                action: self,
                current,
            })
        }
    }
}

/// Label used for a status inside workflow messages; review is `pending_review` there.
pub fn workflow_label(status: ContentStatus) -> &'static str {
    match status {
        ContentStatus::Draft => "draft",
        ContentStatus::Review => "pending_review",
        ContentStatus::Published => "published",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub action: Transition,
    pub current: ContentStatus,
}

impl InvalidTransition {
    pub fn target_label(&self) -> &'static str {
        self.action
            .target()
            .map(workflow_label)
            .unwrap_or("scheduled")
    }
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let allowed = self
            .action
            .allowed_from()
            .iter()
            .map(|status| format!("'{}'", workflow_label(*status)))
            .collect::<Vec<_>>()
            .join(" or ");
        write!(
            f,
            "cannot {} from status '{}' to '{}': status must be {}",
            self.action.action(),
            workflow_label(self.current),
            self.target_label(),
            allowed
        )
    }
}

impl std::error::Error for InvalidTransition {}
