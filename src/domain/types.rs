//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

pub use marketlens_api_types::{
    AuditOutcome, ContentStatus, Role, SubmissionCategory, SubmissionStatus, UnknownVariant,
};

/// The three publishable content families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Report,
    Blog,
    PressRelease,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [
        ContentKind::Report,
        ContentKind::Blog,
        ContentKind::PressRelease,
    ];

    /// Entity name used in audit records and action names.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Report => "report",
            ContentKind::Blog => "blog",
            ContentKind::PressRelease => "press_release",
        }
    }

    /// Plural family name; doubles as table name and cache key prefix.
    pub fn family(self) -> &'static str {
        match self {
            ContentKind::Report => "reports",
            ContentKind::Blog => "blogs",
            ContentKind::PressRelease => "press_releases",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ContentKind::Report => "Report",
            ContentKind::Blog => "Blog",
            ContentKind::PressRelease => "Press release",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_are_distinct_table_names() {
        let families: Vec<_> = ContentKind::ALL.iter().map(|kind| kind.family()).collect();
        assert_eq!(families, ["reports", "blogs", "press_releases"]);
    }
}
