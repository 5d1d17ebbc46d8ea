//! Findings reported by checks

use serde::Serialize;

/// Severity of a notice
///
/// Ordered by severity. The checker does not treat levels differently; they
/// are informational for whoever renders the report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A human-readable compliance finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Short summary, usually carrying a count
    pub title: String,
    /// Multi-line detail, one line per offending resource
    pub description: String,
    pub level: NoticeLevel,
    /// Identifiers of the offending resources (instance IDs or region names)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub offending_resource_ids: Vec<String>,
}

impl Notice {
    pub fn new(
        level: NoticeLevel,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            level,
            offending_resource_ids: Vec::new(),
        }
    }

    /// Attach the identifiers of the offending resources
    pub fn with_offending_resources<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.offending_resource_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}
