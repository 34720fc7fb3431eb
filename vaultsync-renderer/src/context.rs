//! Template contexts: serializable payloads for the output templates.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::RenderError;

/// Payload for `document.md.tera`.
///
/// Field order in the rendered metadata block is fixed by the template, not
/// by this struct.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentContext {
    /// Title as a double-quoted YAML scalar.
    pub title_json: String,
    pub weight: i64,
    /// Uid as a double-quoted YAML scalar.
    pub uid_json: String,
    /// RFC 3339, whole seconds, UTC.
    pub last_updated: String,
    pub body: String,
}

/// Payload for `section_index.md.tera`.
#[derive(Debug, Clone, Serialize)]
pub struct SectionContext {
    pub title_json: String,
    pub weight: i64,
}

impl DocumentContext {
    pub fn new(
        title: &str,
        weight: i64,
        uid: &str,
        modified_at: DateTime<Utc>,
        body: String,
    ) -> Result<Self, RenderError> {
        Ok(Self {
            title_json: serde_json::to_string(title)?,
            weight,
            uid_json: serde_json::to_string(uid)?,
            last_updated: modified_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            body,
        })
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

impl SectionContext {
    pub fn new(title: &str, weight: i64) -> Result<Self, RenderError> {
        Ok(Self {
            title_json: serde_json::to_string(title)?,
            weight,
        })
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn title_is_quoted_and_escaped() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        let ctx = DocumentContext::new("Say \"hi\": now", 10, "u1", at, String::new()).unwrap();
        assert_eq!(ctx.title_json, r#""Say \"hi\": now""#);
        assert_eq!(ctx.last_updated, "2024-03-01T12:30:45Z");
    }

    #[test]
    fn uid_is_quoted_and_escaped() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        let ctx = DocumentContext::new("A", 0, "odd\"uid", at, String::new()).unwrap();
        assert_eq!(ctx.uid_json, r#""odd\"uid""#);
    }

    #[test]
    fn to_tera_context_succeeds() {
        let ctx = SectionContext::new("Guides", 100).expect("context");
        ctx.to_tera_context().expect("tera context");
    }
}
