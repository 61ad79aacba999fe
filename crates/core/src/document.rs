use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retention::{RetentionCategory, RetentionSchedule};
use crate::status::DocumentStatus;

/// Unique identifier for a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a [`DocumentFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub Uuid);

impl FileId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The role a stored file plays for its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// The bytes as uploaded.
    Original,
    /// A redacted rendition for public release.
    Redacted,
    /// Extracted OCR text.
    OcrText,
    /// The package prepared for archive transfer.
    Transfer,
}

impl FileType {
    /// The persisted string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Redacted => "redacted",
            Self::OcrText => "ocr_text",
            Self::Transfer => "transfer",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A government record under lifecycle management.
///
/// Rows are created by the ingestion saga in [`DocumentStatus::Ingesting`]
/// and are never physically deleted; destruction is the terminal
/// [`DocumentStatus::Destroyed`] status plus removal of the stored object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier.
    pub id: DocumentId,
    /// Current legal status. Mutated only through the lifecycle engine.
    pub status: DocumentStatus,
    /// Short human-readable title.
    pub title: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Statutory retention classification.
    pub retention_category: RetentionCategory,
    /// The date the record was originally created by its agency.
    pub creation_date: NaiveDate,
    /// Derived: the date retention ends. Recomputed whenever
    /// `creation_date` or `retention_category` changes.
    pub retention_end_date: NaiveDate,
    /// Whether the document is visible to public search.
    #[serde(default)]
    pub is_public: bool,
    /// Date of public release, if released.
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    /// Free-form metadata captured at intake or added by enrichment.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Recompute `retention_end_date` from the current creation date and
    /// category. Must be called after either field changes.
    pub fn recompute_retention(&mut self) {
        self.retention_end_date =
            RetentionSchedule::for_document(self.creation_date, self.retention_category).end_date;
    }
}

/// Input for creating a document through the ingestion saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    /// Short human-readable title.
    pub title: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Statutory retention classification.
    pub retention_category: RetentionCategory,
    /// The date the record was originally created by its agency.
    pub creation_date: NaiveDate,
    /// Free-form metadata captured at intake.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewDocument {
    /// Materialize a [`Document`] row in the initial
    /// [`DocumentStatus::Ingesting`] status.
    #[must_use]
    pub fn into_document(self, now: DateTime<Utc>) -> Document {
        let schedule =
            RetentionSchedule::for_document(self.creation_date, self.retention_category);
        Document {
            id: DocumentId::new(),
            status: DocumentStatus::Ingesting,
            title: self.title,
            description: self.description,
            retention_category: self.retention_category,
            creation_date: self.creation_date,
            retention_end_date: schedule.end_date,
            is_public: false,
            release_date: None,
            metadata: self.metadata,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A binary rendition of a document held in object storage.
///
/// A file row exists if and only if the object it references was uploaded
/// successfully; the ingestion saga orders its steps to keep this true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFile {
    /// Unique identifier.
    pub id: FileId,
    /// Owning document.
    pub document_id: DocumentId,
    /// The role this file plays.
    pub file_type: FileType,
    /// Original filename as uploaded.
    pub file_name: String,
    /// Object storage bucket.
    pub storage_bucket: String,
    /// Object storage key.
    pub storage_key: String,
    /// MIME content type.
    pub content_type: String,
    /// SHA-256 hex digest of the stored bytes, computed at upload.
    pub checksum: String,
    /// Size of the stored bytes.
    pub size_bytes: u64,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_doc() -> NewDocument {
        NewDocument {
            title: "Council minutes 2020".into(),
            description: None,
            retention_category: RetentionCategory::Y10,
            creation_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            metadata: serde_json::json!({}),
            tags: vec!["minutes".into()],
        }
    }

    #[test]
    fn new_document_starts_ingesting_with_derived_end_date() {
        let doc = new_doc().into_document(Utc::now());
        assert_eq!(doc.status, DocumentStatus::Ingesting);
        assert_eq!(
            doc.retention_end_date,
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()
        );
        assert!(!doc.is_public);
    }

    #[test]
    fn recompute_retention_tracks_category_change() {
        let mut doc = new_doc().into_document(Utc::now());
        doc.retention_category = RetentionCategory::Y3;
        doc.recompute_retention();
        assert_eq!(
            doc.retention_end_date,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
        );
    }

    #[test]
    fn file_type_strings() {
        assert_eq!(FileType::Original.as_str(), "original");
        assert_eq!(FileType::OcrText.as_str(), "ocr_text");
    }
}
