use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Provenance tag recording how a record entered the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    PdfExtract,
    VisionExtract,
    CsvImport,
    JsonImport,
    Manual,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PdfExtract => "pdf_extract",
            Self::VisionExtract => "vision_extract",
            Self::CsvImport => "csv_import",
            Self::JsonImport => "json_import",
            Self::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosterMetadata {
    pub created_at: String,
    pub updated_at: String,
    pub source: SourceTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

/// Canonical catalog unit. Curated fields (`faq`, `room`, `booth_id`,
/// `contact_email`, `related_links`) are only ever set by a human and are
/// never overwritten by automated extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosterRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    pub display_image_ref: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faq: Vec<FaqEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booth_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_links: Vec<String>,
    pub metadata: PosterMetadata,
}

impl PosterRecord {
    /// True when the machine-derived fields match `other`'s. Curated fields
    /// and provenance are deliberately excluded.
    pub fn machine_fields_eq(&self, other: &PosterRecord) -> bool {
        self.title == other.title
            && self.authors == other.authors
            && self.tags == other.tags
            && self.abstract_text == other.abstract_text
            && self.display_image_ref == other.display_image_ref
    }
}

/// Primary store shape: posters plus catalog-level bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub schema_version: String,
    pub last_updated: String,
    pub posters: Vec<PosterRecord>,
}

impl Catalog {
    pub const SCHEMA_VERSION: &'static str = "1.0";

    pub fn empty(now: &str) -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION.to_string(),
            last_updated: now.to_string(),
            posters: Vec::new(),
        }
    }
}

/// Client-facing projection written to the flat store. No provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatPoster {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub display_image_ref: String,
}

impl From<&PosterRecord> for FlatPoster {
    fn from(record: &PosterRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            authors: record.authors.clone(),
            tags: record.tags.clone(),
            abstract_text: record.abstract_text.clone(),
            display_image_ref: record.display_image_ref.clone(),
        }
    }
}

/// Machine-extracted field draft, before overrides and merge.
#[derive(Debug, Clone, PartialEq)]
pub struct PosterFieldsDraft {
    pub title: String,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub abstract_text: String,
    pub source: SourceTag,
}

/// One not-yet-merged input item produced by the source adapter.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    /// Filename-derived key used to match override entries.
    pub source_key: String,
    pub suggested_id: String,
    pub extracted_text: Option<String>,
    pub image_path: Option<PathBuf>,
    /// Set for CSV/JSON rows, which bypass the extractor entirely.
    pub fields: Option<PosterFieldsDraft>,
    /// CSV/JSON rows reference images that already exist.
    pub display_image_ref: Option<String>,
    pub contact_email: Option<String>,
    pub source_file: Option<String>,
    pub source_sha256: Option<String>,
}

/// Manual override entry, keyed by `source_key` in the overrides file.
/// A bare string is shorthand for a title-only override.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OverrideEntry {
    Title(String),
    Fields(OverrideFields),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverrideFields {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Created,
    Updated,
    Unchanged,
    Retained,
}

impl MergeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Retained => "retained",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub id: String,
    pub outcome: MergeOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordFindings {
    pub id: String,
    pub errors: Vec<String>,
}

/// Per-record validation findings. Empty means the catalog is deployable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub findings: Vec<RecordFindings>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.findings.iter().map(|entry| entry.errors.len()).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportCounts {
    pub source_items: usize,
    pub candidates: usize,
    pub skipped: usize,
    pub vision_fallbacks: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub retained: usize,
    pub posters_total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPaths {
    pub source_path: String,
    pub catalog_path: String,
    pub flat_path: String,
    pub image_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolVersions {
    pub pdftoppm: Option<String>,
    pub pdftotext: Option<String>,
}

/// Run manifest written after every import, one file per run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub mode: String,
    pub source_kind: String,
    pub use_vision: bool,
    pub tool_versions: ToolVersions,
    pub paths: ImportPaths,
    pub counts: ImportCounts,
    pub results: Vec<MergeResult>,
    pub validation: ValidationReport,
    pub warnings: Vec<String>,
}
