use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cli::SourceKind;
use crate::model::{PosterFieldsDraft, RawCandidate, SourceTag, ToolVersions};
use crate::util::{ensure_directory, file_stem_string, sha256_file};

/// One discovered source file, before id assignment and rasterization.
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub path: PathBuf,
    pub source_key: String,
}

/// Lists the source files for directory-backed kinds (pdf, image), sorted
/// by filename so id assignment is deterministic across runs.
pub fn discover(kind: SourceKind, input: &Path) -> Result<Vec<SourceItem>> {
    let extensions: &[&str] = match kind {
        SourceKind::Pdf => &["pdf"],
        SourceKind::Image => &["png", "jpg", "jpeg"],
        SourceKind::Csv | SourceKind::Json => {
            bail!("discover is only meaningful for pdf/image sources")
        }
    };

    let entries = fs::read_dir(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", input.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
            .unwrap_or(false);

        if matches {
            paths.push(path);
        }
    }

    paths.sort();

    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        let source_key = file_stem_string(&path)?;
        items.push(SourceItem { path, source_key });
    }

    Ok(items)
}

/// Turns one discovered file into a candidate: rasterizes (pdf) or copies
/// (image) the display image into `image_dir` under the assigned id, and
/// pulls the embedded text where present. Failure here is fatal for this
/// one candidate only; callers skip and continue.
pub fn realize(
    kind: SourceKind,
    item: &SourceItem,
    poster_id: &str,
    image_dir: &Path,
    dpi: u32,
) -> Result<RawCandidate> {
    let source_sha256 = sha256_file(&item.path)?;
    let source_file = item
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned);

    let (image_path, extracted_text) = match kind {
        SourceKind::Pdf => {
            let image_path = image_dir.join(format!("{poster_id}.png"));
            rasterize_pdf(&item.path, &image_path, dpi)?;
            let text = match extract_pdf_text(&item.path) {
                Ok(text) => Some(text),
                Err(err) => {
                    warn!(
                        source = %item.path.display(),
                        error = %err,
                        "embedded text extraction failed, continuing without text"
                    );
                    None
                }
            };
            (image_path, text)
        }
        SourceKind::Image => {
            let extension = item
                .path
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("png")
                .to_ascii_lowercase();
            let image_path = image_dir.join(format!("{poster_id}.{extension}"));
            fs::copy(&item.path, &image_path).with_context(|| {
                format!(
                    "failed to copy {} -> {}",
                    item.path.display(),
                    image_path.display()
                )
            })?;
            (image_path, None)
        }
        SourceKind::Csv | SourceKind::Json => {
            bail!("realize is only meaningful for pdf/image sources")
        }
    };

    Ok(RawCandidate {
        source_key: item.source_key.clone(),
        suggested_id: poster_id.to_string(),
        extracted_text,
        image_path: Some(image_path.clone()),
        fields: None,
        display_image_ref: Some(image_path.display().to_string()),
        contact_email: None,
        source_file,
        source_sha256: Some(source_sha256),
    })
}

/// Rasterizes page 1 of a PDF to a PNG at the requested resolution. One
/// candidate per document; multi-poster PDFs are out of scope.
fn rasterize_pdf(pdf_path: &Path, png_path: &Path, dpi: u32) -> Result<()> {
    if let Some(parent) = png_path.parent() {
        ensure_directory(parent)?;
    }

    // pdftoppm appends .png itself, so pass the path without extension.
    let output_root = png_path.with_extension("");

    let output = Command::new("pdftoppm")
        .arg("-png")
        .arg("-r")
        .arg(dpi.to_string())
        .arg("-f")
        .arg("1")
        .arg("-l")
        .arg("1")
        .arg("-singlefile")
        .arg(pdf_path)
        .arg(&output_root)
        .output()
        .with_context(|| format!("failed to execute pdftoppm for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftoppm returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    if !png_path.exists() {
        bail!(
            "pdftoppm did not produce expected image for {}",
            pdf_path.display()
        );
    }

    info!(source = %pdf_path.display(), image = %png_path.display(), "rasterized poster");
    Ok(())
}

fn extract_pdf_text(pdf_path: &Path) -> Result<String> {
    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg("-")
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).replace('\u{0000}', ""))
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    id: String,
    title: String,
    #[serde(default)]
    authors: String,
    #[serde(default)]
    tags: String,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
    #[serde(default)]
    display_image_ref: String,
    #[serde(default)]
    contact_email: Option<String>,
}

/// Imports rows from a CSV export. `authors` and `tags` are
/// semicolon-separated. Rows missing a required column are skipped and
/// counted, never fatal.
pub fn load_csv(path: &Path) -> Result<(Vec<RawCandidate>, usize)> {
    let source_sha256 = sha256_file(path)?;
    let source_file = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned);

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open csv: {}", path.display()))?;

    let mut candidates = Vec::new();
    let mut skipped = 0_usize;

    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!(row = index + 1, error = %err, "skipping malformed csv row");
                skipped += 1;
                continue;
            }
        };

        if row.id.trim().is_empty()
            || row.title.trim().is_empty()
            || row.abstract_text.trim().is_empty()
            || row.display_image_ref.trim().is_empty()
        {
            warn!(row = index + 1, id = %row.id, "skipping csv row with missing required column");
            skipped += 1;
            continue;
        }

        candidates.push(RawCandidate {
            source_key: row.id.clone(),
            suggested_id: row.id,
            extracted_text: None,
            image_path: None,
            fields: Some(PosterFieldsDraft {
                title: row.title,
                authors: split_list(&row.authors),
                tags: split_list(&row.tags),
                abstract_text: row.abstract_text,
                source: SourceTag::CsvImport,
            }),
            display_image_ref: Some(row.display_image_ref),
            contact_email: row.contact_email.filter(|email| !email.trim().is_empty()),
            source_file: source_file.clone(),
            source_sha256: Some(source_sha256.clone()),
        });
    }

    info!(path = %path.display(), imported = candidates.len(), skipped, "loaded csv rows");
    Ok((candidates, skipped))
}

#[derive(Debug, Deserialize)]
struct JsonPoster {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
    #[serde(default)]
    display_image_ref: String,
    #[serde(default)]
    contact_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonShape {
    Array(Vec<JsonPoster>),
    Wrapped { posters: Vec<JsonPoster> },
}

/// Imports objects from a JSON export: either a bare array of posters or a
/// full `{posters: [...]}` document. Objects missing required fields are
/// skipped and counted.
pub fn load_json(path: &Path) -> Result<(Vec<RawCandidate>, usize)> {
    let source_sha256 = sha256_file(path)?;
    let source_file = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned);

    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let shape: JsonShape = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let posters = match shape {
        JsonShape::Array(posters) => posters,
        JsonShape::Wrapped { posters } => posters,
    };

    let mut candidates = Vec::new();
    let mut skipped = 0_usize;

    for poster in posters {
        if poster.id.trim().is_empty()
            || poster.title.trim().is_empty()
            || poster.abstract_text.trim().is_empty()
            || poster.display_image_ref.trim().is_empty()
        {
            warn!(id = %poster.id, "skipping json poster with missing required field");
            skipped += 1;
            continue;
        }

        candidates.push(RawCandidate {
            source_key: poster.id.clone(),
            suggested_id: poster.id,
            extracted_text: None,
            image_path: None,
            fields: Some(PosterFieldsDraft {
                title: poster.title,
                authors: poster.authors,
                tags: poster.tags,
                abstract_text: poster.abstract_text,
                source: SourceTag::JsonImport,
            }),
            display_image_ref: Some(poster.display_image_ref),
            contact_email: poster.contact_email.filter(|email| !email.trim().is_empty()),
            source_file: source_file.clone(),
            source_sha256: Some(source_sha256.clone()),
        });
    }

    info!(path = %path.display(), imported = candidates.len(), skipped, "loaded json posters");
    Ok((candidates, skipped))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

pub fn collect_tool_versions() -> ToolVersions {
    ToolVersions {
        pdftoppm: command_version_optional("pdftoppm", &["-v"]),
        pdftotext: command_version_optional("pdftotext", &["-v"]),
    }
}

fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    // Poppler tools print their version banner to stderr.
    let banner = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr)
    } else {
        String::from_utf8_lossy(&output.stdout)
    };

    banner.lines().next().map(|line| line.trim().to_string())
}
