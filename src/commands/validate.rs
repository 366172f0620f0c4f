use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};

use crate::cli::ValidateArgs;
use crate::model::{Catalog, FlatPoster, RecordFindings, ValidationReport};
use crate::store::load_catalog;
use crate::util::now_utc_string;

/// Read-only check of the existing stores. Never mutates any file; exits
/// non-zero (via the returned error) when the report is non-empty.
pub fn run(args: ValidateArgs) -> Result<()> {
    if !args.catalog_path.exists() {
        bail!("catalog not found: {}", args.catalog_path.display());
    }

    let catalog = load_catalog(&args.catalog_path, &now_utc_string())?;
    info!(
        path = %args.catalog_path.display(),
        posters = catalog.posters.len(),
        "loaded primary catalog"
    );

    let report = validate_catalog(&catalog, &args.image_root);
    log_report(&report);

    let mut sync_errors = check_flat_sync(&catalog, &args.flat_path)?;

    if report.is_empty() && sync_errors.is_empty() {
        info!(posters = catalog.posters.len(), "validation passed");
        return Ok(());
    }

    let sync_error_count = sync_errors.len();
    for message in sync_errors.drain(..) {
        error!(error = %message, "store sync violation");
    }

    bail!(
        "validation failed: {} record finding(s), {} store sync violation(s)",
        report.error_count(),
        sync_error_count
    );
}

/// Checks every record and collects all violations; never fails fast.
/// Empty `authors`/`tags` are tolerated since the extractor backfills
/// defaults; empty required strings and missing images are not.
pub fn validate_catalog(catalog: &Catalog, image_root: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen_ids: HashSet<&str> = HashSet::new();

    for record in &catalog.posters {
        let mut errors = Vec::new();

        if record.id.trim().is_empty() {
            errors.push("id is empty".to_string());
        } else if !seen_ids.insert(record.id.as_str()) {
            errors.push(format!("duplicate id: {}", record.id));
        }

        if record.title.trim().is_empty() {
            errors.push("title is empty".to_string());
        }

        if record.abstract_text.trim().is_empty() {
            errors.push("abstract is empty".to_string());
        }

        if record.display_image_ref.trim().is_empty() {
            errors.push("display_image_ref is empty".to_string());
        } else {
            let image_path = resolve_image_path(image_root, &record.display_image_ref);
            if !image_path.is_file() {
                errors.push(format!(
                    "display image not found: {}",
                    image_path.display()
                ));
            }
        }

        if !errors.is_empty() {
            report.findings.push(RecordFindings {
                id: if record.id.is_empty() {
                    "<missing id>".to_string()
                } else {
                    record.id.clone()
                },
                errors,
            });
        }
    }

    report
}

fn resolve_image_path(image_root: &Path, reference: &str) -> std::path::PathBuf {
    let reference = Path::new(reference);
    if reference.is_absolute() {
        reference.to_path_buf()
    } else {
        image_root.join(reference)
    }
}

/// Cross-checks the flat store against the primary: it must exist, parse,
/// and carry exactly the primary's ids.
fn check_flat_sync(catalog: &Catalog, flat_path: &Path) -> Result<Vec<String>> {
    let mut errors = Vec::new();

    if !flat_path.exists() {
        errors.push(format!("flat store missing: {}", flat_path.display()));
        return Ok(errors);
    }

    let raw = fs::read(flat_path)
        .with_context(|| format!("failed to read {}", flat_path.display()))?;
    let flat: Vec<FlatPoster> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", flat_path.display()))?;

    let primary_ids: HashSet<&str> = catalog.posters.iter().map(|p| p.id.as_str()).collect();
    let flat_ids: HashSet<&str> = flat.iter().map(|p| p.id.as_str()).collect();

    for id in primary_ids.difference(&flat_ids) {
        errors.push(format!("{id} present in primary but missing from flat store"));
    }
    for id in flat_ids.difference(&primary_ids) {
        errors.push(format!("{id} present in flat store but missing from primary"));
    }

    if errors.is_empty() {
        info!(path = %flat_path.display(), posters = flat.len(), "flat store in sync");
    }

    Ok(errors)
}

fn log_report(report: &ValidationReport) {
    for finding in &report.findings {
        for message in &finding.errors {
            warn!(id = %finding.id, error = %message, "validation finding");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PosterMetadata, PosterRecord, SourceTag};
    use std::fs;

    fn record(id: &str, abstract_text: &str, image_ref: &str) -> PosterRecord {
        PosterRecord {
            id: id.to_string(),
            title: format!("Title {id}"),
            authors: Vec::new(),
            tags: Vec::new(),
            abstract_text: abstract_text.to_string(),
            display_image_ref: image_ref.to_string(),
            faq: Vec::new(),
            room: None,
            booth_id: None,
            contact_email: None,
            related_links: Vec::new(),
            metadata: PosterMetadata {
                created_at: "2026-08-30T00:00:00Z".to_string(),
                updated_at: "2026-08-30T00:00:00Z".to_string(),
                source: SourceTag::Manual,
                source_file: None,
                source_sha256: None,
            },
        }
    }

    fn catalog_with(posters: Vec<PosterRecord>) -> Catalog {
        Catalog {
            schema_version: Catalog::SCHEMA_VERSION.to_string(),
            last_updated: "2026-08-30T00:00:00Z".to_string(),
            posters,
        }
    }

    #[test]
    fn collects_all_violations_without_failing_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good_image = dir.path().join("poster_001.png");
        fs::write(&good_image, b"png").expect("image");

        let catalog = catalog_with(vec![
            record("poster_001", "", "poster_001.png"),
            record("poster_002", "Fine abstract.", "poster_999.png"),
        ]);

        let report = validate_catalog(&catalog, dir.path());
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.findings[0].id, "poster_001");
        assert!(report.findings[0].errors[0].contains("abstract"));
        assert_eq!(report.findings[1].id, "poster_002");
        assert!(report.findings[1].errors[0].contains("not found"));
    }

    #[test]
    fn flags_duplicate_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = dir.path().join("p.png");
        fs::write(&image, b"png").expect("image");

        let catalog = catalog_with(vec![
            record("poster_001", "Abstract.", "p.png"),
            record("poster_001", "Abstract.", "p.png"),
        ]);

        let report = validate_catalog(&catalog, dir.path());
        assert_eq!(report.findings.len(), 1);
        assert!(report.findings[0].errors[0].contains("duplicate id"));
    }

    #[test]
    fn clean_catalog_yields_empty_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = dir.path().join("poster_001.png");
        fs::write(&image, b"png").expect("image");

        let catalog = catalog_with(vec![record("poster_001", "Abstract.", "poster_001.png")]);
        let report = validate_catalog(&catalog, dir.path());
        assert!(report.is_empty());
        assert_eq!(report.error_count(), 0);
    }

    #[test]
    fn absolute_image_refs_bypass_image_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = dir.path().join("abs.png");
        fs::write(&image, b"png").expect("image");

        let catalog = catalog_with(vec![record(
            "poster_001",
            "Abstract.",
            image.to_str().expect("utf8 path"),
        )]);

        let report = validate_catalog(&catalog, Path::new("/nonexistent-root"));
        assert!(report.is_empty());
    }

    #[test]
    fn flat_sync_reports_missing_and_extra_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flat_path = dir.path().join("flat.json");
        let flat = vec![FlatPoster {
            id: "poster_009".to_string(),
            title: "T".to_string(),
            authors: Vec::new(),
            tags: Vec::new(),
            abstract_text: "A".to_string(),
            display_image_ref: "x.png".to_string(),
        }];
        fs::write(&flat_path, serde_json::to_vec(&flat).expect("serialize")).expect("seed");

        let catalog = catalog_with(vec![record("poster_001", "Abstract.", "x.png")]);
        let errors = check_flat_sync(&catalog, &flat_path).expect("sync check");
        assert_eq!(errors.len(), 2);
    }
}
