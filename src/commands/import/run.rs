use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::{ImportArgs, SourceKind};
use crate::commands::validate::validate_catalog;
use crate::model::{
    ImportCounts, ImportPaths, ImportRunManifest, MergeOutcome, MergeResult, PosterRecord,
    RawCandidate, ValidationReport,
};
use crate::store::{load_catalog, write_catalog};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use super::extract::{
    OllamaVision, TextParser, VisionBackend, extract_fields, vision_endpoint_available,
};
use super::{merge, overrides, sources};

const DEFAULT_OVERRIDES_PATH: &str = "data-prep/poster_overrides.yaml";

pub fn run(args: ImportArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("import-{}", utc_compact_string(started_ts));

    info!(
        source = %args.source_path.display(),
        kind = args.source.as_str(),
        mode = args.mode.as_str(),
        run_id = %run_id,
        "starting import"
    );

    if !args.source_path.exists() {
        bail!("source path not found: {}", args.source_path.display());
    }

    let existing = load_catalog(&args.catalog_path, &started_at)?;
    info!(
        path = %args.catalog_path.display(),
        posters = existing.posters.len(),
        "loaded existing catalog"
    );

    let override_map = load_override_map(args.overrides.as_deref())?;
    let vision = build_vision_backend(&args)?;
    let parser = TextParser::new()?;

    let mut counts = ImportCounts::default();
    let mut warnings = Vec::new();
    let mut incoming: Vec<PosterRecord> = Vec::new();

    match args.source {
        SourceKind::Pdf | SourceKind::Image => {
            let items = sources::discover(args.source, &args.source_path)?;
            if items.is_empty() {
                bail!(
                    "no {} files found in {}",
                    args.source.as_str(),
                    args.source_path.display()
                );
            }
            counts.source_items = items.len();

            let ids = merge::plan_ids(&existing, &items, args.start_id);
            ensure_directory(&args.image_dir)?;

            for (item, poster_id) in items.iter().zip(&ids) {
                let candidate =
                    match sources::realize(args.source, item, poster_id, &args.image_dir, args.dpi)
                    {
                        Ok(candidate) => candidate,
                        Err(err) => {
                            warn!(
                                source = %item.path.display(),
                                error = %err,
                                "skipping source file"
                            );
                            warnings.push(format!("skipped {}: {err:#}", item.path.display()));
                            counts.skipped += 1;
                            continue;
                        }
                    };

                let (draft, fell_back) =
                    extract_fields(&candidate, vision.as_deref(), &parser);
                if fell_back {
                    counts.vision_fallbacks += 1;
                    warnings.push(format!(
                        "vision extraction fell back to text parsing for {}",
                        candidate.source_key
                    ));
                }

                let draft = overrides::apply(draft, &override_map, &candidate.source_key);
                incoming.push(merge::build_record(&candidate, draft, &started_at));
                counts.candidates += 1;
            }
        }
        SourceKind::Csv | SourceKind::Json => {
            let (candidates, skipped) = match args.source {
                SourceKind::Csv => sources::load_csv(&args.source_path)?,
                _ => sources::load_json(&args.source_path)?,
            };
            counts.source_items = candidates.len() + skipped;
            counts.skipped = skipped;

            for candidate in candidates {
                let draft = prefilled_draft(&candidate)?;
                let draft = overrides::apply(draft, &override_map, &candidate.source_key);
                incoming.push(merge::build_record(&candidate, draft, &started_at));
                counts.candidates += 1;
            }
        }
    }

    if incoming.is_empty() {
        bail!("no posters imported from {}", args.source_path.display());
    }

    let (catalog, results) = merge::merge_catalogs(existing, incoming, args.mode, &started_at);
    tally_outcomes(&mut counts, &results);
    counts.posters_total = catalog.posters.len();

    let report = validate_catalog(&catalog, Path::new("."));
    for finding in &report.findings {
        for error in &finding.errors {
            warn!(id = %finding.id, error = %error, "validation finding");
        }
    }

    let manifest_dir = resolve_manifest_dir(&args);
    let manifest_path = manifest_dir.join(format!(
        "import_run_{}.json",
        utc_compact_string(started_ts)
    ));

    if !report.is_empty() && !args.ignore_validation {
        write_manifest(
            &manifest_path,
            &args,
            &run_id,
            &started_at,
            "validation_failed",
            counts,
            results,
            report.clone(),
            warnings,
        )?;
        bail!(
            "validation failed with {} finding(s); no catalog files were written (see {})",
            report.error_count(),
            manifest_path.display()
        );
    }

    if !report.is_empty() {
        warn!(
            findings = report.error_count(),
            "committing despite validation findings (--ignore-validation)"
        );
    }

    write_catalog(&catalog, &args.catalog_path, &args.flat_path)?;

    write_manifest(
        &manifest_path,
        &args,
        &run_id,
        &started_at,
        "completed",
        counts.clone(),
        results,
        report,
        warnings,
    )?;

    info!(
        created = counts.created,
        updated = counts.updated,
        unchanged = counts.unchanged,
        retained = counts.retained,
        skipped = counts.skipped,
        vision_fallbacks = counts.vision_fallbacks,
        posters_total = counts.posters_total,
        manifest = %manifest_path.display(),
        "import completed"
    );

    Ok(())
}

fn load_override_map(explicit: Option<&Path>) -> Result<overrides::OverrideMap> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("overrides file not found: {}", path.display());
            }
            overrides::load(path)
        }
        None => overrides::load(Path::new(DEFAULT_OVERRIDES_PATH)),
    }
}

fn build_vision_backend(args: &ImportArgs) -> Result<Option<Box<dyn VisionBackend>>> {
    if !args.use_vision {
        return Ok(None);
    }

    if !vision_endpoint_available(&args.ollama_url) {
        bail!(
            "--use-vision requires a reachable Ollama endpoint at {}; \
             start it with `ollama serve` and pull a vision-capable model \
             (e.g. `ollama pull {}`)",
            args.ollama_url,
            args.vision_model
        );
    }

    info!(model = %args.vision_model, url = %args.ollama_url, "vision extraction enabled");
    Ok(Some(Box::new(OllamaVision::new(
        &args.ollama_url,
        &args.vision_model,
        args.vision_timeout_secs,
    ))))
}

/// CSV/JSON candidates arrive with their fields already structured.
fn prefilled_draft(candidate: &RawCandidate) -> Result<crate::model::PosterFieldsDraft> {
    match &candidate.fields {
        Some(fields) => Ok(fields.clone()),
        None => bail!(
            "candidate {} has no prefilled fields",
            candidate.source_key
        ),
    }
}

fn tally_outcomes(counts: &mut ImportCounts, results: &[MergeResult]) {
    for result in results {
        match result.outcome {
            MergeOutcome::Created => counts.created += 1,
            MergeOutcome::Updated => counts.updated += 1,
            MergeOutcome::Unchanged => counts.unchanged += 1,
            MergeOutcome::Retained => counts.retained += 1,
        }
    }
}

fn resolve_manifest_dir(args: &ImportArgs) -> PathBuf {
    args.manifest_dir.clone().unwrap_or_else(|| {
        args.catalog_path
            .parent()
            .map(|parent| parent.join("manifests"))
            .unwrap_or_else(|| PathBuf::from("manifests"))
    })
}

#[allow(clippy::too_many_arguments)]
fn write_manifest(
    path: &Path,
    args: &ImportArgs,
    run_id: &str,
    started_at: &str,
    status: &str,
    counts: ImportCounts,
    results: Vec<MergeResult>,
    validation: ValidationReport,
    warnings: Vec<String>,
) -> Result<()> {
    let manifest = ImportRunManifest {
        manifest_version: 1,
        run_id: run_id.to_string(),
        status: status.to_string(),
        started_at: started_at.to_string(),
        updated_at: now_utc_string(),
        mode: args.mode.as_str().to_string(),
        source_kind: args.source.as_str().to_string(),
        use_vision: args.use_vision,
        tool_versions: sources::collect_tool_versions(),
        paths: ImportPaths {
            source_path: args.source_path.display().to_string(),
            catalog_path: args.catalog_path.display().to_string(),
            flat_path: args.flat_path.display().to_string(),
            image_dir: args.image_dir.display().to_string(),
        },
        counts,
        results,
        validation,
        warnings,
    };

    write_json_pretty(path, &manifest)?;
    Ok(())
}
