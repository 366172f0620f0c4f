use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{Catalog, FlatPoster};

/// Read-only snapshot of the two stores and the rendered-image directory.
pub fn run(args: StatusArgs) -> Result<()> {
    if args.catalog_path.exists() {
        let raw = fs::read(&args.catalog_path)
            .with_context(|| format!("failed to read {}", args.catalog_path.display()))?;
        let catalog: Catalog = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", args.catalog_path.display()))?;

        info!(
            path = %args.catalog_path.display(),
            schema_version = %catalog.schema_version,
            last_updated = %catalog.last_updated,
            posters = catalog.posters.len(),
            "primary catalog"
        );
    } else {
        warn!(path = %args.catalog_path.display(), "primary catalog missing");
    }

    if args.flat_path.exists() {
        let raw = fs::read(&args.flat_path)
            .with_context(|| format!("failed to read {}", args.flat_path.display()))?;
        let flat: Vec<FlatPoster> = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", args.flat_path.display()))?;

        info!(path = %args.flat_path.display(), posters = flat.len(), "flat catalog");
    } else {
        warn!(path = %args.flat_path.display(), "flat catalog missing");
    }

    if args.image_dir.is_dir() {
        let image_count = fs::read_dir(&args.image_dir)
            .with_context(|| format!("failed to read {}", args.image_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("png") || ext.eq_ignore_ascii_case("jpg"))
                    .unwrap_or(false)
            })
            .count();

        info!(path = %args.image_dir.display(), images = image_count, "image directory");
    } else {
        warn!(path = %args.image_dir.display(), "image directory missing");
    }

    Ok(())
}
