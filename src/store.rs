use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::model::{Catalog, FlatPoster};
use crate::util::ensure_directory;

#[derive(Debug)]
pub struct WriteResult {
    pub posters_written: usize,
    pub primary_path: PathBuf,
    pub flat_path: PathBuf,
}

/// Loads the primary catalog, normalizing a bare JSON array (legacy layout)
/// into the structured form. A missing file yields an empty catalog.
pub fn load_catalog(path: &Path, now: &str) -> Result<Catalog> {
    if !path.exists() {
        info!(path = %path.display(), "no existing catalog, starting fresh");
        return Ok(Catalog::empty(now));
    }

    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

    match serde_json::from_slice::<Catalog>(&raw) {
        Ok(catalog) => Ok(catalog),
        Err(structured_err) => {
            let posters = serde_json::from_slice(&raw).map_err(|_| structured_err).with_context(
                || format!("failed to parse catalog: {}", path.display()),
            )?;
            Ok(Catalog {
                schema_version: Catalog::SCHEMA_VERSION.to_string(),
                last_updated: now.to_string(),
                posters,
            })
        }
    }
}

/// Persists the catalog to both stores, committing either both or neither.
///
/// Each target is written to a temp file in its own directory and renamed
/// into place. If the flat write fails after the primary rename, the primary
/// is restored to its prior bytes (or removed when it did not exist before).
pub fn write_catalog(catalog: &Catalog, primary_path: &Path, flat_path: &Path) -> Result<WriteResult> {
    let flat: Vec<FlatPoster> = catalog.posters.iter().map(FlatPoster::from).collect();

    let primary_bytes = to_json_bytes(catalog, primary_path)?;
    let flat_bytes = to_json_bytes(&flat, flat_path)?;

    let prior_primary = if primary_path.exists() {
        Some(
            fs::read(primary_path)
                .with_context(|| format!("failed to snapshot {}", primary_path.display()))?,
        )
    } else {
        None
    };

    commit_file(primary_path, &primary_bytes)?;

    if let Err(flat_err) = commit_file(flat_path, &flat_bytes) {
        warn!(path = %flat_path.display(), "flat store write failed, rolling back primary");
        rollback_primary(primary_path, prior_primary.as_deref())?;
        return Err(flat_err.context("flat store write failed, primary rolled back"));
    }

    info!(path = %primary_path.display(), posters = catalog.posters.len(), "wrote primary catalog");
    info!(path = %flat_path.display(), "wrote flat catalog");

    Ok(WriteResult {
        posters_written: catalog.posters.len(),
        primary_path: primary_path.to_path_buf(),
        flat_path: flat_path.to_path_buf(),
    })
}

fn to_json_bytes<T: serde::Serialize>(value: &T, path: &Path) -> Result<Vec<u8>> {
    let mut data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;
    data.push(b'\n');
    Ok(data)
}

fn rollback_primary(primary_path: &Path, prior: Option<&[u8]>) -> Result<()> {
    match prior {
        Some(bytes) => commit_file(primary_path, bytes)
            .with_context(|| format!("failed to restore {}", primary_path.display())),
        None => {
            fs::remove_file(primary_path)
                .with_context(|| format!("failed to remove {}", primary_path.display()))?;
            Ok(())
        }
    }
}

/// Writes `data` to a sibling temp file and renames it over `path`.
fn commit_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    let temp = TempWrite::create(path, data)?;
    temp.commit()
}

/// Scoped temp-file acquisition: the temp file is removed on every failure
/// path, including early returns between create and commit.
struct TempWrite {
    temp_path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl TempWrite {
    fn create(target: &Path, data: &[u8]) -> Result<Self> {
        let temp_path = sibling_temp_path(target);
        let guard = Self {
            temp_path: temp_path.clone(),
            target: target.to_path_buf(),
            committed: false,
        };

        let mut file = File::create(&temp_path)
            .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("failed to write temp file: {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync temp file: {}", temp_path.display()))?;

        Ok(guard)
    }

    fn commit(mut self) -> Result<()> {
        fs::rename(&self.temp_path, &self.target).with_context(|| {
            format!(
                "failed to rename {} -> {}",
                self.temp_path.display(),
                self.target.display()
            )
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TempWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

fn sibling_temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("catalog.json");
    target.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PosterMetadata, PosterRecord, SourceTag};

    fn sample_record(id: &str) -> PosterRecord {
        PosterRecord {
            id: id.to_string(),
            title: format!("Poster {id}"),
            authors: vec!["Ada Lovelace".to_string()],
            tags: vec!["machine-learning".to_string()],
            abstract_text: "A short abstract.".to_string(),
            display_image_ref: format!("assets/{id}.png"),
            faq: Vec::new(),
            room: None,
            booth_id: None,
            contact_email: None,
            related_links: Vec::new(),
            metadata: PosterMetadata {
                created_at: "2026-08-30T00:00:00Z".to_string(),
                updated_at: "2026-08-30T00:00:00Z".to_string(),
                source: SourceTag::PdfExtract,
                source_file: None,
                source_sha256: None,
            },
        }
    }

    fn sample_catalog() -> Catalog {
        Catalog {
            schema_version: Catalog::SCHEMA_VERSION.to_string(),
            last_updated: "2026-08-30T00:00:00Z".to_string(),
            posters: vec![sample_record("poster_001")],
        }
    }

    #[test]
    fn write_commits_both_stores() {
        let dir = tempfile::tempdir().expect("tempdir");
        let primary = dir.path().join("posters.json");
        let flat = dir.path().join("data").join("posters.json");

        let result = write_catalog(&sample_catalog(), &primary, &flat).expect("write");
        assert_eq!(result.posters_written, 1);

        let reloaded = load_catalog(&primary, "2026-08-30T00:00:00Z").expect("reload");
        assert_eq!(reloaded.posters.len(), 1);

        let flat_raw = fs::read_to_string(&flat).expect("flat read");
        let flat_posters: Vec<FlatPoster> = serde_json::from_str(&flat_raw).expect("flat parse");
        assert_eq!(flat_posters[0].id, "poster_001");
        // No provenance in the flat store.
        assert!(!flat_raw.contains("created_at"));
    }

    #[test]
    fn flat_failure_rolls_back_existing_primary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let primary = dir.path().join("posters.json");
        fs::write(&primary, b"{\"prior\": true}").expect("seed primary");

        // Making flat_path's parent a regular file forces the flat write to
        // fail after the primary rename succeeded.
        let blocker = dir.path().join("data");
        fs::write(&blocker, b"not a directory").expect("blocker");
        let flat = blocker.join("posters.json");

        let err = write_catalog(&sample_catalog(), &primary, &flat);
        assert!(err.is_err());

        let primary_after = fs::read(&primary).expect("primary read");
        assert_eq!(primary_after, b"{\"prior\": true}");
    }

    #[test]
    fn flat_failure_removes_freshly_created_primary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let primary = dir.path().join("posters.json");

        let blocker = dir.path().join("data");
        fs::write(&blocker, b"not a directory").expect("blocker");
        let flat = blocker.join("posters.json");

        let err = write_catalog(&sample_catalog(), &primary, &flat);
        assert!(err.is_err());
        assert!(!primary.exists());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let primary = dir.path().join("posters.json");
        let flat = dir.path().join("flat.json");

        write_catalog(&sample_catalog(), &primary, &flat).expect("write");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn load_normalizes_bare_array() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("posters.json");
        let posters = vec![sample_record("poster_007")];
        fs::write(&path, serde_json::to_vec(&posters).expect("serialize")).expect("seed");

        let catalog = load_catalog(&path, "2026-08-30T00:00:00Z").expect("load");
        assert_eq!(catalog.schema_version, Catalog::SCHEMA_VERSION);
        assert_eq!(catalog.posters.len(), 1);
        assert_eq!(catalog.posters[0].id, "poster_007");
    }
}
