use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::model::{OverrideEntry, PosterFieldsDraft};

pub type OverrideMap = BTreeMap<String, OverrideEntry>;

/// Loads the human-edited override file. A missing file is an empty map,
/// a present-but-unparsable file is an error (a silently dropped correction
/// is worse than a failed run).
pub fn load(path: &Path) -> Result<OverrideMap> {
    if !path.exists() {
        return Ok(OverrideMap::new());
    }

    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let overrides: OverrideMap = serde_yaml::from_slice(&raw)
        .with_context(|| format!("failed to parse overrides: {}", path.display()))?;

    info!(path = %path.display(), entries = overrides.len(), "loaded overrides");
    Ok(overrides)
}

/// Applies the override entry for `source_key`, if any. Matching is exact
/// and case-sensitive; each present override field replaces the drafted
/// value wholesale. A bare string entry overrides the title only.
pub fn apply(
    mut draft: PosterFieldsDraft,
    overrides: &OverrideMap,
    source_key: &str,
) -> PosterFieldsDraft {
    let Some(entry) = overrides.get(source_key) else {
        return draft;
    };

    match entry {
        OverrideEntry::Title(title) => {
            draft.title = title.clone();
        }
        OverrideEntry::Fields(fields) => {
            if let Some(title) = &fields.title {
                draft.title = title.clone();
            }
            if let Some(authors) = &fields.authors {
                draft.authors = authors.clone();
            }
            if let Some(tags) = &fields.tags {
                draft.tags = tags.clone();
            }
            if let Some(abstract_text) = &fields.abstract_text {
                draft.abstract_text = abstract_text.clone();
            }
        }
    }

    info!(source_key, "applied override");
    draft
}
