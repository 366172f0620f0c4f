use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::cli::ImportMode;
use crate::model::{
    Catalog, MergeOutcome, MergeResult, PosterFieldsDraft, PosterMetadata, PosterRecord,
    RawCandidate,
};

use super::sources::SourceItem;

pub fn format_poster_id(sequence: u32) -> String {
    format!("poster_{sequence:03}")
}

/// Assigns an id to every discovered source file, as a pure function over
/// the existing catalog.
///
/// A source file whose key matches an existing record's `source_file`
/// reuses that record's id, which is what makes re-importing the same
/// directory idempotent. Everything else gets the next free sequential id
/// at or after `start_id`, skipping ids already taken.
pub fn plan_ids(existing: &Catalog, items: &[SourceItem], start_id: u32) -> Vec<String> {
    let by_source_file: HashMap<&str, &str> = existing
        .posters
        .iter()
        .filter_map(|record| {
            record
                .metadata
                .source_file
                .as_deref()
                .map(|file| (file_stem(file), record.id.as_str()))
        })
        .collect();

    let mut taken: HashSet<String> = existing
        .posters
        .iter()
        .map(|record| record.id.clone())
        .collect();

    let mut next_sequence = start_id.max(1);
    let mut assigned = Vec::with_capacity(items.len());

    for item in items {
        if let Some(id) = by_source_file.get(item.source_key.as_str()) {
            assigned.push((*id).to_string());
            continue;
        }

        let mut candidate = format_poster_id(next_sequence);
        while taken.contains(&candidate) {
            next_sequence += 1;
            candidate = format_poster_id(next_sequence);
        }

        taken.insert(candidate.clone());
        next_sequence += 1;
        assigned.push(candidate);
    }

    assigned
}

fn file_stem(filename: &str) -> &str {
    filename.rsplit_once('.').map_or(filename, |(stem, _)| stem)
}

/// Assembles the incoming record for one candidate. Curated fields start
/// empty; the merge step preserves any existing curated content.
pub fn build_record(candidate: &RawCandidate, draft: PosterFieldsDraft, now: &str) -> PosterRecord {
    PosterRecord {
        id: candidate.suggested_id.clone(),
        title: draft.title,
        authors: draft.authors,
        tags: draft.tags,
        abstract_text: draft.abstract_text,
        display_image_ref: candidate.display_image_ref.clone().unwrap_or_default(),
        faq: Vec::new(),
        room: None,
        booth_id: None,
        contact_email: candidate.contact_email.clone(),
        related_links: Vec::new(),
        metadata: PosterMetadata {
            created_at: now.to_string(),
            updated_at: now.to_string(),
            source: draft.source,
            source_file: candidate.source_file.clone(),
            source_sha256: candidate.source_sha256.clone(),
        },
    }
}

/// Combines the incoming batch with the existing catalog.
///
/// In merge mode only the machine-derived fields of a matching record are
/// replaced; curated fields and `created_at` survive, and records absent
/// from the batch are retained verbatim. Replace mode keeps exactly the
/// incoming batch and is intentionally destructive.
pub fn merge_catalogs(
    existing: Catalog,
    mut incoming: Vec<PosterRecord>,
    mode: ImportMode,
    now: &str,
) -> (Catalog, Vec<MergeResult>) {
    // Deterministic processing order regardless of source listing quirks.
    incoming.sort_by(|a, b| a.id.cmp(&b.id));

    let mut results = Vec::with_capacity(incoming.len() + existing.posters.len());
    let mut posters: Vec<PosterRecord>;

    match mode {
        ImportMode::Replace => {
            warn!(
                dropped = existing
                    .posters
                    .iter()
                    .filter(|record| !incoming.iter().any(|new| new.id == record.id))
                    .count(),
                "replace mode: existing records not in this batch are discarded"
            );

            for record in &incoming {
                results.push(MergeResult {
                    id: record.id.clone(),
                    outcome: MergeOutcome::Created,
                });
            }
            posters = incoming;
        }
        ImportMode::Merge => {
            let mut existing_by_id: HashMap<String, PosterRecord> = existing
                .posters
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect();

            posters = Vec::with_capacity(incoming.len() + existing_by_id.len());

            for new_record in incoming {
                match existing_by_id.remove(&new_record.id) {
                    Some(previous) => {
                        let outcome = if previous.machine_fields_eq(&new_record) {
                            MergeOutcome::Unchanged
                        } else {
                            MergeOutcome::Updated
                        };

                        results.push(MergeResult {
                            id: new_record.id.clone(),
                            outcome,
                        });
                        posters.push(merge_record(previous, new_record, now));
                    }
                    None => {
                        info!(id = %new_record.id, title = %new_record.title, "new poster");
                        results.push(MergeResult {
                            id: new_record.id.clone(),
                            outcome: MergeOutcome::Created,
                        });
                        posters.push(new_record);
                    }
                }
            }

            let mut retained: Vec<PosterRecord> = existing_by_id.into_values().collect();
            retained.sort_by(|a, b| a.id.cmp(&b.id));
            for record in retained {
                results.push(MergeResult {
                    id: record.id.clone(),
                    outcome: MergeOutcome::Retained,
                });
                posters.push(record);
            }
        }
    }

    posters.sort_by(|a, b| a.id.cmp(&b.id));

    let catalog = Catalog {
        schema_version: Catalog::SCHEMA_VERSION.to_string(),
        last_updated: now.to_string(),
        posters,
    };

    (catalog, results)
}

/// Overwrites machine-derived fields and provenance, keeps everything a
/// human may have edited, and advances `updated_at`.
fn merge_record(previous: PosterRecord, new_record: PosterRecord, now: &str) -> PosterRecord {
    PosterRecord {
        id: previous.id,
        title: new_record.title,
        authors: new_record.authors,
        tags: new_record.tags,
        abstract_text: new_record.abstract_text,
        display_image_ref: new_record.display_image_ref,
        faq: previous.faq,
        room: previous.room,
        booth_id: previous.booth_id,
        contact_email: previous.contact_email,
        related_links: previous.related_links,
        metadata: PosterMetadata {
            created_at: previous.metadata.created_at,
            updated_at: now.to_string(),
            source: new_record.metadata.source,
            source_file: new_record.metadata.source_file,
            source_sha256: new_record.metadata.source_sha256,
        },
    }
}
