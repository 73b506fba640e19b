//! Exact duplicate grouping by content hash.

use std::path::PathBuf;

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::model::{DuplicateGroup, GroupKind, ImageRecord};
use crate::quality::cmp_quality;

pub struct ExactOutcome {
    pub groups: Vec<DuplicateGroup>,
    /// Paths bound into an exact group; the perceptual stage excludes them.
    pub member_paths: AHashSet<PathBuf>,
}

/// Partition records by SHA-256 content hash and emit one group per
/// partition of two or more members. Group ids are dense from 1, assigned
/// in order of smallest member path; callers pass records sorted by path,
/// which makes that the first-seen order.
pub fn find_exact_groups(records: &[ImageRecord]) -> ExactOutcome {
    let mut slot_by_hash: AHashMap<[u8; 32], usize> = AHashMap::new();
    let mut partitions: Vec<Vec<usize>> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let slot = *slot_by_hash.entry(record.content_hash).or_insert_with(|| {
            partitions.push(Vec::new());
            partitions.len() - 1
        });
        partitions[slot].push(idx);
    }

    let mut groups = Vec::new();
    let mut member_paths = AHashSet::new();
    let mut next_id = 1u32;

    for indices in partitions {
        if indices.len() < 2 {
            continue;
        }
        let mut members: Vec<ImageRecord> =
            indices.iter().map(|&i| records[i].clone()).collect();
        members.sort_by(cmp_quality);
        for member in &members {
            member_paths.insert(member.path.clone());
        }
        groups.push(DuplicateGroup::new(next_id, GroupKind::Exact, members));
        next_id += 1;
    }

    debug!(
        "Exact grouping: {} groups over {} records",
        groups.len(),
        records.len()
    );

    ExactOutcome {
        groups,
        member_paths,
    }
}
