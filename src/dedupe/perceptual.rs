//! Perceptual duplicate grouping: transitive closure of "Hamming distance
//! within threshold" over 64-bit perceptual hashes, with candidate pairs
//! from either brute force or the LSH index.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::{AHashMap, AHashSet};
use tracing::{debug, info, warn};

use crate::config::{LshMode, LSH_AUTO_THRESHOLD, LSH_TUNED_MAX_DISTANCE};
use crate::dedupe::hamming;
use crate::dedupe::lsh::HammingLsh;
use crate::dedupe::union_find::UnionFind;
use crate::model::{DuplicateGroup, GroupKind, ImageRecord};
use crate::quality::cmp_quality;

/// How often the candidate loops poll the cancel token.
const CANCEL_CHECK_INTERVAL: usize = 1024;

pub struct PerceptualOutcome {
    pub groups: Vec<DuplicateGroup>,
    /// Whether the LSH index was actually used for candidate enumeration.
    pub lsh_used: bool,
    /// True when cancellation interrupted the stage; `groups` is empty.
    pub cancelled: bool,
}

/// Group perceptually similar records.
///
/// Records without a perceptual hash and records whose path is in
/// `exclude` (already bound into an exact group) are filtered out first.
/// Group ids are dense starting at `start_id`, assigned in order of
/// smallest member path; callers pass records sorted by path.
pub fn find_perceptual_groups(
    records: &[ImageRecord],
    threshold: u32,
    exclude: &AHashSet<PathBuf>,
    lsh_mode: LshMode,
    start_id: u32,
    cancel: &AtomicBool,
) -> PerceptualOutcome {
    let mut candidates: Vec<&ImageRecord> = Vec::new();
    let mut hashes: Vec<u64> = Vec::new();
    for record in records {
        if let Some(hash) = record.perceptual_hash {
            if !exclude.contains(&record.path) {
                candidates.push(record);
                hashes.push(hash);
            }
        }
    }
    let n = candidates.len();

    if n < 2 {
        return PerceptualOutcome {
            groups: Vec::new(),
            lsh_used: false,
            cancelled: false,
        };
    }

    let use_lsh = match lsh_mode {
        LshMode::ForceOn => true,
        LshMode::ForceOff => false,
        LshMode::Auto => n >= LSH_AUTO_THRESHOLD,
    };
    if use_lsh && threshold > LSH_TUNED_MAX_DISTANCE {
        warn!(
            "LSH parameters are tuned for distances up to {}; threshold {} may lose recall",
            LSH_TUNED_MAX_DISTANCE, threshold
        );
    }

    let mut uf = UnionFind::new(n);
    let completed = if use_lsh {
        info!("Perceptual grouping over {} hashes via LSH", n);
        match_candidates_lsh(&hashes, threshold, &mut uf, cancel)
    } else {
        debug!("Perceptual grouping over {} hashes via brute force", n);
        match_candidates_bruteforce(&hashes, threshold, &mut uf, cancel)
    };

    if !completed {
        return PerceptualOutcome {
            groups: Vec::new(),
            lsh_used: use_lsh,
            cancelled: true,
        };
    }

    PerceptualOutcome {
        groups: collect_groups(&candidates, &mut uf, start_id),
        lsh_used: use_lsh,
        cancelled: false,
    }
}

/// All C(n,2) pairs. Returns false if cancelled mid-way.
fn match_candidates_bruteforce(
    hashes: &[u64],
    threshold: u32,
    uf: &mut UnionFind,
    cancel: &AtomicBool,
) -> bool {
    let n = hashes.len();
    let mut tested = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            if hamming(hashes[i], hashes[j]) <= threshold {
                uf.union(i as u32, j as u32);
            }
            tested += 1;
            if tested % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return false;
            }
        }
    }
    true
}

/// LSH-pruned pairs: each unordered pair is tested at most once (`j > i`),
/// and pairs already connected are skipped without a distance check.
fn match_candidates_lsh(
    hashes: &[u64],
    threshold: u32,
    uf: &mut UnionFind,
    cancel: &AtomicBool,
) -> bool {
    let index = HammingLsh::build_from(
        hashes.iter().enumerate().map(|(i, &h)| (i as u32, h)),
        hashes.len(),
    );

    let mut tested = 0usize;
    for i in 0..hashes.len() {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        for j in index.query(hashes[i]) {
            if j as usize <= i {
                continue;
            }
            if uf.same(i as u32, j) {
                continue;
            }
            if hamming(hashes[i], hashes[j as usize]) <= threshold {
                uf.union(i as u32, j);
            }
            tested += 1;
            if tested % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return false;
            }
        }
    }
    true
}

/// Equivalence classes of size two or more become groups, members ordered
/// best-first, ids assigned in first-seen (smallest member index) order.
fn collect_groups(
    candidates: &[&ImageRecord],
    uf: &mut UnionFind,
    start_id: u32,
) -> Vec<DuplicateGroup> {
    let mut slot_by_root: AHashMap<u32, usize> = AHashMap::new();
    let mut classes: Vec<Vec<usize>> = Vec::new();

    for idx in 0..candidates.len() {
        let root = uf.find(idx as u32);
        let slot = *slot_by_root.entry(root).or_insert_with(|| {
            classes.push(Vec::new());
            classes.len() - 1
        });
        classes[slot].push(idx);
    }

    let mut groups = Vec::new();
    let mut next_id = start_id;
    for class in classes {
        if class.len() < 2 {
            continue;
        }
        let mut members: Vec<ImageRecord> =
            class.iter().map(|&i| candidates[i].clone()).collect();
        members.sort_by(cmp_quality);
        groups.push(DuplicateGroup::new(next_id, GroupKind::Perceptual, members));
        next_id += 1;
    }

    debug!("Perceptual grouping: {} groups", groups.len());
    groups
}
