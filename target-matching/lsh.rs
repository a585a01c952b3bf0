//! Multi-probe locality-sensitive hashing over binary descriptors.
//!
//! Every table hashes a descriptor to the concatenation of a fixed random subset
//! of its bits. Queries probe their own bucket and every bucket within
//! `multi_probe_level` flipped key bits, then rank the candidates by Hamming distance.

use std::collections::HashMap;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use target_core::{BinaryDescriptor, Correspondence};

use crate::brute_force::hamming_distance;

const DESCRIPTOR_BITS: usize = 256;

const LSH_SEED: u64 = 0x6c73_685f_7461_626c;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LshParams {
    pub tables: usize,
    /// Bits per hash key, at most 32
    pub key_size: usize,
    pub multi_probe_level: usize,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            tables: 12,
            key_size: 20,
            multi_probe_level: 2,
        }
    }
}

struct LshTable {
    bits: Vec<usize>,
    buckets: HashMap<u32, Vec<usize>>,
}

impl LshTable {
    fn key(&self, descriptor: &BinaryDescriptor) -> u32 {
        self.bits.iter().enumerate().fold(0u32, |key, (i, &bit)| {
            let set = (descriptor[bit / 8] >> (bit % 8)) & 1;
            key | ((set as u32) << i)
        })
    }
}

pub struct LshIndex<'a> {
    points: &'a [BinaryDescriptor],
    tables: Vec<LshTable>,
    probes: Vec<u32>,
}

impl<'a> LshIndex<'a> {
    pub fn build(points: &'a [BinaryDescriptor], params: LshParams) -> Self {
        Self::build_seeded(points, params, LSH_SEED)
    }

    pub fn build_seeded(points: &'a [BinaryDescriptor], params: LshParams, seed: u64) -> Self {
        let key_size = params.key_size.clamp(1, 32);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut all_bits: Vec<usize> = (0..DESCRIPTOR_BITS).collect();

        let tables = (0..params.tables)
            .map(|_| {
                all_bits.shuffle(&mut rng);
                let mut table = LshTable {
                    bits: all_bits[..key_size].to_vec(),
                    buckets: HashMap::new(),
                };
                for (idx, descriptor) in points.iter().enumerate() {
                    let key = table.key(descriptor);
                    table.buckets.entry(key).or_default().push(idx);
                }
                table
            })
            .collect();

        Self {
            points,
            tables,
            probes: probe_masks(key_size, params.multi_probe_level),
        }
    }

    pub fn n_tables(&self) -> usize {
        self.tables.len()
    }

    /// Number of buckets probed per table
    pub fn n_probes(&self) -> usize {
        self.probes.len()
    }

    /// Nearest candidate as (index, Hamming distance); `None` when no probed bucket is occupied
    pub fn nearest(&self, query: &BinaryDescriptor) -> Option<(usize, u32)> {
        let mut best: Option<(usize, u32)> = None;
        for table in &self.tables {
            let key = table.key(query);
            for &mask in &self.probes {
                let Some(bucket) = table.buckets.get(&(key ^ mask)) else {
                    continue;
                };
                for &idx in bucket {
                    let distance = hamming_distance(query, &self.points[idx]);
                    let better = match best {
                        None => true,
                        Some((best_idx, best_distance)) => {
                            distance < best_distance || (distance == best_distance && idx < best_idx)
                        }
                    };
                    if better {
                        best = Some((idx, distance));
                    }
                }
            }
        }
        best
    }
}

/// XOR masks with at most `level` bits set among the low `key_size` bits, fewest bits first
fn probe_masks(key_size: usize, level: usize) -> Vec<u32> {
    let mut masks = vec![0u32];
    let mut frontier = vec![(0u32, 0usize)];
    for _ in 0..level {
        let mut next = Vec::new();
        for &(mask, lowest_free) in &frontier {
            for bit in lowest_free..key_size {
                let m = mask | (1 << bit);
                masks.push(m);
                next.push((m, bit + 1));
            }
        }
        frontier = next;
    }
    masks
}

/// Approximate nearest scene descriptor per object descriptor; queries whose probes find nothing are skipped
pub fn match_lsh(query: &[BinaryDescriptor], train: &[BinaryDescriptor], params: LshParams) -> Vec<Correspondence> {
    if train.is_empty() {
        return Vec::new();
    }
    let index = LshIndex::build(train, params);

    query
        .par_iter()
        .enumerate()
        .filter_map(|(query_idx, q)| {
            index.nearest(q).map(|(train_idx, distance)| Correspondence {
                query_idx,
                train_idx,
                distance: distance as f32,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_descriptors(n: usize, seed: u64) -> Vec<BinaryDescriptor> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let mut d = [0u8; 32];
                rng.fill(&mut d[..]);
                d
            })
            .collect()
    }

    #[test]
    fn test_probe_masks() {
        let masks = probe_masks(20, 2);
        assert_eq!(masks.len(), 1 + 20 + 190);
        assert_eq!(masks[0], 0);
        assert!(masks.iter().all(|m| m.count_ones() <= 2 && *m < (1 << 20)));
        assert_eq!(probe_masks(20, 0), vec![0]);
    }

    #[test]
    fn test_exact_copy_is_found() {
        let train = random_descriptors(200, 11);
        let index = LshIndex::build(&train, LshParams::default());
        assert_eq!(index.n_tables(), 12);
        assert_eq!(index.n_probes(), 211);
        for i in [0, 42, 199] {
            assert_eq!(index.nearest(&train[i]), Some((i, 0)));
        }
    }

    #[test]
    fn test_near_copy_is_found() {
        let train = random_descriptors(200, 12);
        let mut query = train[77];
        // Flip a handful of bits
        query[0] ^= 0b1000_0001;
        query[17] ^= 0b0001_0000;
        let index = LshIndex::build(&train, LshParams::default());
        assert_eq!(index.nearest(&query), Some((77, 3)));
    }

    #[test]
    fn test_unrelated_query_may_find_nothing() {
        let train = vec![[0u8; 32]];
        let params = LshParams { multi_probe_level: 0, ..LshParams::default() };
        let index = LshIndex::build(&train, params);
        assert_eq!(index.nearest(&[0xffu8; 32]), None);
        assert!(match_lsh(&[[0xffu8; 32]], &train, params).is_empty());
    }

    #[test]
    fn test_match_lsh_keeps_query_order() {
        let train = random_descriptors(100, 13);
        let query: Vec<BinaryDescriptor> = train.iter().rev().cloned().collect();
        let matches = match_lsh(&query, &train, LshParams::default());
        assert_eq!(matches.len(), 100);
        for (i, m) in matches.iter().enumerate() {
            assert_eq!(m.query_idx, i);
            assert_eq!(m.train_idx, 99 - i);
            assert_eq!(m.distance, 0.0);
        }
    }
}
