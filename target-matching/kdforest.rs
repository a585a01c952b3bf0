//! Randomized kd-forest for approximate k-nearest-neighbour search over float descriptors.
//!
//! Each tree splits on a dimension drawn at random from the few with the highest
//! variance, at the mean of that dimension. A query descends every tree once, then
//! keeps unwinding the closest unexplored branches across all trees until the
//! check budget is spent.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use target_core::{Correspondence, FloatDescriptor, KnnCorrespondence};

const DIMS: usize = 128;

/// Dimensions considered when picking a split
const TOP_VARIANCE_DIMS: usize = 5;

/// Points used to estimate mean and variance at each node
const SAMPLE_MEAN: usize = 100;

const FOREST_SEED: u64 = 0x6b64_666f_7265_7374;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub trees: usize,
    /// Leaf points examined per query before stopping
    pub checks: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self { trees: 4, checks: 32 }
    }
}

#[derive(Debug, Clone)]
enum KdNode {
    Leaf(usize),
    Split {
        dim: usize,
        value: f32,
        left: usize,
        right: usize,
    },
}

/// Branch not yet explored, ordered so the heap pops the closest first
#[derive(Debug, Clone, Copy)]
struct Branch {
    node: usize,
    min_dist: f32,
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Branch {}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .min_dist
            .total_cmp(&self.min_dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// The k smallest (index, squared distance) pairs seen so far, ascending
struct KnnResult {
    k: usize,
    items: Vec<(usize, f32)>,
}

impl KnnResult {
    fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k + 1),
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.k
    }

    fn worst(&self) -> f32 {
        if self.is_full() {
            self.items[self.k - 1].1
        } else {
            f32::INFINITY
        }
    }

    fn push(&mut self, idx: usize, dist: f32) {
        if dist >= self.worst() {
            return;
        }
        let pos = self
            .items
            .iter()
            .position(|&(i, d)| dist < d || (dist == d && idx < i))
            .unwrap_or(self.items.len());
        self.items.insert(pos, (idx, dist));
        self.items.truncate(self.k);
    }
}

pub struct KdForest<'a> {
    points: &'a [FloatDescriptor],
    nodes: Vec<KdNode>,
    roots: Vec<usize>,
    params: ForestParams,
}

impl<'a> KdForest<'a> {
    /// Build the forest with the fixed forest seed
    pub fn build(points: &'a [FloatDescriptor], params: ForestParams) -> Self {
        Self::build_seeded(points, params, FOREST_SEED)
    }

    pub fn build_seeded(points: &'a [FloatDescriptor], params: ForestParams, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut nodes = Vec::with_capacity(params.trees * 2 * points.len());
        let mut roots = Vec::with_capacity(params.trees);

        if !points.is_empty() {
            for _ in 0..params.trees.max(1) {
                let mut indices: Vec<usize> = (0..points.len()).collect();
                let root = Self::build_recursive(points, &mut indices, &mut nodes, &mut rng);
                roots.push(root);
            }
        }

        Self {
            points,
            nodes,
            roots,
            params,
        }
    }

    fn build_recursive(
        points: &[FloatDescriptor],
        indices: &mut [usize],
        nodes: &mut Vec<KdNode>,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let node_idx = nodes.len();
        if indices.len() == 1 {
            nodes.push(KdNode::Leaf(indices[0]));
            return node_idx;
        }

        let (dim, value) = choose_split(points, indices, rng);

        // Partition in place: left of `lim` is strictly below the split value
        let mut lim = 0;
        for i in 0..indices.len() {
            if points[indices[i]][dim] < value {
                indices.swap(i, lim);
                lim += 1;
            }
        }
        // All points on one side (duplicates): halve instead
        if lim == 0 || lim == indices.len() {
            lim = indices.len() / 2;
        }

        nodes.push(KdNode::Leaf(usize::MAX));
        let (left_indices, right_indices) = indices.split_at_mut(lim);
        let left = Self::build_recursive(points, left_indices, nodes, rng);
        let right = Self::build_recursive(points, right_indices, nodes, rng);
        nodes[node_idx] = KdNode::Split { dim, value, left, right };
        node_idx
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn n_trees(&self) -> usize {
        self.roots.len()
    }

    /// Up to `k` approximate nearest neighbours as (index, Euclidean distance), ascending
    pub fn knn(&self, query: &FloatDescriptor, k: usize) -> Vec<(usize, f32)> {
        if self.roots.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut result = KnnResult::new(k);
        let mut heap = BinaryHeap::new();
        let mut visited = vec![false; self.points.len()];
        let mut checks = 0;

        for &root in &self.roots {
            self.descend(root, 0.0, query, &mut result, &mut heap, &mut visited, &mut checks);
        }

        while let Some(branch) = heap.pop() {
            if checks >= self.params.checks && result.is_full() {
                break;
            }
            if branch.min_dist >= result.worst() {
                continue;
            }
            self.descend(branch.node, branch.min_dist, query, &mut result, &mut heap, &mut visited, &mut checks);
        }

        result.items.into_iter().map(|(i, d)| (i, d.sqrt())).collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn descend(
        &self,
        mut node: usize,
        min_dist: f32,
        query: &FloatDescriptor,
        result: &mut KnnResult,
        heap: &mut BinaryHeap<Branch>,
        visited: &mut [bool],
        checks: &mut usize,
    ) {
        loop {
            match self.nodes[node] {
                KdNode::Leaf(idx) => {
                    if !visited[idx] {
                        visited[idx] = true;
                        *checks += 1;
                        result.push(idx, squared_distance(query, &self.points[idx]));
                    }
                    return;
                }
                KdNode::Split { dim, value, left, right } => {
                    let diff = query[dim] - value;
                    let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                    // Each bound alone is a valid lower bound for the far side
                    let far_dist = min_dist.max(diff * diff);
                    if far_dist < result.worst() {
                        heap.push(Branch { node: far, min_dist: far_dist });
                    }
                    node = near;
                }
            }
        }
    }
}

/// Random pick among the highest-variance dimensions, split at their mean
fn choose_split(points: &[FloatDescriptor], indices: &[usize], rng: &mut ChaCha8Rng) -> (usize, f32) {
    let sample = &indices[..indices.len().min(SAMPLE_MEAN)];
    let n = sample.len() as f32;

    let mut mean = [0.0f32; DIMS];
    for &i in sample {
        for (m, v) in mean.iter_mut().zip(points[i].iter()) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut variance = [0.0f32; DIMS];
    for &i in sample {
        for d in 0..DIMS {
            let diff = points[i][d] - mean[d];
            variance[d] += diff * diff;
        }
    }

    let mut order: Vec<usize> = (0..DIMS).collect();
    order.sort_by(|&a, &b| variance[b].total_cmp(&variance[a]).then(a.cmp(&b)));
    let dim = order[rng.random_range(0..TOP_VARIANCE_DIMS)];
    (dim, mean[dim])
}

#[inline]
fn squared_distance(a: &FloatDescriptor, b: &FloatDescriptor) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Two nearest scene descriptors for every object descriptor, in query order
pub fn match_knn(
    query: &[FloatDescriptor],
    train: &[FloatDescriptor],
    params: ForestParams,
) -> Vec<KnnCorrespondence> {
    if train.is_empty() {
        return Vec::new();
    }
    let forest = KdForest::build(train, params);

    query
        .par_iter()
        .enumerate()
        .filter_map(|(query_idx, q)| {
            let neighbours = forest.knn(q, 2);
            let &(train_idx, distance) = neighbours.first()?;
            Some(KnnCorrespondence {
                best: Correspondence {
                    query_idx,
                    train_idx,
                    distance,
                },
                second_distance: neighbours.get(1).map(|&(_, d)| d),
            })
        })
        .collect()
}
