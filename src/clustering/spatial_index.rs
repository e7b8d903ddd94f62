//! Radius queries over propagated states.
//!
//! States become points of dimension `K`: 3 (position only) or 6 (position and scaled
//! velocity). Points are sorted along X and cut into slabs; each slab gets its own immutable
//! kd-tree over its core points plus a halo one query radius wide, and only its core points
//! are queried. Every pair closer than the radius therefore shows up from exactly the slab
//! owning its lower-indexed point, whatever the slab count.
//!
//! The immutable tree cannot split a bucket whose points all share the pivot value on an
//! axis. Points are therefore indexed through a fixed Householder reflection, which keeps
//! distances but leaves no two distinct points with a common coordinate in practice, and
//! exactly coincident points are merged into one tree item listing all of them. Candidates
//! are confirmed against the unreflected coordinates.
//!
//! Queries run in parallel over shards of core points against the read-only tree. Each shard
//! returns its own edge list; lists are concatenated in shard order.
use std::cmp::Ordering;

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use rayon::prelude::*;

type Tree<const K: usize> = ImmutableKdTree<f64, u32, K, 32>;

/// Relative widening of the tree query, absorbing the rounding of the reflection.
const QUERY_SLACK: f64 = 1e-9;

/// Reflect `p` through the hyperplane normal to `(√2, √3, √4, …)`.
fn reflect<const K: usize>(p: &[f64; K]) -> [f64; K] {
    let normal: [f64; K] = std::array::from_fn(|k| ((k + 2) as f64).sqrt());
    let nn: f64 = normal.iter().map(|a| a * a).sum();
    let c = 2.0 * normal.iter().zip(p).map(|(a, b)| a * b).sum::<f64>() / nn;
    std::array::from_fn(|k| p[k] - c * normal[k])
}

fn lexical<const K: usize>(a: &[f64; K], b: &[f64; K]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn squared_distance<const K: usize>(a: &[f64; K], b: &[f64; K]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Distinct reflected points of a slab, each with the point indices sitting on it.
struct Sites<const K: usize> {
    coords: Vec<[f64; K]>,
    /// `occupants[start[s]..start[s + 1]]` are the points at site `s`.
    start: Vec<usize>,
    occupants: Vec<usize>,
}

impl<const K: usize> Sites<K> {
    fn new(members: &[usize], reflected: &[[f64; K]]) -> Self {
        let mut occupants = members.to_vec();
        occupants.sort_by(|&a, &b| lexical(&reflected[a], &reflected[b]).then(a.cmp(&b)));

        let mut coords: Vec<[f64; K]> = Vec::new();
        let mut start = Vec::new();
        for (pos, &i) in occupants.iter().enumerate() {
            let fresh = coords
                .last()
                .map_or(true, |last| lexical(last, &reflected[i]).is_ne());
            if fresh {
                coords.push(reflected[i]);
                start.push(pos);
            }
        }
        start.push(occupants.len());
        Sites {
            coords,
            start,
            occupants,
        }
    }

    fn at(&self, site: usize) -> &[usize] {
        &self.occupants[self.start[site]..self.start[site + 1]]
    }
}

/// Candidate neighbor pairs `(i, j)`, `i < j`, for the points within `radius` of each other
/// (Euclidean in the point space), further filtered by `accept(i, j)`.
///
/// Arguments
/// -----------------
/// * `points`: the point cloud. Any number of points may coincide.
/// * `radius`: query radius in point-space units.
/// * `partitions`: number of X slabs (≥ 1).
/// * `shard_size`: core points per parallel query task.
/// * `accept`: exact acceptance test applied to every candidate pair.
pub fn neighbor_pairs<const K: usize, F>(
    points: &[[f64; K]],
    radius: f64,
    partitions: usize,
    shard_size: usize,
    accept: F,
) -> Vec<(usize, usize)>
where
    F: Fn(usize, usize) -> bool + Sync,
{
    if points.len() < 2 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| points[a][0].total_cmp(&points[b][0]).then(a.cmp(&b)));
    let xs: Vec<f64> = order.iter().map(|&i| points[i][0]).collect();
    let reflected: Vec<[f64; K]> = points.iter().map(reflect).collect();

    let n = order.len();
    let partitions = partitions.clamp(1, n);
    let r2 = radius * radius;
    let query_r2 = (radius * (1.0 + QUERY_SLACK)).powi(2);

    let mut edges = Vec::new();
    for p in 0..partitions {
        let core_lo = p * n / partitions;
        let core_hi = (p + 1) * n / partitions;
        if core_lo == core_hi {
            continue;
        }

        let halo_lo = xs.partition_point(|&x| x < xs[core_lo] - radius);
        let halo_hi = xs.partition_point(|&x| x <= xs[core_hi - 1] + radius);
        let sites = Sites::new(&order[halo_lo..halo_hi], &reflected);
        let tree: Tree<K> = ImmutableKdTree::new_from_slice(&sites.coords);

        let core = &order[core_lo..core_hi];
        let shard_edges: Vec<Vec<(usize, usize)>> = core
            .par_chunks(shard_size.max(1))
            .map(|shard| {
                let mut out = Vec::new();
                for &i in shard {
                    let mut found: Vec<usize> = tree
                        .within::<SquaredEuclidean>(&reflected[i], query_r2)
                        .into_iter()
                        .flat_map(|nn| sites.at(nn.item as usize).iter().copied())
                        .filter(|&j| i < j && squared_distance(&points[i], &points[j]) <= r2)
                        .collect();
                    found.sort_unstable();
                    out.extend(found.into_iter().filter(|&j| accept(i, j)).map(|j| (i, j)));
                }
                out
            })
            .collect();
        edges.extend(shard_edges.into_iter().flatten());
    }
    edges
}
