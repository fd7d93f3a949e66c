//! UMAP (Uniform Manifold Approximation and Projection).
//!
//! Fitting follows McInnes et al. (2018):
//! - brute-force k-nearest-neighbor graph, parallel over samples with rayon
//! - per-point `rho`/`sigma` by binary search against `log2(n_neighbors)`
//! - fuzzy union of the directed graph
//! - curve parameters `a`, `b` fitted to `min_dist`/`spread`
//! - SGD layout with per-edge sampling schedule and negative sampling
//!
//! A fitted [`UmapModel`] keeps its training data so new samples can be
//! projected with [`UmapModel::transform`].

#![expect(clippy::indexing_slicing)]

use ndarray::{Array2, ArrayView2};
use rand::{Rng as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;

const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_RANGE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UmapParams {
    /// Neighborhood size, counting the point itself.
    pub n_neighbors: usize,
    /// Minimum distance between embedded points.
    pub min_dist: f64,
    /// Scale of the embedded points.
    pub spread: f64,
    pub n_components: usize,
    pub n_epochs: usize,
    pub learning_rate: f64,
    /// Negative samples per positive edge sample.
    pub negative_sample_rate: usize,
    /// Weight of the repulsive term.
    pub repulsion_strength: f64,
    /// Seed; unseeded runs draw from OS entropy.
    pub random_state: Option<u64>,
}

impl Default for UmapParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            min_dist: 0.1,
            spread: 1.0,
            n_components: 2,
            n_epochs: 200,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            repulsion_strength: 1.0,
            random_state: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UmapError {
    InvalidParameter(String),
    TooFewSamples { n_samples: usize },
    NonFiniteInput { row: usize },
    FeatureMismatch { expected: usize, got: usize },
}

impl fmt::Display for UmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(msg) => write!(f, "{msg}"),
            Self::TooFewSamples { n_samples } => {
                write!(f, "UMAP needs at least 2 samples, got {n_samples}")
            }
            Self::NonFiniteInput { row } => {
                write!(f, "input contains NaN or infinity in row {row}")
            }
            Self::FeatureMismatch { expected, got } => write!(
                f,
                "model was fitted on {expected} features, input has {got}"
            ),
        }
    }
}

impl std::error::Error for UmapError {}

impl UmapParams {
    pub fn validate(&self) -> Result<(), UmapError> {
        let invalid = |msg: &str| Err(UmapError::InvalidParameter(msg.to_owned()));
        if self.n_neighbors < 2 {
            return invalid("n_neighbors must be greater than 1");
        }
        if self.min_dist < 0.0 {
            return invalid("min_dist cannot be negative");
        }
        if self.spread <= 0.0 {
            return invalid("spread must be greater than 0");
        }
        if self.min_dist > self.spread {
            return invalid("min_dist must be less than or equal to spread");
        }
        if self.n_components < 1 {
            return invalid("n_components must be greater than 0");
        }
        if self.n_epochs < 1 {
            return invalid("n_epochs must be a positive integer");
        }
        if self.learning_rate < 0.0 {
            return invalid("learning_rate must be positive");
        }
        if self.repulsion_strength < 0.0 {
            return invalid("repulsion_strength cannot be negative");
        }
        Ok(())
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

/// Max-heap entry by distance, so the farthest neighbor is evicted first.
#[derive(Clone, Copy)]
struct Neighbor {
    index: usize,
    distance: f64,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// Directed, weighted edge of the fuzzy graph.
#[derive(Debug, Clone, Copy)]
struct Edge {
    head: usize,
    tail: usize,
    weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Curve {
    a: f64,
    b: f64,
}

#[derive(Debug, Clone)]
pub struct Umap {
    params: UmapParams,
}

impl Umap {
    pub fn new(params: UmapParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &UmapParams {
        &self.params
    }

    /// Learns a layout for `data` (rows are samples).
    pub fn fit(&self, data: ArrayView2<'_, f64>) -> Result<UmapModel, UmapError> {
        self.params.validate()?;
        let n = data.nrows();
        if n < 2 {
            return Err(UmapError::TooFewSamples { n_samples: n });
        }
        check_finite(data)?;

        let k = (self.params.n_neighbors - 1).min(n - 1);
        if k + 1 < self.params.n_neighbors {
            tracing::debug!(
                "n_neighbors {} exceeds sample count, using {}",
                self.params.n_neighbors,
                k + 1
            );
        }

        let knn = nearest_neighbors(data, data, k, true);
        let memberships = smooth_knn(&knn, k + 1);
        let mut edges = fuzzy_union(&knn, &memberships);
        let max_weight = edges.iter().map(|e| e.weight).fold(0.0, f64::max);
        let min_weight = max_weight / self.params.n_epochs as f64;
        edges.retain(|e| e.weight >= min_weight);

        let curve = fit_curve(self.params.spread, self.params.min_dist);
        tracing::debug!(
            "UMAP graph has {} edges, curve a={:.4} b={:.4}",
            edges.len(),
            curve.a,
            curve.b
        );

        let dim = self.params.n_components;
        let mut rng = self.params.rng();
        let mut layout: Vec<f64> = (0..n * dim)
            .map(|_| rng.gen_range(-INIT_RANGE..INIT_RANGE))
            .collect();

        optimize_layout(
            &self.params,
            curve,
            &mut layout,
            None,
            &edges,
            self.params.n_epochs,
            &mut rng,
        );

        let embedding = Array2::from_shape_vec((n, dim), layout)
            .map_err(|e| UmapError::InvalidParameter(e.to_string()))?;

        Ok(UmapModel {
            params: self.params.clone(),
            curve,
            training: data.to_owned(),
            embedding,
        })
    }
}

/// Result of [`Umap::fit`].
#[derive(Debug, Clone)]
pub struct UmapModel {
    params: UmapParams,
    curve: Curve,
    training: Array2<f64>,
    embedding: Array2<f64>,
}

impl UmapModel {
    pub fn params(&self) -> &UmapParams {
        &self.params
    }

    /// Layout of the training data.
    pub fn embedding(&self) -> &Array2<f64> {
        &self.embedding
    }

    pub fn n_training_samples(&self) -> usize {
        self.training.nrows()
    }

    /// Fitted `(a, b)` of the low-dimensional similarity `1 / (1 + a d^(2b))`.
    pub fn curve(&self) -> (f64, f64) {
        (self.curve.a, self.curve.b)
    }

    /// Projects `data` into the fitted layout.
    ///
    /// The training data itself maps to the fitted layout. Other samples start
    /// at the membership-weighted mean of their nearest training points and
    /// are refined against the fixed training layout.
    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, UmapError> {
        if data.ncols() != self.training.ncols() {
            return Err(UmapError::FeatureMismatch {
                expected: self.training.ncols(),
                got: data.ncols(),
            });
        }
        if data == self.training.view() {
            return Ok(self.embedding.clone());
        }
        check_finite(data)?;

        let n = data.nrows();
        let dim = self.params.n_components;
        let k = self.params.n_neighbors.min(self.training.nrows());
        let knn = nearest_neighbors(data, self.training.view(), k, false);
        let memberships = smooth_knn(&knn, k);

        let mut layout = vec![0.0; n * dim];
        let mut edges = Vec::with_capacity(n * k);
        for (i, (neighbors, weights)) in knn.iter().zip(&memberships).enumerate() {
            let total: f64 = weights.iter().sum();
            for (nb, &w) in neighbors.iter().zip(weights) {
                let share = if total > 0.0 { w / total } else { 1.0 / k as f64 };
                for d in 0..dim {
                    layout[i * dim + d] += share * self.embedding[[nb.index, d]];
                }
                edges.push(Edge {
                    head: i,
                    tail: nb.index,
                    weight: w,
                });
            }
        }

        let n_epochs = (self.params.n_epochs / 3).max(1);
        let max_weight = edges.iter().map(|e| e.weight).fold(0.0, f64::max);
        edges.retain(|e| e.weight >= max_weight / n_epochs as f64);

        let tail: Vec<f64> = self.embedding.iter().copied().collect();
        let mut rng = self.params.rng();
        optimize_layout(
            &self.params,
            self.curve,
            &mut layout,
            Some(&tail),
            &edges,
            n_epochs,
            &mut rng,
        );

        Array2::from_shape_vec((n, dim), layout)
            .map_err(|e| UmapError::InvalidParameter(e.to_string()))
    }
}

fn check_finite(data: ArrayView2<'_, f64>) -> Result<(), UmapError> {
    match data
        .rows()
        .into_iter()
        .position(|row| row.iter().any(|v| !v.is_finite()))
    {
        Some(row) => Err(UmapError::NonFiniteInput { row }),
        None => Ok(()),
    }
}

/// `k` nearest rows of `reference` for every row of `queries`, sorted by
/// distance. With `exclude_self` the query index is skipped (queries and
/// reference are the same matrix).
fn nearest_neighbors(
    queries: ArrayView2<'_, f64>,
    reference: ArrayView2<'_, f64>,
    k: usize,
    exclude_self: bool,
) -> Vec<Vec<Neighbor>> {
    (0..queries.nrows())
        .into_par_iter()
        .map(|i| {
            let q = queries.row(i);
            let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
            for (j, r) in reference.rows().into_iter().enumerate() {
                if exclude_self && i == j {
                    continue;
                }
                let distance = q
                    .iter()
                    .zip(r.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();
                if heap.len() < k {
                    heap.push(Neighbor { index: j, distance });
                } else if heap.peek().is_some_and(|top| distance < top.distance) {
                    heap.pop();
                    heap.push(Neighbor { index: j, distance });
                }
            }
            let mut neighbors = heap.into_vec();
            neighbors.sort();
            neighbors
        })
        .collect()
}

/// Membership strength of every kNN edge, `exp(-(d - rho) / sigma)`.
fn smooth_knn(knn: &[Vec<Neighbor>], n_neighbors: usize) -> Vec<Vec<f64>> {
    let target = (n_neighbors as f64).log2();
    let mean_all = {
        let (sum, count) = knn
            .iter()
            .flatten()
            .fold((0.0, 0usize), |(s, c), nb| (s + nb.distance, c + 1));
        if count > 0 { sum / count as f64 } else { 0.0 }
    };

    knn.par_iter()
        .map(|neighbors| {
            let rho = neighbors
                .iter()
                .map(|nb| nb.distance)
                .find(|&d| d > 0.0)
                .unwrap_or(0.0);

            let mut lo = 0.0;
            let mut hi = f64::INFINITY;
            let mut sigma = 1.0;
            for _ in 0..64 {
                let psum: f64 = neighbors
                    .iter()
                    .map(|nb| (-(nb.distance - rho).max(0.0) / sigma).exp())
                    .sum();
                if (psum - target).abs() < SMOOTH_K_TOLERANCE {
                    break;
                }
                if psum > target {
                    hi = sigma;
                    sigma = (lo + hi) / 2.0;
                } else {
                    lo = sigma;
                    sigma = if hi.is_infinite() {
                        sigma * 2.0
                    } else {
                        (lo + hi) / 2.0
                    };
                }
            }

            let mean_local = if neighbors.is_empty() {
                0.0
            } else {
                neighbors.iter().map(|nb| nb.distance).sum::<f64>() / neighbors.len() as f64
            };
            let floor = if rho > 0.0 {
                MIN_K_DIST_SCALE * mean_local
            } else {
                MIN_K_DIST_SCALE * mean_all
            };
            let sigma = sigma.max(floor).max(f64::EPSILON);

            neighbors
                .iter()
                .map(|nb| (-(nb.distance - rho).max(0.0) / sigma).exp())
                .collect()
        })
        .collect()
}

/// Symmetrizes the directed graph with the probabilistic t-conorm
/// `w_ij + w_ji - w_ij * w_ji` and emits both directions of every edge.
fn fuzzy_union(knn: &[Vec<Neighbor>], memberships: &[Vec<f64>]) -> Vec<Edge> {
    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, (neighbors, weights)) in knn.iter().zip(memberships).enumerate() {
        for (nb, &w) in neighbors.iter().zip(weights) {
            directed.insert((i, nb.index), w);
        }
    }

    let mut undirected: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&(i, j), &w_ij) in &directed {
        let key = if i < j { (i, j) } else { (j, i) };
        let w_ji = directed.get(&(j, i)).copied().unwrap_or(0.0);
        undirected.insert(key, w_ij + w_ji - w_ij * w_ji);
    }

    undirected
        .into_iter()
        .filter(|&(_, w)| w > 0.0)
        .flat_map(|((i, j), weight)| {
            [
                Edge {
                    head: i,
                    tail: j,
                    weight,
                },
                Edge {
                    head: j,
                    tail: i,
                    weight,
                },
            ]
        })
        .collect()
}

/// Least-squares fit of `1 / (1 + a x^(2b))` to the offset exponential
/// defined by `spread` and `min_dist`, sampled on `[0, 3 * spread]`.
fn fit_curve(spread: f64, min_dist: f64) -> Curve {
    let xs: Vec<f64> = (0..300)
        .map(|i| 3.0 * spread * i as f64 / 299.0)
        .collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let sse = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| (1.0 / (1.0 + a * x.powf(2.0 * b)) - y).powi(2))
            .sum()
    };
    let best_log_a = |b: f64| golden_section(-7.0, 7.0, |log_a| sse(log_a.exp(), b));
    let b = golden_section(0.1, 3.0, |b| sse(best_log_a(b).exp(), b));
    let a = best_log_a(b).exp();
    Curve { a, b }
}

fn golden_section(mut lo: f64, mut hi: f64, f: impl Fn(f64) -> f64) -> f64 {
    let ratio = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut x1 = hi - ratio * (hi - lo);
    let mut x2 = lo + ratio * (hi - lo);
    let mut f1 = f(x1);
    let mut f2 = f(x2);
    for _ in 0..80 {
        if f1 < f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - ratio * (hi - lo);
            f1 = f(x1);
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + ratio * (hi - lo);
            f2 = f(x2);
        }
    }
    (lo + hi) / 2.0
}

/// SGD over the edge list. Heads live in `head`; tails live in `tail` when
/// given (and stay fixed), otherwise in `head` and move too.
fn optimize_layout(
    params: &UmapParams,
    curve: Curve,
    head: &mut [f64],
    tail: Option<&[f64]>,
    edges: &[Edge],
    n_epochs: usize,
    rng: &mut ChaCha8Rng,
) {
    let dim = params.n_components;
    let n_tail = tail.map_or(head.len(), <[f64]>::len) / dim;
    if edges.is_empty() || n_tail == 0 {
        return;
    }
    let Curve { a, b } = curve;
    let gamma = params.repulsion_strength;
    let neg_rate = params.negative_sample_rate as f64;

    let max_weight = edges.iter().map(|e| e.weight).fold(0.0, f64::max);
    let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_weight / e.weight).collect();
    let epochs_per_negative: Vec<f64> = epochs_per_sample
        .iter()
        .map(|&e| if neg_rate > 0.0 { e / neg_rate } else { f64::INFINITY })
        .collect();
    let mut next_sample = epochs_per_sample.clone();
    let mut next_negative = epochs_per_negative.clone();

    let mut current = vec![0.0; dim];
    let mut other = vec![0.0; dim];

    for epoch in 0..n_epochs {
        let alpha = params.learning_rate * (1.0 - epoch as f64 / n_epochs as f64);
        let epoch_f = epoch as f64;

        for (e, edge) in edges.iter().enumerate() {
            if next_sample[e] > epoch_f {
                continue;
            }
            let (j, k) = (edge.head, edge.tail);
            current.copy_from_slice(&head[j * dim..(j + 1) * dim]);
            match tail {
                Some(t) => other.copy_from_slice(&t[k * dim..(k + 1) * dim]),
                None => other.copy_from_slice(&head[k * dim..(k + 1) * dim]),
            }

            let dist_sq: f64 = current
                .iter()
                .zip(&other)
                .map(|(c, o)| (c - o).powi(2))
                .sum();
            let coeff = if dist_sq > 0.0 {
                -2.0 * a * b * dist_sq.powf(b - 1.0) / (a * dist_sq.powf(b) + 1.0)
            } else {
                0.0
            };
            for d in 0..dim {
                let grad = (coeff * (current[d] - other[d])).clamp(-GRADIENT_CLIP, GRADIENT_CLIP);
                current[d] += grad * alpha;
                if tail.is_none() {
                    head[k * dim + d] -= grad * alpha;
                }
            }
            next_sample[e] += epochs_per_sample[e];

            let n_neg = if epochs_per_negative[e].is_finite() {
                ((epoch_f - next_negative[e]) / epochs_per_negative[e]).max(0.0) as usize
            } else {
                0
            };
            for _ in 0..n_neg {
                let r = rng.gen_range(0..n_tail);
                if tail.is_none() && r == j {
                    continue;
                }
                match tail {
                    Some(t) => other.copy_from_slice(&t[r * dim..(r + 1) * dim]),
                    None => other.copy_from_slice(&head[r * dim..(r + 1) * dim]),
                }
                let dist_sq: f64 = current
                    .iter()
                    .zip(&other)
                    .map(|(c, o)| (c - o).powi(2))
                    .sum();
                if dist_sq <= 0.0 {
                    continue;
                }
                let coeff = 2.0 * gamma * b / ((0.001 + dist_sq) * (a * dist_sq.powf(b) + 1.0));
                for d in 0..dim {
                    let grad =
                        (coeff * (current[d] - other[d])).clamp(-GRADIENT_CLIP, GRADIENT_CLIP);
                    current[d] += grad * alpha;
                }
            }
            next_negative[e] += n_neg as f64 * epochs_per_negative[e];

            head[j * dim..(j + 1) * dim].copy_from_slice(&current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Axis, array};

    fn two_blobs() -> Array2<f64> {
        let mut rows = Vec::new();
        for i in 0..20 {
            let t = i as f64 * 0.01;
            rows.extend([t, t, 0.0]);
        }
        for i in 0..20 {
            let t = i as f64 * 0.01;
            rows.extend([10.0 + t, 10.0 + t, 10.0]);
        }
        Array2::from_shape_vec((40, 3), rows).expect("valid shape")
    }

    fn seeded(n_neighbors: usize) -> Umap {
        Umap::new(UmapParams {
            n_neighbors,
            random_state: Some(42),
            ..UmapParams::default()
        })
    }

    #[test]
    fn test_defaults() {
        let params = UmapParams::default();
        assert_eq!(params.n_neighbors, 15);
        assert_eq!(params.n_components, 2);
        assert_eq!(params.n_epochs, 200);
        assert!(params.random_state.is_none());
    }

    #[test]
    fn test_curve_matches_reference_values() {
        let curve = fit_curve(1.0, 0.1);
        assert!((curve.a - 1.577).abs() < 0.1, "a = {}", curve.a);
        assert!((curve.b - 0.895).abs() < 0.05, "b = {}", curve.b);
    }

    #[test]
    fn test_fit_shape_and_finite() -> Result<(), UmapError> {
        let data = two_blobs();
        let model = seeded(5).fit(data.view())?;
        assert_eq!(model.embedding().dim(), (40, 2));
        assert!(model.embedding().iter().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn test_fit_separates_blobs() -> Result<(), UmapError> {
        let model = seeded(5).fit(two_blobs().view())?;
        let emb = model.embedding();
        let mean_a = emb.slice(ndarray::s![..20, ..]).mean_axis(Axis(0)).expect("non-empty");
        let mean_b = emb.slice(ndarray::s![20.., ..]).mean_axis(Axis(0)).expect("non-empty");
        let gap = mean_a
            .iter()
            .zip(mean_b.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();
        assert!(gap > 0.5, "blobs should separate, gap = {gap}");
        Ok(())
    }

    #[test]
    fn test_seed_is_reproducible() -> Result<(), UmapError> {
        let data = two_blobs();
        let first = seeded(5).fit(data.view())?;
        let second = seeded(5).fit(data.view())?;
        assert_eq!(first.embedding(), second.embedding());
        Ok(())
    }

    #[test]
    fn test_transform_training_data_returns_layout() -> Result<(), UmapError> {
        let data = two_blobs();
        let model = seeded(5).fit(data.view())?;
        assert_eq!(&model.transform(data.view())?, model.embedding());
        Ok(())
    }

    #[test]
    fn test_transform_new_points() -> Result<(), UmapError> {
        let model = seeded(5).fit(two_blobs().view())?;
        let new = array![[0.05, 0.05, 0.0], [10.05, 10.05, 10.0]];
        let projected = model.transform(new.view())?;
        assert_eq!(projected.dim(), (2, 2));
        assert!(projected.iter().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn test_invalid_parameters() {
        let data = two_blobs();
        let err = seeded(1).fit(data.view()).unwrap_err();
        assert_eq!(err.to_string(), "n_neighbors must be greater than 1");

        let params = UmapParams {
            min_dist: 2.0,
            ..UmapParams::default()
        };
        assert!(Umap::new(params).fit(data.view()).is_err());
    }

    #[test]
    fn test_too_few_samples() {
        let data = array![[1.0, 2.0]];
        let err = seeded(5).fit(data.view()).unwrap_err();
        assert_eq!(err, UmapError::TooFewSamples { n_samples: 1 });
    }

    #[test]
    fn test_feature_mismatch_on_transform() -> Result<(), UmapError> {
        let model = seeded(5).fit(two_blobs().view())?;
        let bad = array![[1.0, 2.0]];
        assert!(matches!(
            model.transform(bad.view()),
            Err(UmapError::FeatureMismatch { expected: 3, got: 2 })
        ));
        Ok(())
    }
}
