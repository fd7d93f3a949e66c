//! HDBSCAN: hierarchical density-based clustering with noise.
//!
//! Pipeline (Campello, Moulavi, Sander 2013):
//! 1. core distance of every sample to its `min_samples`-th neighbor (self included)
//! 2. Prim's minimum spanning tree over mutual reachability distances
//! 3. single-linkage hierarchy via union-find
//! 4. condensed tree, dropping splits smaller than `min_cluster_size`
//! 5. excess-of-mass selection of the most stable clusters
//! 6. labels, membership strengths and, on request, soft membership vectors

#![expect(clippy::indexing_slicing)]

use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Floor on linkage distances, keeps every lambda finite for duplicate samples.
const MIN_DISTANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HdbscanParams {
    /// Smallest group of samples that counts as a cluster.
    pub min_cluster_size: usize,
    /// Neighborhood used for core distances; defaults to `min_cluster_size`.
    pub min_samples: Option<usize>,
    /// Allow the root of the tree to be selected as the only cluster.
    pub allow_single_cluster: bool,
    /// Keep exemplars so soft membership vectors can be computed.
    pub prediction_data: bool,
}

impl Default for HdbscanParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            min_samples: None,
            allow_single_cluster: false,
            prediction_data: false,
        }
    }
}

impl HdbscanParams {
    pub fn validate(&self) -> Result<(), HdbscanError> {
        if self.min_cluster_size < 2 {
            return Err(HdbscanError::InvalidParameter(
                "Min cluster size must be greater than one".to_owned(),
            ));
        }
        if self.min_samples == Some(0) {
            return Err(HdbscanError::InvalidParameter(
                "Min samples must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    fn effective_min_samples(&self) -> usize {
        self.min_samples.unwrap_or(self.min_cluster_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HdbscanError {
    InvalidParameter(String),
    EmptyDataset,
    NonFiniteInput { row: usize },
}

impl fmt::Display for HdbscanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(msg) => write!(f, "{msg}"),
            Self::EmptyDataset => write!(f, "cannot cluster an empty dataset"),
            Self::NonFiniteInput { row } => {
                write!(f, "input contains NaN or infinity in row {row}")
            }
        }
    }
}

impl std::error::Error for HdbscanError {}

/// One row of the condensed tree: `child` (a sample when below `n_samples`,
/// a cluster otherwise) leaves `parent` at density `lambda`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CondensedEdge {
    pub parent: usize,
    pub child: usize,
    pub lambda: f64,
    pub size: usize,
}

/// Summary of one cluster node of the condensed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterBranch {
    pub id: usize,
    pub parent: Option<usize>,
    /// Lambda at which the cluster split from its parent (0 for the root).
    pub birth: f64,
    /// Largest lambda at which a sample or child leaves the cluster.
    pub death: f64,
    pub size: usize,
    /// Position in the final labelling, when selected.
    pub label: Option<i32>,
}

/// Condensed cluster hierarchy with the selection that produced the labels.
#[derive(Debug, Clone, PartialEq)]
pub struct CondensedTree {
    n_samples: usize,
    edges: Vec<CondensedEdge>,
    stabilities: BTreeMap<usize, f64>,
    selected: Vec<usize>,
}

impl CondensedTree {
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Id of the root cluster.
    pub fn root(&self) -> usize {
        self.n_samples
    }

    pub fn edges(&self) -> &[CondensedEdge] {
        &self.edges
    }

    /// Excess-of-mass stability of every cluster, before selection.
    pub fn stabilities(&self) -> &BTreeMap<usize, f64> {
        &self.stabilities
    }

    /// Selected cluster ids; the position is the label.
    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    /// Every cluster node, root first, children after their parents.
    pub fn branches(&self) -> Vec<ClusterBranch> {
        let root = self.root();
        let mut births: BTreeMap<usize, (usize, f64, usize)> = BTreeMap::new();
        let mut deaths: BTreeMap<usize, f64> = BTreeMap::new();
        for e in &self.edges {
            if e.child >= self.n_samples {
                births.insert(e.child, (e.parent, e.lambda, e.size));
            }
            let death = deaths.entry(e.parent).or_insert(0.0);
            *death = death.max(e.lambda);
        }
        let mut ids: Vec<usize> = std::iter::once(root).chain(births.keys().copied()).collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| {
                let (parent, birth, size) = match births.get(&id) {
                    Some(&(p, b, s)) => (Some(p), b, s),
                    None => (None, 0.0, self.n_samples),
                };
                ClusterBranch {
                    id,
                    parent,
                    birth,
                    death: deaths.get(&id).copied().unwrap_or(birth),
                    size,
                    label: self
                        .selected
                        .iter()
                        .position(|&c| c == id)
                        .and_then(|p| i32::try_from(p).ok()),
                }
            })
            .collect()
    }
}

/// Result of [`Hdbscan::fit`].
#[derive(Debug, Clone)]
pub struct HdbscanFit {
    pub labels: Vec<i32>,
    /// Strength of each sample's membership in its cluster; 0 for noise.
    pub probabilities: Vec<f64>,
    /// Soft membership per sample and selected cluster, when requested.
    pub membership: Option<Array2<f64>>,
    pub tree: CondensedTree,
}

#[derive(Debug, Clone)]
pub struct Hdbscan {
    params: HdbscanParams,
}

#[derive(Debug, Clone, Copy)]
struct MstEdge {
    a: usize,
    b: usize,
    distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct LinkageNode {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
    next: usize,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        let total = 2 * n - 1;
        let mut size = vec![0; total];
        size[..n].fill(1);
        Self {
            parent: (0..total).collect(),
            size,
            next: n,
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let up = self.parent[node];
            self.parent[node] = root;
            node = up;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        self.parent[a] = self.next;
        self.parent[b] = self.next;
        self.size[self.next] = self.size[a] + self.size[b];
        self.next += 1;
    }
}

fn euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

impl Hdbscan {
    pub fn new(params: HdbscanParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HdbscanParams {
        &self.params
    }

    pub fn fit(&self, data: ArrayView2<'_, f64>) -> Result<HdbscanFit, HdbscanError> {
        self.params.validate()?;
        let n = data.nrows();
        if n == 0 {
            return Err(HdbscanError::EmptyDataset);
        }
        if let Some(row) = data
            .rows()
            .into_iter()
            .position(|r| r.iter().any(|v| !v.is_finite()))
        {
            return Err(HdbscanError::NonFiniteInput { row });
        }
        if n == 1 {
            return Ok(HdbscanFit {
                labels: vec![-1],
                probabilities: vec![0.0],
                membership: self.params.prediction_data.then(|| Array2::zeros((1, 0))),
                tree: CondensedTree {
                    n_samples: 1,
                    edges: Vec::new(),
                    stabilities: BTreeMap::new(),
                    selected: Vec::new(),
                },
            });
        }

        let min_samples = self.params.effective_min_samples().min(n);
        let core = core_distances(data, min_samples);
        let mst = minimum_spanning_tree(data, &core);
        let linkage = single_linkage(n, &mst);
        let edges = condense(&linkage, n, self.params.min_cluster_size);
        let stabilities = stabilities(&edges, n);
        let selected = select_clusters(&edges, &stabilities, n, self.params.allow_single_cluster);

        let tree = CondensedTree {
            n_samples: n,
            edges,
            stabilities,
            selected,
        };
        let labels = label_samples(&tree, self.params.allow_single_cluster);
        let probabilities = membership_strengths(&tree, &labels);
        // One column per selected cluster, so no selection gives an (n, 0) matrix.
        let membership = self.params.prediction_data.then(|| {
            if tree.selected.is_empty() {
                Array2::zeros((n, 0))
            } else {
                soft_membership(data, &tree)
            }
        });

        tracing::debug!(
            "HDBSCAN selected {} clusters from {} condensed edges",
            tree.selected.len(),
            tree.edges.len()
        );

        Ok(HdbscanFit {
            labels,
            probabilities,
            membership,
            tree,
        })
    }
}

fn core_distances(data: ArrayView2<'_, f64>, min_samples: usize) -> Vec<f64> {
    let kth = min_samples.max(1) - 1;
    (0..data.nrows())
        .into_par_iter()
        .map(|i| {
            let row = data.row(i);
            let mut dists: Vec<f64> = data.rows().into_iter().map(|r| euclidean(row, r)).collect();
            let (_, kth_dist, _) = dists.select_nth_unstable_by(kth, f64::total_cmp);
            *kth_dist
        })
        .collect()
}

/// Prim's algorithm on the dense mutual reachability graph, edges sorted by
/// weight.
fn minimum_spanning_tree(data: ArrayView2<'_, f64>, core: &[f64]) -> Vec<MstEdge> {
    let n = data.nrows();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut source = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);
    let mut current = 0;

    for _ in 1..n {
        in_tree[current] = true;
        let mut next: Option<usize> = None;
        for i in 0..n {
            if in_tree[i] {
                continue;
            }
            let reach = core[current]
                .max(core[i])
                .max(euclidean(data.row(current), data.row(i)));
            if reach < best[i] {
                best[i] = reach;
                source[i] = current;
            }
            if next.is_none_or(|j| best[i] < best[j]) {
                next = Some(i);
            }
        }
        let Some(next) = next else { break };
        edges.push(MstEdge {
            a: source[next],
            b: next,
            distance: best[next],
        });
        current = next;
    }

    edges.sort_by(|x, y| x.distance.total_cmp(&y.distance));
    edges
}

fn single_linkage(n: usize, mst: &[MstEdge]) -> Vec<LinkageNode> {
    let mut uf = UnionFind::new(n);
    mst.iter()
        .map(|e| {
            let left = uf.find(e.a);
            let right = uf.find(e.b);
            let size = uf.size[left] + uf.size[right];
            uf.union(left, right);
            LinkageNode {
                left,
                right,
                distance: e.distance.max(MIN_DISTANCE),
                size,
            }
        })
        .collect()
}

fn bfs_linkage(linkage: &[LinkageNode], n: usize, root: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        out.push(node);
        if node >= n {
            let link = &linkage[node - n];
            queue.push_back(link.left);
            queue.push_back(link.right);
        }
    }
    out
}

fn condense(linkage: &[LinkageNode], n: usize, min_cluster_size: usize) -> Vec<CondensedEdge> {
    let root = 2 * n - 2;
    let mut relabel = vec![0usize; root + 1];
    relabel[root] = n;
    let mut next_label = n + 1;
    let mut ignore = vec![false; root + 1];
    let mut out = Vec::new();

    let size_of = |node: usize| if node >= n { linkage[node - n].size } else { 1 };

    for node in bfs_linkage(linkage, n, root) {
        if ignore[node] || node < n {
            continue;
        }
        let link = linkage[node - n];
        let lambda = 1.0 / link.distance;
        let parent = relabel[node];
        let (left_size, right_size) = (size_of(link.left), size_of(link.right));

        match (
            left_size >= min_cluster_size,
            right_size >= min_cluster_size,
        ) {
            (true, true) => {
                for (child, size) in [(link.left, left_size), (link.right, right_size)] {
                    relabel[child] = next_label;
                    out.push(CondensedEdge {
                        parent,
                        child: next_label,
                        lambda,
                        size,
                    });
                    next_label += 1;
                }
            }
            (false, false) => {
                for child in [link.left, link.right] {
                    fall_out(linkage, n, child, parent, lambda, &mut out, &mut ignore);
                }
            }
            (false, true) => {
                relabel[link.right] = parent;
                fall_out(linkage, n, link.left, parent, lambda, &mut out, &mut ignore);
            }
            (true, false) => {
                relabel[link.left] = parent;
                fall_out(linkage, n, link.right, parent, lambda, &mut out, &mut ignore);
            }
        }
    }
    out
}

/// Every sample below `node` leaves `parent` at `lambda`.
fn fall_out(
    linkage: &[LinkageNode],
    n: usize,
    node: usize,
    parent: usize,
    lambda: f64,
    out: &mut Vec<CondensedEdge>,
    ignore: &mut [bool],
) {
    for sub in bfs_linkage(linkage, n, node) {
        if sub < n {
            out.push(CondensedEdge {
                parent,
                child: sub,
                lambda,
                size: 1,
            });
        }
        ignore[sub] = true;
    }
}

fn stabilities(edges: &[CondensedEdge], n: usize) -> BTreeMap<usize, f64> {
    let mut births: BTreeMap<usize, f64> = BTreeMap::from([(n, 0.0)]);
    let mut out: BTreeMap<usize, f64> = BTreeMap::from([(n, 0.0)]);
    for e in edges.iter().filter(|e| e.child >= n) {
        births.insert(e.child, e.lambda);
        out.insert(e.child, 0.0);
    }
    for e in edges {
        let birth = births.get(&e.parent).copied().unwrap_or(0.0);
        *out.entry(e.parent).or_insert(0.0) += (e.lambda - birth) * e.size as f64;
    }
    out
}

fn cluster_children(edges: &[CondensedEdge], n: usize) -> BTreeMap<usize, Vec<usize>> {
    let mut children: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for e in edges.iter().filter(|e| e.child >= n) {
        children.entry(e.parent).or_default().push(e.child);
    }
    children
}

fn descendants(children: &BTreeMap<usize, Vec<usize>>, node: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut queue = VecDeque::from([node]);
    while let Some(c) = queue.pop_front() {
        if let Some(kids) = children.get(&c) {
            out.extend(kids);
            queue.extend(kids);
        }
    }
    out
}

/// Excess-of-mass selection, bottom-up over cluster ids.
fn select_clusters(
    edges: &[CondensedEdge],
    raw: &BTreeMap<usize, f64>,
    n: usize,
    allow_single_cluster: bool,
) -> Vec<usize> {
    let children = cluster_children(edges, n);
    let mut stability = raw.clone();
    let nodes: Vec<usize> = raw
        .keys()
        .rev()
        .copied()
        .filter(|&c| allow_single_cluster || c != n)
        .collect();
    let mut is_cluster: BTreeMap<usize, bool> = nodes.iter().map(|&c| (c, true)).collect();

    for &node in &nodes {
        let subtree: f64 = children
            .get(&node)
            .map(|kids| {
                kids.iter()
                    .map(|k| stability.get(k).copied().unwrap_or(0.0))
                    .sum()
            })
            .unwrap_or(0.0);
        let own = stability.get(&node).copied().unwrap_or(0.0);
        if subtree > own {
            is_cluster.insert(node, false);
            stability.insert(node, subtree);
        } else {
            for sub in descendants(&children, node) {
                is_cluster.insert(sub, false);
            }
        }
    }

    is_cluster
        .into_iter()
        .filter_map(|(c, keep)| keep.then_some(c))
        .collect()
}

/// Parent cluster and exit lambda of every sample.
fn sample_rows(tree: &CondensedTree) -> Vec<(usize, f64)> {
    let mut rows = vec![(tree.root(), 0.0); tree.n_samples];
    for e in tree.edges.iter().filter(|e| e.child < tree.n_samples) {
        rows[e.child] = (e.parent, e.lambda);
    }
    rows
}

fn cluster_parents(tree: &CondensedTree) -> BTreeMap<usize, usize> {
    tree.edges
        .iter()
        .filter(|e| e.child >= tree.n_samples)
        .map(|e| (e.child, e.parent))
        .collect()
}

fn label_samples(tree: &CondensedTree, allow_single_cluster: bool) -> Vec<i32> {
    let root = tree.root();
    let parents = cluster_parents(tree);
    let label_of: BTreeMap<usize, i32> = tree
        .selected
        .iter()
        .enumerate()
        .filter_map(|(i, &c)| i32::try_from(i).ok().map(|l| (c, l)))
        .collect();
    let root_max_lambda = tree
        .edges
        .iter()
        .filter(|e| e.parent == root)
        .map(|e| e.lambda)
        .fold(0.0, f64::max);

    sample_rows(tree)
        .into_iter()
        .map(|(parent, lambda)| {
            let mut node = parent;
            loop {
                if let Some(&label) = label_of.get(&node) {
                    if node != root {
                        return label;
                    }
                    let single = allow_single_cluster && tree.selected.len() == 1;
                    return if single && lambda >= root_max_lambda {
                        label
                    } else {
                        -1
                    };
                }
                match parents.get(&node) {
                    Some(&up) => node = up,
                    None => return -1,
                }
            }
        })
        .collect()
}

fn membership_strengths(tree: &CondensedTree, labels: &[i32]) -> Vec<f64> {
    let mut deaths: BTreeMap<usize, f64> = BTreeMap::new();
    for e in &tree.edges {
        let d = deaths.entry(e.parent).or_insert(0.0);
        *d = d.max(e.lambda);
    }
    sample_rows(tree)
        .into_iter()
        .zip(labels)
        .map(|((_, lambda), &label)| {
            let Some(&cluster) = usize::try_from(label).ok().and_then(|l| tree.selected.get(l))
            else {
                return 0.0;
            };
            let max_lambda = deaths.get(&cluster).copied().unwrap_or(0.0);
            if max_lambda == 0.0 || !lambda.is_finite() {
                1.0
            } else {
                lambda.min(max_lambda) / max_lambda
            }
        })
        .collect()
}

/// Soft membership of every sample in every selected cluster: distance to the
/// cluster's exemplars times a tree-based outlier score, scaled by the
/// probability of the sample belonging to any cluster.
fn soft_membership(data: ArrayView2<'_, f64>, tree: &CondensedTree) -> Array2<f64> {
    let n = tree.n_samples;
    let clusters = &tree.selected;
    let children = cluster_children(&tree.edges, n);
    let parents = cluster_parents(tree);
    let births: BTreeMap<usize, f64> = tree
        .edges
        .iter()
        .filter(|e| e.child >= n)
        .map(|e| (e.child, e.lambda))
        .collect();

    let mut deepest: BTreeMap<usize, f64> = BTreeMap::new();
    for e in &tree.edges {
        let mut node = e.parent;
        loop {
            let d = deepest.entry(node).or_insert(0.0);
            *d = d.max(e.lambda);
            match parents.get(&node) {
                Some(&up) => node = up,
                None => break,
            }
        }
    }

    let exemplars: Vec<Vec<usize>> = clusters
        .iter()
        .map(|&c| {
            let mut leaves: Vec<usize> = descendants(&children, c)
                .into_iter()
                .filter(|d| !children.contains_key(d))
                .collect();
            if leaves.is_empty() {
                leaves.push(c);
            }
            leaves
                .into_iter()
                .flat_map(|leaf| {
                    let rows: Vec<&CondensedEdge> = tree
                        .edges
                        .iter()
                        .filter(|e| e.parent == leaf && e.child < n)
                        .collect();
                    let top = rows.iter().map(|e| e.lambda).fold(0.0, f64::max);
                    rows.into_iter()
                        .filter(move |e| e.lambda >= top)
                        .map(|e| e.child)
                        .collect::<Vec<_>>()
                })
                .collect()
        })
        .collect();

    let ancestors = |c: usize| -> BTreeSet<usize> {
        let mut out = BTreeSet::from([c]);
        let mut node = c;
        while let Some(&up) = parents.get(&node) {
            out.insert(up);
            node = up;
        }
        out
    };
    let merge_height = |point_cluster: usize, point_lambda: f64, c: usize| -> f64 {
        let above = ancestors(point_cluster);
        if above.contains(&c) {
            return point_lambda;
        }
        let mut prev = c;
        while let Some(&up) = parents.get(&prev) {
            if above.contains(&up) {
                return births.get(&prev).copied().unwrap_or(0.0);
            }
            prev = up;
        }
        0.0
    };

    let rows = sample_rows(tree);
    let k = clusters.len();
    let mut out = Array2::<f64>::zeros((n, k));
    for (p, &(point_cluster, point_lambda)) in rows.iter().enumerate() {
        let dist: Vec<f64> = exemplars
            .iter()
            .map(|ex| {
                let d = ex
                    .iter()
                    .map(|&e| euclidean(data.row(p), data.row(e)))
                    .fold(f64::INFINITY, f64::min);
                let inv = 1.0 / d;
                if inv.is_finite() { inv } else { f64::MAX }
            })
            .collect();
        let dist_sum: f64 = dist.iter().sum();

        let heights: Vec<f64> = clusters
            .iter()
            .map(|&c| merge_height(point_cluster, point_lambda, c))
            .collect();
        let max_lambda = deepest.get(&point_cluster).copied().unwrap_or(0.0) + 1e-8;
        let outlier: Vec<f64> = heights.iter().map(|h| max_lambda / (max_lambda - h)).collect();
        let outlier_sum: f64 = outlier.iter().sum();

        let mut combined: Vec<f64> = dist
            .iter()
            .zip(&outlier)
            .map(|(d, o)| (d / dist_sum) * (o / outlier_sum))
            .collect();
        let combined_sum: f64 = combined.iter().sum();

        let (best, best_height) = heights
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, h)| if h > acc.1 { (i, h) } else { acc });
        let best_max = deepest.get(&clusters[best]).copied().unwrap_or(0.0);
        let in_any = if best_max > 0.0 {
            (best_height / best_max).clamp(0.0, 1.0)
        } else {
            1.0
        };

        for (j, v) in combined.iter_mut().enumerate() {
            let normalized = if combined_sum > 0.0 && combined_sum.is_finite() {
                *v / combined_sum
            } else {
                1.0 / k as f64
            };
            out[[p, j]] = (normalized * in_any).clamp(0.0, 1.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::HashSet;

    fn blobs_with_outlier() -> Array2<f64> {
        array![
            [1.5, 2.2],
            [1.0, 1.1],
            [1.2, 1.4],
            [0.8, 1.0],
            [1.1, 1.0],
            [3.7, 4.0],
            [3.9, 3.9],
            [3.6, 4.1],
            [3.8, 3.9],
            [4.0, 4.1],
            [10.0, 10.0],
        ]
    }

    fn small_params() -> HdbscanParams {
        HdbscanParams {
            min_cluster_size: 3,
            min_samples: Some(2),
            ..HdbscanParams::default()
        }
    }

    #[test]
    fn test_two_clusters_and_noise() -> Result<(), HdbscanError> {
        let fit = Hdbscan::new(small_params()).fit(blobs_with_outlier().view())?;
        let first: HashSet<_> = fit.labels[..5].iter().collect();
        let second: HashSet<_> = fit.labels[5..10].iter().collect();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first, second);
        assert_eq!(fit.labels[10], -1);
        assert_eq!(fit.tree.selected().len(), 2);
        Ok(())
    }

    #[test]
    fn test_probabilities_in_unit_range() -> Result<(), HdbscanError> {
        let fit = Hdbscan::new(small_params()).fit(blobs_with_outlier().view())?;
        assert!(fit.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(fit.probabilities[10], 0.0);
        assert!(fit.membership.is_none());
        Ok(())
    }

    #[test]
    fn test_soft_membership_rows() -> Result<(), HdbscanError> {
        let params = HdbscanParams {
            prediction_data: true,
            ..small_params()
        };
        let fit = Hdbscan::new(params).fit(blobs_with_outlier().view())?;
        let membership = fit.membership.expect("prediction data requested");
        assert_eq!(membership.dim(), (11, 2));
        for row in membership.rows() {
            let sum: f64 = row.sum();
            assert!(sum <= 1.0 + 1e-9, "row sums to {sum}");
            assert!(row.iter().all(|v| (0.0..=1.0).contains(v)));
        }
        let label = usize::try_from(fit.labels[0]).expect("clustered");
        let row = membership.row(0);
        let argmax = row
            .iter()
            .enumerate()
            .fold(0, |best, (i, v)| if *v > row[best] { i } else { best });
        assert_eq!(argmax, label);
        Ok(())
    }

    #[test]
    fn test_no_selection_keeps_empty_membership() -> Result<(), HdbscanError> {
        let params = HdbscanParams {
            min_cluster_size: 10,
            prediction_data: true,
            ..HdbscanParams::default()
        };
        let data = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let fit = Hdbscan::new(params).fit(data.view())?;
        assert!(fit.labels.iter().all(|&l| l == -1));
        assert!(fit.tree.selected().is_empty());
        assert_eq!(fit.membership.map(|m| m.dim()), Some((4, 0)));
        Ok(())
    }

    #[test]
    fn test_branches_cover_selection() -> Result<(), HdbscanError> {
        let fit = Hdbscan::new(small_params()).fit(blobs_with_outlier().view())?;
        let branches = fit.tree.branches();
        assert_eq!(branches.first().map(|b| b.id), Some(fit.tree.root()));
        let labelled: Vec<i32> = branches.iter().filter_map(|b| b.label).collect();
        assert_eq!(labelled.len(), 2);
        assert!(branches.iter().all(|b| b.death >= b.birth));
        Ok(())
    }

    #[test]
    fn test_invalid_min_cluster_size() {
        let params = HdbscanParams {
            min_cluster_size: 1,
            ..HdbscanParams::default()
        };
        let err = Hdbscan::new(params)
            .fit(blobs_with_outlier().view())
            .unwrap_err();
        assert_eq!(err.to_string(), "Min cluster size must be greater than one");
    }

    #[test]
    fn test_empty_and_non_finite() {
        let empty = Array2::<f64>::zeros((0, 2));
        assert_eq!(
            Hdbscan::new(HdbscanParams::default()).fit(empty.view()).unwrap_err(),
            HdbscanError::EmptyDataset
        );
        let bad = array![[1.0, f64::NAN]];
        assert!(matches!(
            Hdbscan::new(HdbscanParams::default()).fit(bad.view()),
            Err(HdbscanError::NonFiniteInput { row: 0 })
        ));
    }

    #[test]
    fn test_duplicates_stay_finite() -> Result<(), HdbscanError> {
        let data = Array2::<f64>::zeros((12, 2));
        let fit = Hdbscan::new(small_params()).fit(data.view())?;
        assert!(fit.probabilities.iter().all(|p| p.is_finite()));
        assert!(fit.labels.iter().all(|&l| l == -1 || l == 0));
        Ok(())
    }
}
