use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use super::Row;
use crate::features::N_FEATURES;

/// Values closer than this are treated as equal when placing thresholds.
const FEATURE_THRESHOLD: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Drives the per-node feature order, which decides ties between equally good splits.
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

/// A node in the flat tree. Samples go left when `x[feature] <= threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Split {
        feature: u32,
        threshold: f64,
        left: u32,
        right: u32,
    },
    Leaf(f64),
}

/// Squared-error regression tree. Node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    nodes: Vec<Node>,
}

impl DecisionTreeRegressor {
    /// Caller guarantees `rows` is non-empty and as long as `targets`.
    pub fn fit(rows: &[Row], targets: &[f64], params: &TreeParams) -> Self {
        let mut builder = Builder {
            rows,
            targets,
            params,
            rng: StdRng::seed_from_u64(params.seed),
            nodes: Vec::new(),
        };
        let mut idx: Vec<usize> = (0..rows.len()).collect();
        builder.grow(&mut idx, 0);
        Self {
            nodes: builder.nodes,
        }
    }

    pub fn predict(&self, row: &Row) -> f64 {
        let mut i = 0usize;
        loop {
            match &self.nodes[i] {
                Node::Leaf(v) => return *v,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if row[*feature as usize] <= *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf(_))).count()
    }

    /// Edges on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], i: usize) -> usize {
            match &nodes[i] {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => {
                    1 + walk(nodes, *left as usize).max(walk(nodes, *right as usize))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Structural check run after decoding a stored tree.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        let n = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature as usize >= N_FEATURES {
                    return Err(format!("node {i} splits on unknown feature {feature}"));
                }
                // children are always allocated after their parent
                for child in [*left as usize, *right as usize] {
                    if child <= i || child >= n {
                        return Err(format!("node {i} has invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}

struct Builder<'a> {
    rows: &'a [Row],
    targets: &'a [f64],
    params: &'a TreeParams,
    rng: StdRng,
    nodes: Vec<Node>,
}

impl Builder<'_> {
    fn grow(&mut self, idx: &mut [usize], depth: usize) -> u32 {
        let id = self.nodes.len() as u32;
        let n = idx.len() as f64;
        let mean = idx.iter().map(|&i| self.targets[i]).sum::<f64>() / n;
        self.nodes.push(Node::Leaf(mean));

        if depth >= self.params.max_depth
            || idx.len() < self.params.min_samples_split
            || idx.len() < 2 * self.params.min_samples_leaf.max(1)
        {
            return id;
        }
        let impurity = idx
            .iter()
            .map(|&i| (self.targets[i] - mean).powi(2))
            .sum::<f64>()
            / n;
        if impurity <= f64::EPSILON {
            return id;
        }

        let Some((feature, threshold)) = self.best_split(idx) else {
            return id;
        };

        let rows = self.rows;
        idx.sort_by_key(|&i| rows[i][feature] > threshold);
        let mid = idx.partition_point(|&i| rows[i][feature] <= threshold);
        let (left_idx, right_idx) = idx.split_at_mut(mid);
        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[id as usize] = Node::Split {
            feature: feature as u32,
            threshold,
            left,
            right,
        };
        id
    }

    /// Maximizes `S_l^2/n_l + S_r^2/n_r`, which is equivalent to minimizing
    /// the children's summed squared error.
    fn best_split(&mut self, idx: &[usize]) -> Option<(usize, f64)> {
        let mut features: Vec<usize> = (0..N_FEATURES).collect();
        features.shuffle(&mut self.rng);

        let n = idx.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = idx.iter().map(|&i| self.targets[i]).sum();
        let mut order = idx.to_vec();
        let mut best: Option<(usize, f64)> = None;
        let mut best_proxy = f64::NEG_INFINITY;

        for f in features {
            order.sort_by(|&a, &b| self.rows[a][f].total_cmp(&self.rows[b][f]));
            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += self.targets[order[k - 1]];
                let lo = self.rows[order[k - 1]][f];
                let hi = self.rows[order[k]][f];
                if hi <= lo + FEATURE_THRESHOLD || k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let right_sum = total - left_sum;
                let proxy =
                    left_sum * left_sum / k as f64 + right_sum * right_sum / (n - k) as f64;
                if proxy > best_proxy {
                    best_proxy = proxy;
                    let mut threshold = lo / 2.0 + hi / 2.0;
                    if threshold == hi || !threshold.is_finite() {
                        threshold = lo;
                    }
                    best = Some((f, threshold));
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Row>, Vec<f64>) {
        let rows: Vec<Row> = (0..20).map(|i| [i as f64, 0.0, 0.0]).collect();
        let targets = rows.iter().map(|r| if r[0] < 10.0 { 1.0 } else { 5.0 }).collect();
        (rows, targets)
    }

    #[test]
    fn learns_a_step_function() {
        let (rows, targets) = step_data();
        let tree = DecisionTreeRegressor::fit(&rows, &targets, &TreeParams::default());
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.depth(), 1);
        match &tree.nodes()[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 9.5);
            }
            other => panic!("expected split at root, got {other:?}"),
        }
        assert_eq!(tree.predict(&[3.0, 0.0, 0.0]), 1.0);
        assert_eq!(tree.predict(&[9.5, 0.0, 0.0]), 1.0);
        assert_eq!(tree.predict(&[12.0, 0.0, 0.0]), 5.0);
    }

    #[test]
    fn constant_target_is_a_single_leaf() {
        let rows: Vec<Row> = (0..8).map(|i| [i as f64, 1.0, 2.0]).collect();
        let tree = DecisionTreeRegressor::fit(&rows, &[4.0; 8], &TreeParams::default());
        assert_eq!(tree.nodes(), &[Node::Leaf(4.0)]);
    }

    #[test]
    fn depth_is_bounded() {
        let rows: Vec<Row> = (0..512).map(|i| [i as f64, (i % 7) as f64, 0.0]).collect();
        let targets: Vec<f64> = (0..512).map(|i| ((i * 37) % 101) as f64).collect();
        let params = TreeParams {
            max_depth: 4,
            ..TreeParams::default()
        };
        let tree = DecisionTreeRegressor::fit(&rows, &targets, &params);
        assert!(tree.depth() <= 4);
        assert!(tree.n_leaves() <= 16);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn identical_rows_cannot_be_split() {
        let rows = vec![[1.0, 1.0, 1.0]; 4];
        let tree = DecisionTreeRegressor::fit(&rows, &[0.0, 2.0, 4.0, 6.0], &TreeParams::default());
        assert_eq!(tree.nodes(), &[Node::Leaf(3.0)]);
    }

    #[test]
    fn fit_is_reproducible() {
        let rows: Vec<Row> = (0..200)
            .map(|i| [(i % 24) as f64, (i % 7) as f64, (i % 13) as f64 * 15.0])
            .collect();
        let targets: Vec<f64> = (0..200).map(|i| ((i * 7919) % 61) as f64).collect();
        let a = DecisionTreeRegressor::fit(&rows, &targets, &TreeParams::default());
        let b = DecisionTreeRegressor::fit(&rows, &targets, &TreeParams::default());
        assert_eq!(a, b);
    }

    #[test]
    fn min_samples_leaf_is_respected() {
        let (rows, targets) = step_data();
        let params = TreeParams {
            min_samples_leaf: 15,
            ..TreeParams::default()
        };
        let tree = DecisionTreeRegressor::fit(&rows, &targets, &params);
        assert_eq!(tree.n_leaves(), 1);
    }
}
