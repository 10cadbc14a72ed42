/*
* Licensed to Elasticsearch B.V. under one or more contributor
* license agreements. See the NOTICE file distributed with
* this work for additional information regarding copyright
* ownership. Elasticsearch B.V. licenses this file to you under
* the Apache License, Version 2.0 (the "License"); you may
* not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
*  http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing,
* software distributed under the License is distributed on an
* "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
* KIND, either express or implied.  See the License for the
* specific language governing permissions and limitations
* under the License.
*/

//! # Random Projection Trees
//! A tree recursively cuts its coverage in two with a hyperplane. The hyperplane is the perpendicular
//! bisector of two points drawn from the coverage, so it tends to follow the data. For angular metrics both
//! points are normalised first and the plane passes through the origin.
//!
//! When the two draws keep landing on copies of the same point, or every point falls on one side, the
//! coverage is split into two random halves instead. Those nodes have a zero normal, so a query has no
//! preference between their children.
//!
//! Nodes are stored in a flat arena, the root is at index 0.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::errors::CanopyResult;
use vectorcloud::*;

/// How many pairs of points are drawn before giving up on a hyperplane and halving at random
const SPLIT_ATTEMPTS: usize = 3;

/// Index of the root in a tree's arena
pub(crate) const ROOT: usize = 0;

#[derive(Debug, Clone)]
pub(crate) enum TreeNode {
    Split {
        /// Unit normal, or all zeros for a random split
        normal: Vec<f32>,
        offset: f32,
        /// Positive margin side first
        children: [usize; 2],
    },
    Leaf(Vec<PointIndex>),
}

impl TreeNode {
    /// Signed distance of the point to the hyperplane
    #[inline]
    pub(crate) fn margin(normal: &[f32], offset: f32, point: &[f32]) -> f32 {
        dot(normal, point) + offset
    }
}

/// A single random projection tree over a slice of points.
#[derive(Debug, Clone)]
pub(crate) struct RpTree {
    pub(crate) nodes: Vec<TreeNode>,
}

struct Hyperplane {
    normal: Vec<f32>,
    offset: f32,
}

fn normalized(x: &[f32]) -> Vec<f32> {
    let norm = dot(x, x).sqrt();
    if norm > 0.0 {
        x.iter().map(|xi| xi / norm).collect()
    } else {
        x.to_vec()
    }
}

impl Hyperplane {
    fn between<M: Metric>(p: &[f32], q: &[f32]) -> Option<Hyperplane> {
        let (p, q) = if M::ANGULAR {
            (normalized(p), normalized(q))
        } else {
            (p.to_vec(), q.to_vec())
        };
        let diff: Vec<f32> = p.iter().zip(&q).map(|(pi, qi)| pi - qi).collect();
        let norm = dot(&diff, &diff).sqrt();
        if !(norm > f32::EPSILON) {
            return None;
        }
        let normal: Vec<f32> = diff.iter().map(|d| d / norm).collect();
        let offset = if M::ANGULAR {
            0.0
        } else {
            let midpoint: Vec<f32> = p.iter().zip(&q).map(|(pi, qi)| (pi + qi) / 2.0).collect();
            -dot(&normal, &midpoint)
        };
        Some(Hyperplane { normal, offset })
    }
}

impl RpTree {
    /// Builds a tree over the whole slice.
    pub(crate) fn build<M: Metric>(
        data: &DataRam<M>,
        leaf_cutoff: usize,
        rng: &mut SmallRng,
    ) -> CanopyResult<RpTree> {
        let leaf_cutoff = leaf_cutoff.max(1);
        let mut nodes = vec![TreeNode::Leaf(Vec::new())];
        let mut unfinished = vec![(ROOT, data.reference_indexes())];
        while let Some((slot, covered)) = unfinished.pop() {
            if covered.len() <= leaf_cutoff {
                nodes[slot] = TreeNode::Leaf(covered);
                continue;
            }
            let (plane, positive, negative) = RpTree::split(data, covered, rng)?;
            let children = [nodes.len(), nodes.len() + 1];
            nodes.push(TreeNode::Leaf(Vec::new()));
            nodes.push(TreeNode::Leaf(Vec::new()));
            nodes[slot] = TreeNode::Split {
                normal: plane.normal,
                offset: plane.offset,
                children,
            };
            unfinished.push((children[0], positive));
            unfinished.push((children[1], negative));
        }
        Ok(RpTree { nodes })
    }

    /// Splits a coverage of at least 2 points into two non-empty sides.
    fn split<M: Metric>(
        data: &DataRam<M>,
        mut covered: Vec<PointIndex>,
        rng: &mut SmallRng,
    ) -> CanopyResult<(Hyperplane, Vec<PointIndex>, Vec<PointIndex>)> {
        let len = covered.len();
        for _ in 0..SPLIT_ATTEMPTS {
            let a = rng.gen_range(0..len);
            let mut b = rng.gen_range(0..len - 1);
            if b >= a {
                b += 1;
            }
            let plane = match Hyperplane::between::<M>(data.point(covered[a])?, data.point(covered[b])?)
            {
                Some(plane) => plane,
                None => continue,
            };
            let mut positive = Vec::with_capacity(len / 2);
            let mut negative = Vec::with_capacity(len / 2);
            for i in &covered {
                if TreeNode::margin(&plane.normal, plane.offset, data.point(*i)?) > 0.0 {
                    positive.push(*i);
                } else {
                    negative.push(*i);
                }
            }
            if !positive.is_empty() && !negative.is_empty() {
                return Ok((plane, positive, negative));
            }
        }
        covered.shuffle(rng);
        let negative = covered.split_off(len / 2);
        let plane = Hyperplane {
            normal: vec![0.0; data.dim()],
            offset: 0.0,
        };
        Ok((plane, covered, negative))
    }

    /// All points under a node
    #[cfg(test)]
    pub(crate) fn covered(&self, node: usize) -> Vec<PointIndex> {
        let mut covered = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            match &self.nodes[n] {
                TreeNode::Leaf(indexes) => covered.extend_from_slice(indexes),
                TreeNode::Split { children, .. } => stack.extend_from_slice(children),
            }
        }
        covered
    }

    /// Depth of the deepest leaf, the root alone has depth 0
    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(ROOT, 0)];
        while let Some((n, depth)) = stack.pop() {
            match &self.nodes[n] {
                TreeNode::Leaf(..) => max_depth = max_depth.max(depth),
                TreeNode::Split { children, .. } => {
                    stack.push((children[0], depth + 1));
                    stack.push((children[1], depth + 1));
                }
            }
        }
        max_depth
    }
}
