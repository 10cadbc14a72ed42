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

use std::cmp::Ordering;

/// A forest node waiting to be explored. The priority is the smallest margin between the query and the
/// hyperplanes on the path to this node, so the node the query sits deepest inside comes out first.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueryNode {
    pub(crate) priority: f32,
    pub(crate) tree: usize,
    pub(crate) node: usize,
}

impl PartialEq for QueryNode {
    fn eq(&self, other: &QueryNode) -> bool {
        self.priority == other.priority && self.tree == other.tree && self.node == other.node
    }
}

impl Eq for QueryNode {}

impl Ord for QueryNode {
    fn cmp(&self, other: &QueryNode) -> Ordering {
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
            // Ties go to the earlier tree, then the earlier node, so queries are deterministic
            .then_with(|| other.tree.cmp(&self.tree))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for QueryNode {
    fn partial_cmp(&self, other: &QueryNode) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A point and its distance to the query. Sorted by distance so the max-heap's top is the furthest point kept.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QuerySingleton {
    pub(crate) dist: f32,
    pub(crate) index: usize,
}

impl QuerySingleton {
    pub(crate) fn new(index: usize, dist: f32) -> QuerySingleton {
        QuerySingleton { dist, index }
    }
}

impl PartialEq for QuerySingleton {
    fn eq(&self, other: &QuerySingleton) -> bool {
        self.dist == other.dist && self.index == other.index
    }
}

impl Eq for QuerySingleton {}

impl Ord for QuerySingleton {
    fn cmp(&self, other: &QuerySingleton) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for QuerySingleton {
    fn partial_cmp(&self, other: &QuerySingleton) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
