//! Connectivity utilities over the system link graph.
//!
//! Used at generation time (component repair) and at resolution time (friendly-territory
//! transfers). The graph is a flat id → neighbours map, so plain BFS with a visited set is enough.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use starfall_protocol::SystemId;

/// Undirected adjacency between systems. Every link is stored in both directions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkGraph {
    adjacency: BTreeMap<SystemId, BTreeSet<SystemId>>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an undirected link. Self-links are ignored.
    pub fn link(&mut self, a: SystemId, b: SystemId) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    /// Register a node with no links yet.
    pub fn add_node(&mut self, id: SystemId) {
        self.adjacency.entry(id).or_default();
    }

    pub fn are_linked(&self, a: SystemId, b: SystemId) -> bool {
        self.adjacency.get(&a).is_some_and(|n| n.contains(&b))
    }

    pub fn neighbors(&self, id: SystemId) -> impl Iterator<Item = SystemId> + '_ {
        self.adjacency.get(&id).into_iter().flatten().copied()
    }

    pub fn degree(&self, id: SystemId) -> usize {
        self.adjacency.get(&id).map_or(0, BTreeSet::len)
    }

    pub fn nodes(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Each undirected link once, as `(lower, higher)`.
    pub fn edges(&self) -> Vec<(SystemId, SystemId)> {
        self.adjacency
            .iter()
            .flat_map(|(&a, ns)| ns.iter().filter(move |&&b| a < b).map(move |&b| (a, b)))
            .collect()
    }

    /// Rebuild the graph with ids passed through `remap`; links touching unmapped ids are dropped.
    pub fn remapped(&self, remap: &HashMap<SystemId, SystemId>) -> LinkGraph {
        let mut out = LinkGraph::new();
        for (&a, ns) in &self.adjacency {
            let Some(&na) = remap.get(&a) else { continue };
            out.add_node(na);
            for b in ns {
                if let Some(&nb) = remap.get(b) {
                    out.link(na, nb);
                }
            }
        }
        out
    }
}

/// Disjoint-set forest over dense indices.
#[derive(Clone, Debug)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    /// Merge the sets containing `a` and `b`. Returns false if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        true
    }
}

/// Connected components among `nodes`, each sorted, ordered by their smallest member.
pub fn connected_components(graph: &LinkGraph, nodes: &[SystemId]) -> Vec<Vec<SystemId>> {
    let index: HashMap<SystemId, usize> = nodes.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let mut uf = UnionFind::new(nodes.len());

    for (i, &id) in nodes.iter().enumerate() {
        for n in graph.neighbors(id) {
            if let Some(&j) = index.get(&n) {
                uf.union(i, j);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<SystemId>> = BTreeMap::new();
    for (i, &id) in nodes.iter().enumerate() {
        groups.entry(uf.find(i)).or_default().push(id);
    }

    let mut components: Vec<Vec<SystemId>> = groups
        .into_values()
        .map(|mut c| {
            c.sort();
            c
        })
        .collect();
    components.sort_by_key(|c| c[0]);
    components
}

pub fn is_connected(graph: &LinkGraph, nodes: &[SystemId]) -> bool {
    connected_components(graph, nodes).len() <= 1
}

/// Breadth-first reachability from `from` to `to`, stepping only onto nodes that satisfy
/// `passable` (the endpoints included). Bounded by the node count.
pub fn reachable_through(
    graph: &LinkGraph,
    from: SystemId,
    to: SystemId,
    passable: impl Fn(SystemId) -> bool,
) -> bool {
    if !passable(from) || !passable(to) {
        return false;
    }
    if from == to {
        return true;
    }

    let mut visited: BTreeSet<SystemId> = BTreeSet::new();
    let mut queue = VecDeque::new();
    visited.insert(from);
    queue.push_back(from);

    while let Some(current) = queue.pop_front() {
        for next in graph.neighbors(current) {
            if next == to {
                return true;
            }
            if passable(next) && visited.insert(next) {
                queue.push_back(next);
            }
        }
        if visited.len() > graph.node_count() {
            break;
        }
    }
    false
}
