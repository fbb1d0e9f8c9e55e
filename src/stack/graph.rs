use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::resources::BucketEncryption;

use super::{Declaration, Stack};

/// result of ordering a stack's declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyOrder {
    /// node ids, every node after all of its dependencies.
    pub order: Vec<String>,
    /// whether the order things were declared in already satisfies the graph.
    pub declaration_order_is_topological: bool,
}

/// nodes are declarations in declaration order. `deps[i]` are the indices node `i` needs first.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    deps: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    /// resolves every reference of every declaration. fails on the first
    /// reference that points nowhere or at the wrong kind of resource.
    pub fn build(stack: &Stack) -> Result<Self> {
        let declarations = stack.declarations();
        let nodes: Vec<String> = declarations.iter().map(Declaration::node_id).collect();
        let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        let mut deps = vec![BTreeSet::new(); nodes.len()];

        for (i, decl) in declarations.iter().enumerate() {
            for reference in decl.references() {
                let target = *index.get(reference.logical_id.as_str()).ok_or_else(|| Error::UnresolvedReference {
                    from: nodes[i].clone(),
                    to: reference.logical_id.clone(),
                })?;
                let found = declarations[target].kind();
                if found != Some(reference.kind) {
                    return Err(Error::WrongReferenceKind {
                        from: nodes[i].clone(),
                        to: reference.logical_id.clone(),
                        expected: reference.kind.to_string(),
                        found: found.map(|k| k.to_string()).unwrap_or_else(|| "grant".into()),
                    });
                }
                deps[i].insert(target);
            }
        }

        // a distribution depends on every grant that lets its origin identity
        // read its bucket or decrypt that bucket's key.
        for (i, decl) in declarations.iter().enumerate() {
            let Declaration::Distribution(distribution) = decl else { continue };
            let origin = &distribution.default_behavior.origin;
            let bucket_key = stack.bucket(origin.bucket.logical_id()).and_then(|b| match &b.encryption {
                BucketEncryption::Kms(key) => Some(key.logical_id().to_string()),
                _ => None,
            });
            for (g, other) in declarations.iter().enumerate() {
                let Declaration::Grant(grant) = other else { continue };
                if grant.grantee() != &origin.origin_access_identity {
                    continue;
                }
                let target = grant.target().logical_id;
                if target == origin.bucket.logical_id() || Some(&target) == bucket_key.as_ref() {
                    deps[i].insert(g);
                }
            }
        }

        Ok(Self { nodes, deps })
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn dependencies(&self, node: &str) -> Vec<&str> {
        match self.nodes.iter().position(|n| n == node) {
            Some(i) => self.deps[i].iter().map(|d| self.nodes[*d].as_str()).collect(),
            None => vec![],
        }
    }

    /// true if `from` needs `to` directly or through other nodes.
    pub fn depends_on(&self, from: &str, to: &str) -> bool {
        let (Some(start), Some(goal)) = (
            self.nodes.iter().position(|n| n == from),
            self.nodes.iter().position(|n| n == to),
        ) else {
            return false;
        };
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            for d in &self.deps[n] {
                if *d == goal {
                    return true;
                }
                if seen.insert(*d) {
                    stack.push(*d);
                }
            }
        }
        false
    }

    /// Kahn's algorithm. among ready nodes the earliest declared goes first,
    /// so an already valid declaration order comes back unchanged.
    pub fn topological_order(&self) -> Result<DependencyOrder> {
        let n = self.nodes.len();
        let mut remaining: Vec<usize> = self.deps.iter().map(BTreeSet::len).collect();
        let mut dependents = vec![vec![]; n];
        for (i, deps) in self.deps.iter().enumerate() {
            for d in deps {
                dependents[*d].push(i);
            }
        }
        let mut ready: BTreeSet<usize> = (0..n).filter(|i| remaining[*i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for dependent in &dependents[next] {
                remaining[*dependent] -= 1;
                if remaining[*dependent] == 0 {
                    ready.insert(*dependent);
                }
            }
        }
        if order.len() != n {
            let done: BTreeSet<usize> = order.iter().copied().collect();
            return Err(Error::DependencyCycle(self.find_cycle(&done)));
        }
        let declaration_order_is_topological = self.is_valid_order(&(0..n).collect::<Vec<_>>());
        Ok(DependencyOrder {
            order: order.into_iter().map(|i| self.nodes[i].clone()).collect(),
            declaration_order_is_topological,
        })
    }

    pub fn is_valid_order(&self, order: &[usize]) -> bool {
        let mut position = vec![usize::MAX; self.nodes.len()];
        for (pos, node) in order.iter().enumerate() {
            if let Some(slot) = position.get_mut(*node) {
                *slot = pos;
            }
        }
        if position.contains(&usize::MAX) {
            return false;
        }
        self.deps
            .iter()
            .enumerate()
            .all(|(i, deps)| deps.iter().all(|d| position[*d] < position[i]))
    }

    /// every node kahn could not place still waits on another such node,
    /// so walking unplaced dependencies must loop.
    fn find_cycle(&self, done: &BTreeSet<usize>) -> Vec<String> {
        let Some(start) = (0..self.nodes.len()).find(|i| !done.contains(i)) else {
            return vec![];
        };
        let mut path = vec![start];
        let mut current = start;
        loop {
            let Some(next) = self.deps[current].iter().copied().find(|d| !done.contains(d)) else {
                break;
            };
            if let Some(pos) = path.iter().position(|p| *p == next) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|i| self.nodes[*i].clone()).collect();
                cycle.push(self.nodes[next].clone());
                return cycle;
            }
            path.push(next);
            current = next;
        }
        path.into_iter().map(|i| self.nodes[i].clone()).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn graph(nodes: &[&str], edges: &[(usize, usize)]) -> DependencyGraph {
        let mut deps = vec![BTreeSet::new(); nodes.len()];
        for (from, to) in edges {
            deps[*from].insert(*to);
        }
        DependencyGraph { nodes: nodes.iter().map(|n| n.to_string()).collect(), deps }
    }

    #[test]
    fn ready_nodes_keep_declaration_order() {
        let g = graph(&["a", "b", "c"], &[(2, 0)]);
        let order = g.topological_order().unwrap();
        assert_eq!(order.order, vec!["a", "b", "c"]);
        assert!(order.declaration_order_is_topological);
    }

    #[test]
    fn dependencies_move_ahead() {
        let g = graph(&["a", "b", "c"], &[(0, 2), (1, 0)]);
        let order = g.topological_order().unwrap();
        assert_eq!(order.order, vec!["c", "a", "b"]);
        assert!(!order.declaration_order_is_topological);
        assert!(g.depends_on("b", "c"));
        assert_eq!(g.dependencies("a"), vec!["c"]);
    }

    #[test]
    fn cycle_is_named() {
        let g = graph(&["free", "x", "y", "z"], &[(1, 2), (2, 3), (3, 1)]);
        match g.topological_order().unwrap_err() {
            Error::DependencyCycle(cycle) => {
                assert_eq!(cycle, vec!["x", "y", "z", "x"]);
            }
            e => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn partial_orders_are_invalid() {
        let g = graph(&["a", "b"], &[]);
        assert!(!g.is_valid_order(&[0]));
        assert!(g.is_valid_order(&[1, 0]));
    }
}
