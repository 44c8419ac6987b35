//! Dependency graph over entity references.
//!
//! An edge `a → b` means `a` holds a foreign key to `b` and depends on it.
//! Cycles are allowed: foreign keys are added in their own phase after every
//! table exists, so the graph only has to produce a reasonable processing
//! order, never a strict topological one.

use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// node → nodes it depends on
    edges: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: impl Into<String>) {
        self.edges.entry(node.into()).or_default();
    }

    /// Record that `from` depends on `to`. Unknown nodes are ignored.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> bool {
        if !self.edges.contains_key(to) {
            return false;
        }
        match self.edges.get_mut(from) {
            Some(deps) => deps.insert(to.to_string()),
            None => false,
        }
    }

    pub fn dependencies_of(&self, node: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(node)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Every node exactly once, dependencies before dependents.
    ///
    /// Within a cycle the order follows insertion order.
    pub fn overall_order(&self) -> Vec<&str> {
        let mut visited: IndexSet<&str> = IndexSet::new();
        let mut order = Vec::with_capacity(self.edges.len());
        // node and the position of its next dependency
        let mut stack: Vec<(&str, usize)> = Vec::new();

        for root in self.edges.keys() {
            if !visited.insert(root.as_str()) {
                continue;
            }
            stack.push((root.as_str(), 0));
            while let Some((node, next)) = stack.last_mut() {
                match self.edges[*node].get_index(*next) {
                    Some(dep) => {
                        *next += 1;
                        if visited.insert(dep.as_str()) {
                            stack.push((dep.as_str(), 0));
                        }
                    }
                    None => {
                        order.push(*node);
                        stack.pop();
                    }
                }
            }
        }
        order
    }

    /// Strongly connected components that form a cycle (including self loops).
    pub fn cycles(&self) -> Vec<Vec<&str>> {
        let mut tarjan = Tarjan {
            graph: self,
            index: 0,
            indices: IndexMap::new(),
            lowlink: IndexMap::new(),
            stack: Vec::new(),
            on_stack: IndexSet::new(),
            work: Vec::new(),
            cycles: Vec::new(),
        };
        for node in self.edges.keys() {
            if !tarjan.indices.contains_key(node.as_str()) {
                tarjan.connect(node);
            }
        }
        tarjan.cycles
    }
}

struct Tarjan<'a> {
    graph: &'a DependencyGraph,
    index: usize,
    indices: IndexMap<&'a str, usize>,
    lowlink: IndexMap<&'a str, usize>,
    stack: Vec<&'a str>,
    on_stack: IndexSet<&'a str>,
    /// Explicit call stack: node and the position of its next dependency.
    work: Vec<(&'a str, usize)>,
    cycles: Vec<Vec<&'a str>>,
}

impl<'a> Tarjan<'a> {
    fn enter(&mut self, node: &'a str) {
        self.indices.insert(node, self.index);
        self.lowlink.insert(node, self.index);
        self.index += 1;
        self.stack.push(node);
        self.on_stack.insert(node);
        self.work.push((node, 0));
    }

    fn connect(&mut self, root: &'a str) {
        let graph = self.graph;
        self.enter(root);

        while let Some(&(node, next)) = self.work.last() {
            if let Some(dep) = graph.edges[node].get_index(next) {
                let dep = dep.as_str();
                if let Some(top) = self.work.last_mut() {
                    top.1 += 1;
                }
                if !self.indices.contains_key(dep) {
                    self.enter(dep);
                } else if self.on_stack.contains(dep) {
                    let low = self.indices[dep].min(self.lowlink[node]);
                    self.lowlink.insert(node, low);
                }
                continue;
            }

            self.work.pop();
            if self.lowlink[node] == self.indices[node] {
                self.close_component(node);
            }
            if let Some(&(parent, _)) = self.work.last() {
                let low = self.lowlink[node].min(self.lowlink[parent]);
                self.lowlink.insert(parent, low);
            }
        }
    }

    fn close_component(&mut self, node: &'a str) {
        let mut component = Vec::new();
        while let Some(member) = self.stack.pop() {
            self.on_stack.swap_remove(member);
            component.push(member);
            if member == node {
                break;
            }
        }
        let self_loop = self.graph.dependencies_of(node).any(|d| d == node);
        if component.len() > 1 || self_loop {
            component.reverse();
            self.cycles.push(component);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.add_node(*n);
        }
        for (from, to) in edges {
            g.add_dependency(from, to);
        }
        g
    }

    #[test]
    fn test_dependencies_come_first() {
        let g = graph(
            &["product", "category", "shop"],
            &[("product", "category"), ("category", "shop")],
        );
        assert_eq!(g.overall_order(), vec!["shop", "category", "product"]);
        assert!(g.cycles().is_empty());
    }

    #[test]
    fn test_cycle_is_tolerated() {
        let g = graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert_eq!(g.overall_order(), vec!["b", "a"]);
        assert_eq!(g.cycles(), vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let g = graph(&["category"], &[("category", "category")]);
        assert_eq!(g.overall_order(), vec!["category"]);
        assert_eq!(g.cycles(), vec![vec!["category"]]);
    }

    #[test]
    fn test_unknown_targets_are_ignored() {
        let mut g = graph(&["order"], &[]);
        assert!(!g.add_dependency("order", "customer"));
        assert_eq!(g.dependencies_of("order").count(), 0);
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let names: Vec<String> = (0..200_000).map(|i| format!("e{i}")).collect();
        let mut g = DependencyGraph::new();
        for name in names.iter().rev() {
            g.add_node(name.clone());
        }
        for pair in names.windows(2) {
            g.add_dependency(&pair[1], &pair[0]);
        }
        // closes the chain into one big cycle
        g.add_dependency(&names[0], &names[names.len() - 1]);

        let order = g.overall_order();
        assert_eq!(order.len(), names.len());
        let cycles = g.cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), names.len());
    }

    fn arbitrary_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (1usize..12).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..30)))
    }

    proptest! {
        #[test]
        fn order_covers_every_node_once((n, edges) in arbitrary_graph()) {
            let names: Vec<String> = (0..n).map(|i| format!("e{i}")).collect();
            let mut g = DependencyGraph::new();
            for name in &names {
                g.add_node(name.clone());
            }
            for (from, to) in &edges {
                g.add_dependency(&names[*from], &names[*to]);
            }

            let order = g.overall_order();
            prop_assert_eq!(order.len(), n);
            let unique: IndexSet<_> = order.iter().collect();
            prop_assert_eq!(unique.len(), n);
        }

        #[test]
        fn acyclic_order_respects_edges((n, edges) in arbitrary_graph()) {
            let names: Vec<String> = (0..n).map(|i| format!("e{i}")).collect();
            let mut g = DependencyGraph::new();
            for name in &names {
                g.add_node(name.clone());
            }
            // only keep edges pointing at lower indices, so the graph is a DAG
            for (from, to) in edges.iter().filter(|(f, t)| t < f) {
                g.add_dependency(&names[*from], &names[*to]);
            }

            prop_assert!(g.cycles().is_empty());
            let order = g.overall_order();
            let position = |name: &str| order.iter().position(|n| *n == name);
            for (from, to) in edges.iter().filter(|(f, t)| t < f) {
                prop_assert!(position(&names[*to]) < position(&names[*from]));
            }
        }
    }
}
