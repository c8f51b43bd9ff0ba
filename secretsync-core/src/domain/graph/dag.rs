// secretsync-core/src/domain/graph/dag.rs

use crate::domain::error::DomainError;
use crate::domain::secret::{merge, merge_n, SecretValue};
use crate::domain::target::TargetSpec;
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Done,
}

/// The target inheritance/import graph (§4.9). Each target may `inherit`
/// from at most one parent and `import` zero or more merge streams; both
/// relationships are dependency edges that must form a DAG.
pub struct DependencyGraph {
    nodes: HashMap<String, TargetSpec>,
}

impl DependencyGraph {
    pub fn build(targets: Vec<TargetSpec>) -> Result<Self, DomainError> {
        let nodes = targets.into_iter().map(|t| (t.name.clone(), t)).collect();
        let graph = Self { nodes };
        graph.detect_cycle()?;
        Ok(graph)
    }

    pub fn get(&self, name: &str) -> Option<&TargetSpec> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The dependency names of `name`: its `inherits` parent (if any)
    /// followed by its `imports`, in declaration order.
    fn edges(&self, name: &str) -> Vec<String> {
        let mut deps = Vec::new();
        if let Some(target) = self.nodes.get(name) {
            if let Some(parent) = &target.inherits {
                deps.push(parent.clone());
            }
            deps.extend(target.imports.iter().cloned());
        }
        deps
    }

    fn detect_cycle(&self) -> Result<(), DomainError> {
        let mut state: HashMap<String, VisitState> = HashMap::new();
        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        for name in names {
            if !state.contains_key(name) {
                let mut stack = Vec::new();
                self.visit(name, &mut state, &mut stack)?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        name: &str,
        state: &mut HashMap<String, VisitState>,
        stack: &mut Vec<String>,
    ) -> Result<(), DomainError> {
        state.insert(name.to_string(), VisitState::Visiting);
        stack.push(name.to_string());

        for dep in self.edges(name) {
            // A dependency pointing outside the known target set (e.g. a
            // merge stream, not a target) is not part of this graph.
            if !self.nodes.contains_key(&dep) {
                continue;
            }
            match state.get(&dep) {
                Some(VisitState::Visiting) => {
                    let start = stack.iter().position(|n| n == &dep).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(dep);
                    return Err(DomainError::CyclicDependency(cycle));
                }
                Some(VisitState::Done) => {}
                None => self.visit(&dep, state, stack)?,
            }
        }

        stack.pop();
        state.insert(name.to_string(), VisitState::Done);
        Ok(())
    }

    /// A deterministic topological order: dependencies before dependents,
    /// ties broken by name.
    pub fn topological_order(&self) -> Result<Vec<String>, DomainError> {
        let mut in_degree: HashMap<String, usize> = self.nodes.keys().map(|n| (n.clone(), 0)).collect();
        let mut adjacency: HashMap<String, Vec<String>> = self.nodes.keys().map(|n| (n.clone(), Vec::new())).collect();

        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        for name in names {
            for dep in self.edges(name) {
                if self.nodes.contains_key(&dep) {
                    adjacency.entry(dep).or_default().push(name.clone());
                    *in_degree.entry(name.clone()).or_insert(0) += 1;
                }
            }
        }

        let mut ready: Vec<String> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(name, _)| name.clone())
            .collect();
        ready.sort();
        let mut queue: VecDeque<String> = ready.into();

        let mut order = Vec::new();
        while let Some(current) = queue.pop_front() {
            order.push(current.clone());
            if let Some(neighbors) = adjacency.get(&current) {
                let mut newly_ready = Vec::new();
                for neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            newly_ready.push(neighbor.clone());
                        }
                    }
                }
                newly_ready.sort();
                for name in newly_ready {
                    queue.push_back(name);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(DomainError::CyclicDependency(self.nodes.keys().cloned().collect()));
        }
        Ok(order)
    }

    /// Like `topological_order`, but grouped into waves: every node with
    /// zero remaining in-degree is collected into one wave before any node
    /// depending on them is considered. Nodes within a wave share no edge
    /// between them, so the orchestrator may run them concurrently while
    /// still processing waves in order (§4.11).
    pub fn topological_levels(&self) -> Result<Vec<Vec<String>>, DomainError> {
        let mut in_degree: HashMap<String, usize> = self.nodes.keys().map(|n| (n.clone(), 0)).collect();
        let mut adjacency: HashMap<String, Vec<String>> = self.nodes.keys().map(|n| (n.clone(), Vec::new())).collect();

        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        for name in names {
            for dep in self.edges(name) {
                if self.nodes.contains_key(&dep) {
                    adjacency.entry(dep).or_default().push(name.clone());
                    *in_degree.entry(name.clone()).or_insert(0) += 1;
                }
            }
        }

        let mut remaining = in_degree;
        let mut levels = Vec::new();
        let mut processed = 0usize;

        loop {
            let mut wave: Vec<String> = remaining
                .iter()
                .filter(|(_, &degree)| degree == 0)
                .map(|(name, _)| name.clone())
                .collect();
            if wave.is_empty() {
                break;
            }
            wave.sort();
            for name in &wave {
                remaining.remove(name);
            }
            for name in &wave {
                if let Some(neighbors) = adjacency.get(name) {
                    for neighbor in neighbors {
                        if let Some(degree) = remaining.get_mut(neighbor) {
                            *degree -= 1;
                        }
                    }
                }
            }
            processed += wave.len();
            levels.push(wave);
        }

        if processed != self.nodes.len() {
            return Err(DomainError::CyclicDependency(self.nodes.keys().cloned().collect()));
        }
        Ok(levels)
    }

    /// Resolves the effective secret state for one target: deep-merge the
    /// parent's already-resolved state with each imported stream's current
    /// contents (in declaration order), then overlay `target.overrides` —
    /// overrides always win, regardless of what inheritance produced.
    pub fn resolve_target(
        &self,
        name: &str,
        resolved_parents: &HashMap<String, SecretValue>,
        stream_contents: &HashMap<String, SecretValue>,
    ) -> Result<SecretValue, DomainError> {
        let target = self
            .nodes
            .get(name)
            .ok_or_else(|| DomainError::TargetNotFound(name.to_string()))?;

        let mut sources: Vec<SecretValue> = Vec::new();
        if let Some(parent) = &target.inherits {
            sources.push(
                resolved_parents
                    .get(parent)
                    .cloned()
                    .unwrap_or_else(|| SecretValue::Object(serde_json::Map::new())),
            );
        }
        for stream in &target.imports {
            // An import names either a merge stream or another target;
            // streams take priority since a target importing a sibling is
            // the less common case and stream names are not expected to
            // collide with target names in a well-formed config.
            sources.push(
                stream_contents
                    .get(stream)
                    .or_else(|| resolved_parents.get(stream))
                    .cloned()
                    .unwrap_or_else(|| SecretValue::Object(serde_json::Map::new())),
            );
        }

        let merged = merge_n(sources.iter());
        Ok(merge(&merged, &target.overrides))
    }
}
