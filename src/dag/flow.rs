//! FlowGraph - DAG structure built from `depends_on` edges
//!
//! - Arc<str> for zero-cost cloning of task names
//! - FxHashMap for faster hashing (non-crypto)
//! - SmallVec for stack-allocated small dependency lists (0-4 items)
//!
//! DAG Validation:
//! - Cycle detection using DFS three-color algorithm
//! - Level computation using Kahn's algorithm

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::ast::WorkflowDefinition;
use crate::error::{DuckflowError, Result};

/// Stack-allocated deps: most tasks have 0-4 dependencies
pub type DepVec = SmallVec<[Arc<str>; 4]>;

/// Graph of task dependencies for one workflow
///
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    workflow: Arc<str>,
    /// task -> dependents
    adjacency: FxHashMap<Arc<str>, DepVec>,
    /// task -> dependencies
    predecessors: FxHashMap<Arc<str>, DepVec>,
    /// All task names in declaration order
    task_names: Vec<Arc<str>>,
    task_set: FxHashSet<Arc<str>>,
}

impl FlowGraph {
    /// Build from a definition.
    ///
    /// Edges to names that are not tasks of the workflow are ignored here;
    /// `validate_definition` reports them.
    pub fn from_definition(definition: &WorkflowDefinition) -> Self {
        let capacity = definition.tasks.len();
        let mut adjacency: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut predecessors: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut task_names: Vec<Arc<str>> = Vec::with_capacity(capacity);
        let mut task_set: FxHashSet<Arc<str>> =
            FxHashSet::with_capacity_and_hasher(capacity, Default::default());

        for task in &definition.tasks {
            let name: Arc<str> = Arc::from(task.name.as_str());
            if task_set.insert(Arc::clone(&name)) {
                task_names.push(Arc::clone(&name));
                adjacency.insert(Arc::clone(&name), DepVec::new());
                predecessors.insert(name, DepVec::new());
            }
        }

        for task in &definition.tasks {
            let Some(target) = task_set.get(task.name.as_str()).cloned() else {
                continue;
            };
            for dep in &task.depends_on {
                let Some(source) = task_set.get(dep.as_str()).cloned() else {
                    continue;
                };
                let preds = predecessors.entry(Arc::clone(&target)).or_default();
                if preds.contains(&source) {
                    continue;
                }
                preds.push(Arc::clone(&source));
                adjacency
                    .entry(source)
                    .or_default()
                    .push(Arc::clone(&target));
            }
        }

        Self {
            workflow: Arc::from(definition.name.as_str()),
            adjacency,
            predecessors,
            task_names,
            task_set,
        }
    }

    /// Get dependencies of a task
    #[inline]
    pub fn get_dependencies(&self, task: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.predecessors
            .get(task)
            .map_or(EMPTY, SmallVec::as_slice)
    }

    /// Get dependents of a task
    #[inline]
    pub fn get_successors(&self, task: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.adjacency.get(task).map_or(EMPTY, SmallVec::as_slice)
    }

    /// Tasks nothing depends on, in declaration order
    pub fn get_final_tasks(&self) -> Vec<Arc<str>> {
        self.task_names
            .iter()
            .filter(|name| {
                self.adjacency
                    .get(name.as_ref())
                    .is_none_or(SmallVec::is_empty)
            })
            .cloned()
            .collect()
    }

    #[inline]
    pub fn contains(&self, task: &str) -> bool {
        self.task_set.contains(task)
    }

    pub fn task_names(&self) -> &[Arc<str>] {
        &self.task_names
    }

    pub fn len(&self) -> usize {
        self.task_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_names.is_empty()
    }

    /// Check if there's a path from `from` to `to` (BFS)
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }

        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut queue: VecDeque<&str> = VecDeque::new();

        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = self.adjacency.get(current) {
                for neighbor in neighbors {
                    if neighbor.as_ref() == to {
                        return true;
                    }
                    if visited.insert(neighbor.as_ref()) {
                        queue.push_back(neighbor.as_ref());
                    }
                }
            }
        }

        false
    }

    /// Detect cycles using DFS with three-color marking.
    ///
    /// - White: unvisited
    /// - Gray: currently in DFS stack
    /// - Black: fully processed
    ///
    /// Meeting a Gray node while traversing closes a cycle.
    pub fn detect_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: FxHashMap<Arc<str>, Color> = self
            .task_names
            .iter()
            .map(|name| (Arc::clone(name), Color::White))
            .collect();
        let mut stack: Vec<Arc<str>> = Vec::new();

        fn dfs(
            node: Arc<str>,
            adjacency: &FxHashMap<Arc<str>, DepVec>,
            colors: &mut FxHashMap<Arc<str>, Color>,
            stack: &mut Vec<Arc<str>>,
        ) -> std::result::Result<(), String> {
            colors.insert(Arc::clone(&node), Color::Gray);
            stack.push(Arc::clone(&node));

            if let Some(neighbors) = adjacency.get(&node) {
                for neighbor in neighbors {
                    match colors.get(neighbor) {
                        Some(Color::Gray) => {
                            let cycle_start = stack
                                .iter()
                                .position(|x| x.as_ref() == neighbor.as_ref())
                                .unwrap_or(0);
                            let cycle: Vec<&str> =
                                stack[cycle_start..].iter().map(|s| s.as_ref()).collect();
                            return Err(format!("{} -> {}", cycle.join(" -> "), neighbor));
                        }
                        Some(Color::White) | None => {
                            dfs(Arc::clone(neighbor), adjacency, colors, stack)?;
                        }
                        Some(Color::Black) => {}
                    }
                }
            }

            stack.pop();
            colors.insert(node, Color::Black);
            Ok(())
        }

        for name in &self.task_names {
            if colors.get(name) == Some(&Color::White) {
                if let Err(cycle) = dfs(Arc::clone(name), &self.adjacency, &mut colors, &mut stack)
                {
                    return Err(DuckflowError::CyclicDependency {
                        workflow: self.workflow.to_string(),
                        cycle,
                    });
                }
            }
        }

        Ok(())
    }

    /// Group tasks into execution levels (Kahn's algorithm).
    ///
    /// Level 0 has no dependencies; every task sits one level after its
    /// deepest dependency. Tasks keep declaration order within a level.
    pub fn levels(&self) -> Result<Vec<Vec<Arc<str>>>> {
        let mut in_degree: FxHashMap<&str, usize> = self
            .task_names
            .iter()
            .map(|name| (name.as_ref(), self.get_dependencies(name).len()))
            .collect();

        let mut levels: Vec<Vec<Arc<str>>> = Vec::new();
        let mut current: Vec<Arc<str>> = self
            .task_names
            .iter()
            .filter(|name| in_degree[name.as_ref()] == 0)
            .cloned()
            .collect();
        let mut placed = 0;

        while !current.is_empty() {
            placed += current.len();
            let mut ready: FxHashSet<&str> = FxHashSet::default();
            for name in &current {
                for succ in self.get_successors(name) {
                    if let Some(degree) = in_degree.get_mut(succ.as_ref()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(succ.as_ref());
                        }
                    }
                }
            }
            levels.push(current);
            current = self
                .task_names
                .iter()
                .filter(|name| ready.contains(name.as_ref()))
                .cloned()
                .collect();
        }

        if placed != self.task_names.len() {
            // Leftover tasks sit on a cycle
            self.detect_cycles()?;
        }
        Ok(levels)
    }
}
