//! Execution graph: dependency extraction, cycle detection, and parallel
//! leveling in one pass of Kahn's algorithm.

use gantrycore::template::{self, TemplateExpression};
use gantrycore::{EngineError, GraphError, WorkflowDefinition};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Dependency graph of one workflow, with steps grouped into levels.
///
/// Nodes in the same level have no edges between them, so every level is
/// safe to execute concurrently once all earlier levels have finished.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    /// Step id -> ids it depends on.
    dependencies: HashMap<String, HashSet<String>>,
    /// Parallel groups in execution order; level 0 has no dependencies.
    levels: Vec<Vec<String>>,
}

impl ExecutionGraph {
    /// Build the graph for a workflow.
    ///
    /// Every `tasks.X.output` reference in a step's input templates (or its
    /// condition) becomes an edge X -> step. References to ids that are not
    /// declared steps are left to the validation layer; only cycles among
    /// real steps are this builder's concern.
    pub fn build(workflow: &WorkflowDefinition) -> Result<Self, EngineError> {
        let step_ids: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();

        let mut dependencies: HashMap<String, HashSet<String>> = workflow
            .steps
            .iter()
            .map(|s| (s.id.clone(), HashSet::new()))
            .collect();

        for step in &workflow.steps {
            let mut templates: Vec<&str> = step.input.values().map(String::as_str).collect();
            if let Some(condition) = &step.condition {
                templates.push(condition);
            }
            for text in templates {
                // Syntax errors are the validation layer's concern (and
                // resurface at resolution time); here only the references
                // matter.
                let Ok(references) = template::extract_references(text) else {
                    continue;
                };
                for reference in references {
                    if let TemplateExpression::TaskOutput { step_id, .. } = reference {
                        if step_ids.contains(step_id.as_str()) {
                            dependencies
                                .entry(step.id.clone())
                                .or_default()
                                .insert(step_id);
                        }
                    }
                }
            }
        }

        let levels = compute_levels(workflow, &dependencies)?;
        Ok(Self {
            dependencies,
            levels,
        })
    }

    /// Parallel groups in execution order.
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    pub fn dependencies_of(&self, step_id: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(step_id)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Kahn's algorithm over the dependency edges: each drain of the zero
/// in-degree frontier is one level. Undrained nodes mean a cycle, which is
/// reported as a concrete path.
fn compute_levels(
    workflow: &WorkflowDefinition,
    dependencies: &HashMap<String, HashSet<String>>,
) -> Result<Vec<Vec<String>>, EngineError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();
    for step in &workflow.steps {
        let idx = graph.add_node(step.id.as_str());
        index_of.insert(step.id.as_str(), idx);
    }
    for (step_id, deps) in dependencies {
        for dep in deps {
            graph.add_edge(index_of[dep.as_str()], index_of[step_id.as_str()], ());
        }
    }

    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|idx| {
            (
                idx,
                graph.neighbors_directed(idx, Direction::Incoming).count(),
            )
        })
        .collect();

    let mut frontier: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx] == 0)
        .collect();
    let mut levels = Vec::new();
    let mut drained = 0;

    while !frontier.is_empty() {
        let mut names: Vec<&str> = frontier.iter().map(|idx| graph[*idx]).collect();
        names.sort_unstable();
        levels.push(names.into_iter().map(str::to_string).collect());
        drained += frontier.len();

        let mut next = Vec::new();
        for idx in frontier {
            for successor in graph.neighbors_directed(idx, Direction::Outgoing) {
                let degree = in_degree
                    .get_mut(&successor)
                    .expect("successor tracked in in-degree map");
                *degree -= 1;
                if *degree == 0 {
                    next.push(successor);
                }
            }
        }
        frontier = next;
    }

    if drained < graph.node_count() {
        let residual: HashSet<NodeIndex> = in_degree
            .iter()
            .filter(|(_, &degree)| degree > 0)
            .map(|(idx, _)| *idx)
            .collect();
        let cycle = find_cycle(&graph, &residual);
        return Err(GraphError::CircularDependency { cycle }.into());
    }
    Ok(levels)
}

/// Recover a representative cycle from the residual subgraph.
///
/// Every residual node keeps at least one residual predecessor (otherwise
/// Kahn would have drained it), so walking predecessors must eventually
/// revisit a node; the visited stretch between the two visits, reversed,
/// is a cycle in forward edge direction.
fn find_cycle(graph: &DiGraph<&str, ()>, residual: &HashSet<NodeIndex>) -> Vec<String> {
    let start = residual
        .iter()
        .copied()
        .min_by_key(|idx| graph[*idx])
        .expect("residual set is non-empty when a cycle exists");

    let mut order: Vec<NodeIndex> = Vec::new();
    let mut position: HashMap<NodeIndex, usize> = HashMap::new();
    let mut current = start;

    loop {
        if let Some(&first_seen) = position.get(&current) {
            let mut cycle: Vec<String> = order[first_seen..]
                .iter()
                .rev()
                .map(|idx| graph[*idx].to_string())
                .collect();
            let closing = cycle[0].clone();
            cycle.push(closing);
            return cycle;
        }
        position.insert(current, order.len());
        order.push(current);
        current = graph
            .neighbors_directed(current, Direction::Incoming)
            .filter(|idx| residual.contains(idx))
            .min_by_key(|idx| graph[*idx])
            .expect("residual node has a residual predecessor");
    }
}
