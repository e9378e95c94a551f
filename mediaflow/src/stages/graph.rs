//! Execution order derived from the registered stages.
//!
//! Stages are bucketed by [`Phase`]. Inside a bucket they keep
//! registration order, except where same-phase `run_after`/`run_before`
//! hints ask for something else; those hints are resolved by a
//! depth-first topological sort confined to the bucket. Hints that point
//! at another phase, or at a stage that is not registered, are ignored.

use super::StageDefinition;
use crate::core::Phase;
use crate::errors::CycleDetectedError;
use std::collections::HashMap;
use std::sync::Arc;

/// An ordered sequence of stages.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    stages: Vec<Arc<StageDefinition>>,
}

impl ExecutionGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Arc<StageDefinition>] {
        &self.stages
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the phase of a stage in the graph.
    #[must_use]
    pub fn phase_of(&self, name: &str) -> Option<Phase> {
        self.stages
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.phase())
    }

    /// Returns the position of a stage in the graph.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name() == name)
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the graph has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Builds the graph from stages given in registration order.
pub(crate) fn build_graph(
    registered: &[Arc<StageDefinition>],
) -> Result<ExecutionGraph, CycleDetectedError> {
    let mut stages = Vec::with_capacity(registered.len());
    for phase in Phase::ALL {
        let members: Vec<Arc<StageDefinition>> = registered
            .iter()
            .filter(|s| s.phase() == phase)
            .cloned()
            .collect();
        stages.extend(order_phase(phase, &members)?);
    }
    Ok(ExecutionGraph { stages })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Orders the members of one phase. `members` must be in registration order.
pub(crate) fn order_phase(
    phase: Phase,
    members: &[Arc<StageDefinition>],
) -> Result<Vec<Arc<StageDefinition>>, CycleDetectedError> {
    let index: HashMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name(), i))
        .collect();

    // preds[i] holds the members that must precede member i.
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
    for (i, stage) in members.iter().enumerate() {
        for other in stage.after() {
            match index.get(other.as_str()) {
                Some(&j) => preds[i].push(j),
                None => tracing::debug!(
                    stage = stage.name(),
                    hint = %other,
                    %phase,
                    "Ignoring run_after hint outside the phase"
                ),
            }
        }
        for other in stage.before() {
            match index.get(other.as_str()) {
                Some(&j) => preds[j].push(i),
                None => tracing::debug!(
                    stage = stage.name(),
                    hint = %other,
                    %phase,
                    "Ignoring run_before hint outside the phase"
                ),
            }
        }
    }
    for list in &mut preds {
        list.sort_unstable();
        list.dedup();
    }

    let mut marks = vec![Mark::Unvisited; members.len()];
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(members.len());

    // Visit in registration order for determinism
    for node in 0..members.len() {
        visit(node, &preds, &mut marks, &mut path, &mut order).map_err(|cycle| {
            CycleDetectedError::new(
                phase.to_string(),
                cycle
                    .into_iter()
                    .map(|i| members[i].name().to_string())
                    .collect(),
            )
        })?;
    }

    Ok(order.into_iter().map(|i| members[i].clone()).collect())
}

/// Depth-first visit emitting `node` after all of its predecessors.
///
/// Returns the cycle path when `node` is reached again while on the stack.
fn visit(
    node: usize,
    preds: &[Vec<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), Vec<usize>> {
    match marks[node] {
        Mark::Done => return Ok(()),
        Mark::Visiting => {
            let start = path.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Err(cycle);
        }
        Mark::Unvisited => {}
    }

    marks[node] = Mark::Visiting;
    path.push(node);
    for &pred in &preds[node] {
        visit(pred, preds, marks, path, order)?;
    }
    path.pop();
    marks[node] = Mark::Done;
    order.push(node);
    Ok(())
}
