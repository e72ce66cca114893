use super::error::WorkflowError;
use super::graph::{Target, WorkflowGraph};

/// Walks a [`WorkflowGraph`] from its entry step until the terminal marker.
///
/// Steps run strictly one after another against the single state value.
/// Revisiting a step is normal; loops end when a decision routes to `END`.
pub struct Executor<'g, S> {
    graph: &'g WorkflowGraph<S>,
    name: &'static str,
}

impl<'g, S: Send> Executor<'g, S> {
    pub fn new(graph: &'g WorkflowGraph<S>) -> Self {
        Self {
            graph,
            name: "workflow",
        }
    }

    /// Label used in log lines.
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub async fn run(&self, state: S) -> Result<S, WorkflowError> {
        let (state, _) = self.run_traced(state).await?;
        Ok(state)
    }

    /// Like [`run`](Self::run) but also returns the steps visited, in order.
    pub async fn run_traced(&self, mut state: S) -> Result<(S, Vec<&'static str>), WorkflowError> {
        let mut current = self.graph.entry();
        let mut trace = Vec::new();

        log::info!("[{}] starting at '{}'", self.name, current);

        loop {
            let step = self.graph.step(current)?;
            log::debug!("[{}] running '{}'", self.name, current);
            trace.push(current);

            step.run(&mut state)
                .await
                .map_err(|source| WorkflowError::Step {
                    step: current,
                    source,
                })?;

            let next = self.graph.next(current, &state)?;
            if self.graph.is_branch(current) {
                log::info!("[{}] '{}' branched to {:?}", self.name, current, next);
            }

            match next {
                Target::Step(name) => current = name,
                Target::End => {
                    log::info!("[{}] finished after {} steps", self.name, trace.len());
                    return Ok((state, trace));
                }
            }
        }
    }
}
