use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use strum::IntoEnumIterator;

use super::error::GraphError;

/// A named unit of work that mutates the workflow state in place.
#[async_trait]
pub trait Step<S>: Send + Sync {
    async fn run(&self, state: &mut S) -> Result<()>;
}

/// Adapts a plain closure into a [`Step`].
pub struct FnStep<F>(pub F);

#[async_trait]
impl<S, F> Step<S> for FnStep<F>
where
    S: Send,
    F: Fn(&mut S) -> Result<()> + Send + Sync,
{
    async fn run(&self, state: &mut S) -> Result<()> {
        (self.0)(state)
    }
}

/// Closed set of outcomes a decision function can return.
///
/// Derive `strum::EnumIter` and `strum::IntoStaticStr` on a fieldless enum to
/// get this for free.
pub trait Label:
    Copy + Eq + Hash + Debug + Send + Sync + IntoEnumIterator + Into<&'static str> + 'static
{
}

impl<T> Label for T where
    T: Copy + Eq + Hash + Debug + Send + Sync + IntoEnumIterator + Into<&'static str> + 'static
{
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Step(&'static str),
    End,
}

pub const END: Target = Target::End;

type Router<S> = Box<dyn Fn(&S) -> Result<Target, GraphError> + Send + Sync>;

enum Edge<S> {
    Direct(Target),
    Branch(Router<S>),
}

struct PendingEdge<S> {
    from: &'static str,
    targets: Vec<Target>,
    edge: Edge<S>,
}

pub struct GraphBuilder<S> {
    entry: Option<&'static str>,
    steps: Vec<(&'static str, Arc<dyn Step<S>>)>,
    edges: Vec<PendingEdge<S>>,
    errors: Vec<GraphError>,
}

impl<S: Send + 'static> GraphBuilder<S> {
    pub fn new() -> Self {
        Self {
            entry: None,
            steps: Vec::new(),
            edges: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn add_step(mut self, name: &'static str, step: impl Step<S> + 'static) -> Self {
        self.steps.push((name, Arc::new(step)));
        self
    }

    pub fn set_entry(mut self, name: &'static str) -> Self {
        self.entry = Some(name);
        self
    }

    pub fn add_edge(mut self, from: &'static str, to: Target) -> Self {
        self.edges.push(PendingEdge {
            from,
            targets: vec![to],
            edge: Edge::Direct(to),
        });
        self
    }

    /// Routes `from` through `decide`. Every label of `L` must be mapped.
    pub fn add_conditional_edges<L, I>(
        mut self,
        from: &'static str,
        decide: fn(&S) -> L,
        routes: I,
    ) -> Self
    where
        L: Label,
        I: IntoIterator<Item = (L, Target)>,
    {
        let routes: HashMap<L, Target> = routes.into_iter().collect();

        for label in L::iter() {
            if !routes.contains_key(&label) {
                self.errors.push(GraphError::UnmappedLabel {
                    step: from,
                    label: Into::<&'static str>::into(label).to_string(),
                });
            }
        }

        let targets = routes.values().copied().collect();
        let router: Router<S> = Box::new(move |state: &S| {
            let label = decide(state);
            routes.get(&label).copied().ok_or_else(|| GraphError::UnmappedLabel {
                step: from,
                label: Into::<&'static str>::into(label).to_string(),
            })
        });

        self.edges.push(PendingEdge {
            from,
            targets,
            edge: Edge::Branch(router),
        });
        self
    }

    pub fn build(self) -> Result<WorkflowGraph<S>, GraphError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let mut steps = HashMap::new();
        for (name, step) in self.steps {
            if steps.insert(name, step).is_some() {
                return Err(GraphError::DuplicateStep(name));
            }
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !steps.contains_key(entry) {
            return Err(GraphError::UnknownEntry(entry));
        }

        let mut edges = HashMap::new();
        for pending in self.edges {
            if !steps.contains_key(pending.from) {
                return Err(GraphError::UnknownSource(pending.from));
            }
            for target in &pending.targets {
                if let Target::Step(to) = target {
                    if !steps.contains_key(to) {
                        return Err(GraphError::UnknownTarget {
                            from: pending.from,
                            to: *to,
                        });
                    }
                }
            }
            if edges.insert(pending.from, pending.edge).is_some() {
                return Err(GraphError::DuplicateEdge(pending.from));
            }
        }

        let mut names: Vec<&'static str> = steps.keys().copied().collect();
        names.sort_unstable();
        if let Some(orphan) = names.iter().find(|n| !edges.contains_key(*n)) {
            return Err(GraphError::MissingEdge(*orphan));
        }

        Ok(WorkflowGraph {
            entry,
            steps,
            edges,
        })
    }
}

impl<S: Send + 'static> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated workflow: one entry step, every step with exactly one
/// outgoing edge spec, every target defined.
pub struct WorkflowGraph<S> {
    entry: &'static str,
    steps: HashMap<&'static str, Arc<dyn Step<S>>>,
    edges: HashMap<&'static str, Edge<S>>,
}

impl<S: Send> WorkflowGraph<S> {
    pub fn entry(&self) -> &'static str {
        self.entry
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.steps.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn is_branch(&self, name: &str) -> bool {
        matches!(self.edges.get(name), Some(Edge::Branch(_)))
    }

    pub(crate) fn step(&self, name: &'static str) -> Result<&Arc<dyn Step<S>>, GraphError> {
        self.steps.get(name).ok_or(GraphError::UnknownStep(name))
    }

    /// Resolves where to go after `from` given the state it left behind.
    pub fn next(&self, from: &'static str, state: &S) -> Result<Target, GraphError> {
        match self.edges.get(from) {
            Some(Edge::Direct(target)) => Ok(*target),
            Some(Edge::Branch(route)) => route(state),
            None => Err(GraphError::MissingEdge(from)),
        }
    }
}
