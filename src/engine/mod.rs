//! Small state-graph engine: named steps, plain and labelled edges, and an
//! executor that threads one state value through them.

mod error;
mod executor;
mod graph;

pub use error::{GraphError, WorkflowError};
pub use executor::Executor;
pub use graph::{FnStep, GraphBuilder, Label, Step, Target, WorkflowGraph, END};
