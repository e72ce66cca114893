/// Defects in a workflow definition. Never recovered from.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph has no entry step")]
    MissingEntry,

    #[error("entry step '{0}' is not defined")]
    UnknownEntry(&'static str),

    #[error("step '{0}' is not defined")]
    UnknownStep(&'static str),

    #[error("step '{0}' is defined twice")]
    DuplicateStep(&'static str),

    #[error("step '{0}' already has an outgoing edge")]
    DuplicateEdge(&'static str),

    #[error("edge source '{0}' is not a step")]
    UnknownSource(&'static str),

    #[error("edge from '{from}' points at unknown step '{to}'")]
    UnknownTarget {
        from: &'static str,
        to: &'static str,
    },

    #[error("step '{0}' has no outgoing edge")]
    MissingEdge(&'static str),

    #[error("decision at '{step}' returned label '{label}' with no edge")]
    UnmappedLabel { step: &'static str, label: String },
}

/// Failures that stop a workflow run.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("step '{step}' failed: {source:#}")]
    Step {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
}
