pub mod concept;
pub mod concept_workflow;
pub mod context;
pub mod draft_workflow;
pub mod llm;
pub mod record;
