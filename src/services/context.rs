use crate::core::config::Config;
use crate::core::io::Storage;
use crate::core::prompt::Prompter;
use crate::services::llm::{generate_bounded, LlmClient};
use anyhow::Result;
use std::sync::Arc;

/// Collaborators shared by every step of a run. The config is read-only.
#[derive(Clone)]
pub struct StepContext {
    pub config: Arc<Config>,
    pub llm: Arc<dyn LlmClient>,
    pub prompter: Arc<dyn Prompter>,
    pub storage: Arc<dyn Storage>,
}

impl StepContext {
    pub fn new(
        config: Arc<Config>,
        llm: Arc<dyn LlmClient>,
        prompter: Arc<dyn Prompter>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            config,
            llm,
            prompter,
            storage,
        }
    }

    pub fn ask(&self, question: &str) -> String {
        self.prompter.ask(question)
    }

    /// Reads lines until the operator enters an empty one.
    pub fn ask_multiline(&self, question: &str) -> String {
        let mut lines = Vec::new();
        loop {
            let line = self.ask(question);
            if line.trim().is_empty() {
                break;
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    pub async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        generate_bounded(self.llm.as_ref(), &self.config.llm, system, prompt).await
    }
}
