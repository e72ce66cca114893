use anyhow::Result;
use std::sync::Arc;

use novel_agent::core::config::Config;
use novel_agent::core::io::NativeStorage;
use novel_agent::core::prompt::ConsolePrompter;
use novel_agent::core::state::{ConceptWorkflowState, DraftWorkflowState};
use novel_agent::engine::Executor;
use novel_agent::services::concept_workflow::concept_workflow;
use novel_agent::services::context::StepContext;
use novel_agent::services::draft_workflow::draft_workflow;
use novel_agent::services::llm::create_llm;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    // 1. Load config (config.yml, then environment)
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please check 'config.yml' and the QWEN_* / NOVEL_* variables.");
            return Err(e);
        }
    };
    config.ensure_directories()?;

    // 2. Collaborators
    let llm = create_llm(&config.llm)?;
    let ctx = StepContext::new(
        Arc::new(config.clone()),
        Arc::from(llm),
        Arc::new(ConsolePrompter::new()),
        Arc::new(NativeStorage::new()),
    );

    // 3. Concept collection
    let graph = concept_workflow(ctx.clone())?;
    let concept_state = Executor::new(&graph)
        .with_name("concept")
        .run(ConceptWorkflowState::new(config.max_feedback_rounds))
        .await?;
    log::info!("Concept confirmed: {}", concept_state.concept.title);

    // 4. Drafting
    let graph = draft_workflow(ctx)?;
    let draft_state = Executor::new(&graph)
        .with_name("draft")
        .run(DraftWorkflowState::new(concept_state.concept))
        .await?;

    println!("\n创作完成，稿件保存在：{}", draft_state.save_path);
    Ok(())
}
