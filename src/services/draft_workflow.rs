use crate::core::state::{ConceptRecord, DraftAspect, DraftWorkflowState};
use crate::engine::{GraphBuilder, GraphError, Step, Target, WorkflowGraph, END};
use crate::services::context::StepContext;
use crate::services::record::{render_concept, save_concept, save_draft};
use crate::utils::text::strip_code_blocks;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use strum::{EnumIter, IntoStaticStr};

pub const DISCUSS_OUTLINE: &str = "discuss_outline";
pub const CREATE_DRAFT: &str = "create_draft";
pub const SAVE: &str = "save";
pub const MODIFY_OUTLINE: &str = "modify_outline";
pub const MODIFY_CONTENT: &str = "modify_content";

pub const FIRST_SECTION: &str = "第一章";

const DRAFT_SYSTEM_PROMPT: &str =
    "你是一位经验丰富的中文小说作者，擅长根据设定写出结构清晰、文笔流畅的作品。只输出正文，不要解释。";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DraftDecision {
    ModifyOutline,
    ModifyContent,
    Completed,
}

pub fn draft_decision(state: &DraftWorkflowState) -> DraftDecision {
    match state.pending_revision {
        Some(DraftAspect::Outline) => DraftDecision::ModifyOutline,
        Some(DraftAspect::Content) => DraftDecision::ModifyContent,
        None => DraftDecision::Completed,
    }
}

pub fn draft_workflow(ctx: StepContext) -> Result<WorkflowGraph<DraftWorkflowState>, GraphError> {
    GraphBuilder::new()
        .add_step(DISCUSS_OUTLINE, DiscussOutline { ctx: ctx.clone() })
        .add_step(CREATE_DRAFT, CreateDraft { ctx: ctx.clone() })
        .add_step(SAVE, Save { ctx: ctx.clone() })
        .add_step(MODIFY_OUTLINE, ModifyOutline { ctx: ctx.clone() })
        .add_step(MODIFY_CONTENT, ModifyContent { ctx })
        .set_entry(DISCUSS_OUTLINE)
        .add_edge(DISCUSS_OUTLINE, Target::Step(CREATE_DRAFT))
        .add_edge(CREATE_DRAFT, Target::Step(SAVE))
        .add_conditional_edges(
            SAVE,
            draft_decision,
            [
                (DraftDecision::ModifyOutline, Target::Step(MODIFY_OUTLINE)),
                (DraftDecision::ModifyContent, Target::Step(MODIFY_CONTENT)),
                (DraftDecision::Completed, END),
            ],
        )
        .add_edge(MODIFY_OUTLINE, Target::Step(CREATE_DRAFT))
        .add_edge(MODIFY_CONTENT, Target::Step(SAVE))
        .build()
}

fn outline_prompt(concept: &ConceptRecord, notes: Option<&str>) -> String {
    let mut prompt = format!(
        "请根据以下小说概念，撰写一份按章节划分的故事大纲。\
        每章用一到三句话概括主要事件，并保证关键情节点全部覆盖。\
        \n\n小说概念：\n{}",
        render_concept(concept)
    );
    if let Some(notes) = notes {
        prompt.push_str(&format!("\n作者对大纲的要求：\n{}\n", notes));
    }
    prompt
}

fn draft_prompt(concept: &ConceptRecord, outline: &str, section: &str) -> String {
    format!(
        "请根据以下小说概念与大纲，创作{}的完整正文。\
        保持人物性格与设定一致，写作风格为：{}。\
        \n\n小说概念：\n{}\n大纲：\n{}",
        section,
        concept.style,
        render_concept(concept),
        outline
    )
}

fn revise_outline_prompt(concept: &ConceptRecord, outline: &str, feedback: &str) -> String {
    format!(
        "请根据修改意见修订以下大纲，输出修订后的完整大纲。\
        \n\n小说概念：\n{}\n当前大纲：\n{}\n\n修改意见：\n{}",
        render_concept(concept),
        outline,
        feedback
    )
}

fn revise_content_prompt(state: &DraftWorkflowState) -> String {
    format!(
        "请根据修改意见修订以下正文（{}），输出修订后的完整正文，不要偏离大纲。\
        \n\n大纲：\n{}\n\n当前正文：\n{}\n\n修改意见：\n{}",
        state.current_section, state.outline, state.draft_content, state.user_feedback
    )
}

/// Generates text, treating a blank answer as a failure.
async fn generate_text(ctx: &StepContext, prompt: &str) -> Result<String> {
    let text = strip_code_blocks(&ctx.generate(DRAFT_SYSTEM_PROMPT, prompt).await?);
    if text.trim().is_empty() {
        return Err(anyhow!("generated text is empty"));
    }
    Ok(text)
}

/// Generated text, or whatever the operator types when generation fails.
async fn generate_or_ask(ctx: &StepContext, prompt: &str, what: &str) -> String {
    match generate_text(ctx, prompt).await {
        Ok(text) => text,
        Err(e) => {
            log::warn!("Generating {} failed: {:#}", what, e);
            println!("AI 生成{}失败，请手动输入。", what);
            ctx.ask_multiline(&format!("请输入{}（空行结束）：", what))
        }
    }
}

pub struct DiscussOutline {
    ctx: StepContext,
}

#[async_trait]
impl Step<DraftWorkflowState> for DiscussOutline {
    async fn run(&self, state: &mut DraftWorkflowState) -> Result<()> {
        println!("\n=== 大纲讨论 ===");
        let prompt = outline_prompt(&state.concept, None);

        match generate_text(&self.ctx, &prompt).await {
            Ok(outline) => {
                println!("{}", outline);
                state.outline = outline;

                let notes = self.ctx.ask("对大纲有什么调整意见？（直接回车表示满意）：");
                if !notes.trim().is_empty() {
                    state.user_feedback = notes.trim().to_string();
                    let prompt = outline_prompt(&state.concept, Some(&state.user_feedback));
                    match generate_text(&self.ctx, &prompt).await {
                        Ok(outline) => {
                            println!("{}", outline);
                            state.outline = outline;
                        }
                        Err(e) => {
                            log::warn!("Outline adjustment failed, keeping first version: {:#}", e)
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("Generating outline failed: {:#}", e);
                println!("AI 生成大纲失败，请手动输入。");
                state.outline = self.ctx.ask_multiline("请输入大纲（空行结束）：");
            }
        }
        Ok(())
    }
}

pub struct CreateDraft {
    ctx: StepContext,
}

#[async_trait]
impl Step<DraftWorkflowState> for CreateDraft {
    async fn run(&self, state: &mut DraftWorkflowState) -> Result<()> {
        state.current_section = FIRST_SECTION.to_string();
        println!("\n=== 正在创作{} ===", state.current_section);

        let prompt = draft_prompt(&state.concept, &state.outline, &state.current_section);
        state.draft_content = generate_or_ask(&self.ctx, &prompt, "正文").await;
        println!("{}", state.draft_content);
        Ok(())
    }
}

pub struct Save {
    ctx: StepContext,
}

#[async_trait]
impl Step<DraftWorkflowState> for Save {
    async fn run(&self, state: &mut DraftWorkflowState) -> Result<()> {
        let working_dir = &self.ctx.config.working_dir;
        let storage = self.ctx.storage.as_ref();

        let concept_path = save_concept(storage, working_dir, &state.concept).await?;
        state.save_path = save_draft(storage, working_dir, state).await?;
        log::info!("Saved {} and {}", concept_path, state.save_path);
        println!("\n稿件已保存到：{}", state.save_path);

        println!("\n=== 稿件审阅 ===");
        println!("1. 完成");
        println!("2. 修改大纲");
        println!("3. 修改正文");
        let (pending, question) = match self.ctx.ask("请选择（1-3）：").trim() {
            "2" => (Some(DraftAspect::Outline), "请说明大纲需要修改的地方："),
            "3" => (Some(DraftAspect::Content), "请说明正文需要修改的地方："),
            _ => (None, ""),
        };

        state.pending_revision = pending;
        state.user_feedback = match pending {
            Some(_) => self.ctx.ask(question),
            None => String::new(),
        };
        Ok(())
    }
}

pub struct ModifyOutline {
    ctx: StepContext,
}

#[async_trait]
impl Step<DraftWorkflowState> for ModifyOutline {
    async fn run(&self, state: &mut DraftWorkflowState) -> Result<()> {
        println!("\n=== 修改大纲 ===");
        let prompt = revise_outline_prompt(&state.concept, &state.outline, &state.user_feedback);
        let outline = generate_or_ask(&self.ctx, &prompt, "大纲").await;
        if outline.trim().is_empty() {
            log::info!("Outline left unchanged");
        } else {
            println!("{}", outline);
            state.outline = outline;
        }

        state.pending_revision = None;
        state.revision_count += 1;
        Ok(())
    }
}

pub struct ModifyContent {
    ctx: StepContext,
}

#[async_trait]
impl Step<DraftWorkflowState> for ModifyContent {
    async fn run(&self, state: &mut DraftWorkflowState) -> Result<()> {
        println!("\n=== 修改正文 ===");
        let prompt = revise_content_prompt(state);
        let content = generate_or_ask(&self.ctx, &prompt, "正文").await;
        if content.trim().is_empty() {
            log::info!("Content left unchanged");
        } else {
            println!("{}", content);
            state.draft_content = content;
        }

        state.pending_revision = None;
        state.revision_count += 1;
        Ok(())
    }
}
