use crate::core::io::Storage;
use crate::core::state::{ConceptRecord, DraftWorkflowState};
use crate::utils::text::project_slug;
use anyhow::{Context, Result};
use std::fmt::Write;
use std::path::Path;

pub const CONCEPT_FILE: &str = "concept.txt";
pub const DRAFT_FILE: &str = "draft.txt";

pub fn project_name(concept: &ConceptRecord) -> String {
    project_slug(&concept.title)
}

pub fn project_file(working_dir: &str, concept: &ConceptRecord, file: &str) -> String {
    Path::new(working_dir)
        .join(project_name(concept))
        .join(file)
        .to_string_lossy()
        .to_string()
}

pub fn render_concept(concept: &ConceptRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "标题：{}", concept.title);
    let _ = writeln!(out, "故事梗概：{}", concept.logline);
    let _ = writeln!(out, "类型：{}", concept.genre);
    let _ = writeln!(out, "目标读者：{}", concept.target_audience);
    let _ = writeln!(out, "背景设定：{}", concept.setting);
    let _ = writeln!(out, "写作风格：{}", concept.style);
    let _ = writeln!(out, "预计字数：{}", concept.word_count_target);

    let _ = writeln!(out, "\n主要人物：");
    for c in &concept.characters {
        let _ = writeln!(out, "- {}（{}）：{}", c.name, c.role, c.traits);
    }

    let _ = writeln!(out, "\n关键情节点：");
    for (i, point) in concept.plot_points.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, point);
    }

    if !concept.additional_notes.is_empty() {
        let _ = writeln!(out, "\n补充说明：\n{}", concept.additional_notes);
    }
    out
}

pub fn render_draft(state: &DraftWorkflowState) -> String {
    format!(
        "《{}》草稿\n\n{}\n\n{}\n",
        state.concept.title,
        state.outline.trim_end(),
        state.draft_content.trim_end()
    )
}

/// Writes the concept record; returns its path.
pub async fn save_concept(
    storage: &dyn Storage,
    working_dir: &str,
    concept: &ConceptRecord,
) -> Result<String> {
    let path = project_file(working_dir, concept, CONCEPT_FILE);
    storage
        .write(&path, &render_concept(concept))
        .await
        .with_context(|| format!("Failed to save concept for '{}'", concept.title))?;
    Ok(path)
}

/// Writes the draft record (header, outline, content); returns its path.
pub async fn save_draft(
    storage: &dyn Storage,
    working_dir: &str,
    state: &DraftWorkflowState,
) -> Result<String> {
    let path = project_file(working_dir, &state.concept, DRAFT_FILE);
    if storage.exists(&path).await? {
        log::info!("Replacing earlier draft at {}", path);
    }
    storage
        .write(&path, &render_draft(state))
        .await
        .with_context(|| format!("Failed to save draft for '{}'", state.concept.title))?;
    Ok(path)
}
