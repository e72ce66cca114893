use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct Character {
    pub name: String,
    pub role: String,
    pub traits: String,
}

/// The novel concept assembled during concept collection.
///
/// Lists start empty per instance and keep insertion order.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct ConceptRecord {
    pub title: String,
    pub logline: String,
    pub genre: String,
    pub target_audience: String,
    pub setting: String,
    pub style: String,
    pub word_count_target: u32,
    pub characters: Vec<Character>,
    pub plot_points: Vec<String>,
    pub additional_notes: String,
}

#[derive(Clone, Debug, Default)]
pub struct ConceptWorkflowState {
    pub concept: ConceptRecord,
    /// Last raw operator answer that drives the next edit.
    pub user_input: String,
    pub feedback_needed: bool,
    pub restart_requested: bool,
    pub feedback_rounds: u32,
    pub max_feedback_rounds: u32,
}

impl ConceptWorkflowState {
    pub fn new(max_feedback_rounds: u32) -> Self {
        Self {
            max_feedback_rounds,
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftAspect {
    Outline,
    Content,
}

#[derive(Clone, Debug, Default)]
pub struct DraftWorkflowState {
    pub concept: ConceptRecord,
    pub outline: String,
    pub draft_content: String,
    pub current_section: String,
    pub save_path: String,
    pub user_feedback: String,
    pub pending_revision: Option<DraftAspect>,
    pub revision_count: u32,
}

impl DraftWorkflowState {
    /// Takes ownership of a confirmed concept.
    pub fn new(concept: ConceptRecord) -> Self {
        Self {
            concept,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_records_do_not_share_lists() {
        let mut a = ConceptRecord::default();
        let b = ConceptRecord::default();
        a.plot_points.push("开端".to_string());
        a.characters.push(Character::default());
        assert!(b.plot_points.is_empty());
        assert!(b.characters.is_empty());
    }

    #[test]
    fn test_draft_state_takes_concept() {
        let concept = ConceptRecord {
            title: "星海".to_string(),
            ..Default::default()
        };
        let state = DraftWorkflowState::new(concept.clone());
        assert_eq!(state.concept, concept);
        assert!(state.outline.is_empty());
        assert!(state.pending_revision.is_none());
    }
}
