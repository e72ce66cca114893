//! Concept text: the generation template, the line-oriented parser for the
//! service's answer, manual-input helpers and targeted edits.

use crate::core::state::{Character, ConceptRecord};
use crate::utils::text::{digits_only, strip_code_blocks, strip_list_marker};

pub const DEFAULT_WORD_COUNT: u32 = 50_000;

pub const CONCEPT_SYSTEM_PROMPT: &str = "你是一位资深的小说策划编辑。请严格按照用户给出的格式输出，不要添加额外的说明。";

pub const CONCEPT_PROMPT: &str = "请帮我生成一个完整的小说概念，包括以下要素：
1. 标题
2. 故事梗概（一句话）
3. 类型（如：奇幻、科幻、言情等）
4. 目标读者群体
5. 故事背景设定
6. 写作风格与基调
7. 预计字数
8. 主要人物（至少3个，包含姓名、角色和特点）
9. 关键情节点（至少5个）
10. 其他补充说明

请按照以下格式输出：
标题：[标题]
故事梗概：[一句话梗概]
类型：[类型]
目标读者：[目标读者]
背景设定：[背景设定]
写作风格：[写作风格]
预计字数：[字数]

主要人物：
1. [姓名] - [角色]：[特点]
2. [姓名] - [角色]：[特点]
3. [姓名] - [角色]：[特点]

关键情节点：
1. [情节点1]
2. [情节点2]
3. [情节点3]
4. [情节点4]
5. [情节点5]

补充说明：[补充说明]
";

pub const LABEL_TITLE: &str = "标题：";
pub const LABEL_LOGLINE: &str = "故事梗概：";
pub const LABEL_GENRE: &str = "类型：";
pub const LABEL_AUDIENCE: &str = "目标读者：";
pub const LABEL_SETTING: &str = "背景设定：";
pub const LABEL_STYLE: &str = "写作风格：";
pub const LABEL_WORD_COUNT: &str = "预计字数：";
pub const LABEL_CHARACTERS: &str = "主要人物：";
pub const LABEL_PLOT: &str = "关键情节点：";
pub const LABEL_NOTES: &str = "补充说明：";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConceptParseError {
    #[error("generated concept is empty")]
    Empty,
    #[error("generated concept has no title line")]
    MissingTitle,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Fields,
    Characters,
    Plot,
    Notes,
}

/// Parses the service's answer to [`CONCEPT_PROMPT`].
///
/// Unknown lines are ignored and malformed list items are skipped one by
/// one. Fails only when the answer carries no title at all.
pub fn parse_concept(text: &str) -> Result<ConceptRecord, ConceptParseError> {
    let text = strip_code_blocks(text);
    if text.trim().is_empty() {
        return Err(ConceptParseError::Empty);
    }

    let mut concept = ConceptRecord::default();
    let mut section = Section::Fields;
    let mut notes: Vec<String> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim().trim_start_matches('#').trim().trim_matches('*').trim();
        // fences left over when the answer opens with prose
        if line.is_empty() || line.starts_with("```") {
            continue;
        }

        if let Some(v) = field(line, LABEL_TITLE) {
            concept.title = v.trim_matches(|c| c == '《' || c == '》').to_string();
        } else if let Some(v) = field(line, LABEL_LOGLINE) {
            concept.logline = v.to_string();
        } else if let Some(v) = field(line, LABEL_GENRE) {
            concept.genre = v.to_string();
        } else if let Some(v) = field(line, LABEL_AUDIENCE) {
            concept.target_audience = v.to_string();
        } else if let Some(v) = field(line, LABEL_SETTING) {
            concept.setting = v.to_string();
        } else if let Some(v) = field(line, LABEL_STYLE) {
            concept.style = v.to_string();
        } else if let Some(v) = field(line, LABEL_WORD_COUNT) {
            concept.word_count_target = parse_word_count(v);
        } else if field(line, LABEL_CHARACTERS).is_some() {
            section = Section::Characters;
        } else if field(line, LABEL_PLOT).is_some() {
            section = Section::Plot;
        } else if let Some(v) = field(line, LABEL_NOTES) {
            section = Section::Notes;
            if !v.is_empty() {
                notes.push(v.to_string());
            }
        } else {
            match section {
                Section::Characters => match parse_character_line(line) {
                    Some(c) => concept.characters.push(c),
                    None => log::debug!("Skipping malformed character line: {}", line),
                },
                Section::Plot => match strip_list_marker(line) {
                    Some(point) if !point.is_empty() => concept.plot_points.push(point.to_string()),
                    _ => log::debug!("Skipping malformed plot line: {}", line),
                },
                Section::Notes => notes.push(line.to_string()),
                Section::Fields => {}
            }
        }
    }

    concept.additional_notes = notes.join("\n");

    if concept.title.is_empty() {
        return Err(ConceptParseError::MissingTitle);
    }
    if concept.word_count_target == 0 {
        concept.word_count_target = DEFAULT_WORD_COUNT;
    }
    Ok(concept)
}

/// Matches `label` (full-width colon) or its ASCII-colon variant.
fn field<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    if let Some(rest) = line.strip_prefix(label) {
        return Some(rest.trim());
    }
    let ascii = label.trim_end_matches('：');
    line.strip_prefix(ascii)
        .and_then(|rest| rest.trim_start().strip_prefix(':'))
        .map(str::trim)
}

/// `1. 名字 - 角色：特点`. `None` when the name/role separator is missing.
fn parse_character_line(line: &str) -> Option<Character> {
    let body = strip_list_marker(line)?;
    let (name_role, traits) = body
        .split_once('：')
        .or_else(|| body.split_once(':'))
        .unwrap_or((body, ""));
    let (name, role) = name_role
        .split_once(" - ")
        .or_else(|| name_role.split_once(" — "))
        .or_else(|| name_role.split_once('－'))?;

    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(Character {
        name: name.to_string(),
        role: role.trim().to_string(),
        traits: traits.trim().to_string(),
    })
}

/// Digit-filtered word count; [`DEFAULT_WORD_COUNT`] when nothing usable.
pub fn parse_word_count(s: &str) -> u32 {
    match digits_only(s).parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => DEFAULT_WORD_COUNT,
    }
}

/// `name,role,traits`. Missing parts stay empty so no entry is lost.
pub fn parse_manual_character(s: &str) -> Character {
    let normalized = s.replace('，', ",");
    let mut parts = normalized.splitn(3, ',').map(|p| p.trim().to_string());
    Character {
        name: parts.next().unwrap_or_default(),
        role: parts.next().unwrap_or_default(),
        traits: parts.next().unwrap_or_default(),
    }
}

/// Parses a 1-based list position typed by the operator.
pub fn parse_position(s: &str) -> Option<usize> {
    s.trim().parse::<usize>().ok().filter(|p| *p > 0)
}

/// One targeted change to a concept. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConceptEdit {
    SetTitle(String),
    SetLogline(String),
    SetGenre(String),
    SetTargetAudience(String),
    SetSetting(String),
    SetStyle(String),
    SetWordCount(u32),
    AddCharacter(Character),
    UpdateCharacter(usize, Character),
    RemoveCharacter(usize),
    AddPlotPoint(String),
    UpdatePlotPoint(usize, String),
    RemovePlotPoint(usize),
    SetNotes(String),
}

/// Applies `edit`. Out-of-range positions leave the record untouched.
/// Returns whether anything changed.
pub fn apply_edit(concept: &mut ConceptRecord, edit: ConceptEdit) -> bool {
    match edit {
        ConceptEdit::SetTitle(v) => concept.title = v,
        ConceptEdit::SetLogline(v) => concept.logline = v,
        ConceptEdit::SetGenre(v) => concept.genre = v,
        ConceptEdit::SetTargetAudience(v) => concept.target_audience = v,
        ConceptEdit::SetSetting(v) => concept.setting = v,
        ConceptEdit::SetStyle(v) => concept.style = v,
        ConceptEdit::SetWordCount(v) => {
            concept.word_count_target = if v > 0 { v } else { DEFAULT_WORD_COUNT }
        }
        ConceptEdit::AddCharacter(c) => concept.characters.push(c),
        ConceptEdit::UpdateCharacter(pos, c) => match slot(&mut concept.characters, pos) {
            Some(existing) => *existing = c,
            None => return false,
        },
        ConceptEdit::RemoveCharacter(pos) => {
            if pos == 0 || pos > concept.characters.len() {
                return false;
            }
            concept.characters.remove(pos - 1);
        }
        ConceptEdit::AddPlotPoint(p) => concept.plot_points.push(p),
        ConceptEdit::UpdatePlotPoint(pos, p) => match slot(&mut concept.plot_points, pos) {
            Some(existing) => *existing = p,
            None => return false,
        },
        ConceptEdit::RemovePlotPoint(pos) => {
            if pos == 0 || pos > concept.plot_points.len() {
                return false;
            }
            concept.plot_points.remove(pos - 1);
        }
        ConceptEdit::SetNotes(v) => concept.additional_notes = v,
    }
    true
}

fn slot<T>(items: &mut [T], pos: usize) -> Option<&mut T> {
    pos.checked_sub(1).and_then(|i| items.get_mut(i))
}
