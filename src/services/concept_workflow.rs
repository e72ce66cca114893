use crate::core::state::{Character, ConceptRecord, ConceptWorkflowState};
use crate::engine::{GraphBuilder, GraphError, Step, Target, WorkflowGraph, END};
use crate::services::concept::{
    apply_edit, parse_concept, parse_manual_character, parse_position, parse_word_count,
    ConceptEdit, CONCEPT_PROMPT, CONCEPT_SYSTEM_PROMPT,
};
use crate::services::context::StepContext;
use crate::services::record::render_concept;
use anyhow::Result;
use async_trait::async_trait;
use strum::{EnumIter, IntoStaticStr};

pub const COLLECT_CONCEPT: &str = "collect_concept";
pub const SUMMARIZE: &str = "summarize";
pub const GET_FEEDBACK: &str = "get_feedback";
pub const MODIFY: &str = "modify";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConceptDecision {
    NeedFeedback,
    Confirmed,
}

/// Another feedback round while the operator asks for one and the round
/// budget is not spent.
pub fn concept_decision(state: &ConceptWorkflowState) -> ConceptDecision {
    if state.feedback_needed && !feedback_budget_spent(state) {
        ConceptDecision::NeedFeedback
    } else {
        ConceptDecision::Confirmed
    }
}

pub fn feedback_budget_spent(state: &ConceptWorkflowState) -> bool {
    state.feedback_rounds >= state.max_feedback_rounds
}

pub fn concept_workflow(
    ctx: StepContext,
) -> Result<WorkflowGraph<ConceptWorkflowState>, GraphError> {
    GraphBuilder::new()
        .add_step(COLLECT_CONCEPT, CollectConcept { ctx: ctx.clone() })
        .add_step(SUMMARIZE, Summarize { ctx: ctx.clone() })
        .add_step(GET_FEEDBACK, GetFeedback { ctx: ctx.clone() })
        .add_step(MODIFY, Modify { ctx })
        .set_entry(COLLECT_CONCEPT)
        .add_edge(COLLECT_CONCEPT, Target::Step(SUMMARIZE))
        .add_conditional_edges(
            SUMMARIZE,
            concept_decision,
            [
                (ConceptDecision::NeedFeedback, Target::Step(GET_FEEDBACK)),
                (ConceptDecision::Confirmed, END),
            ],
        )
        .add_edge(GET_FEEDBACK, Target::Step(MODIFY))
        .add_edge(MODIFY, Target::Step(SUMMARIZE))
        .build()
}

/// Lets the operator pick manual entry or generation; generation problems
/// fall back to manual entry.
async fn collect(ctx: &StepContext) -> ConceptRecord {
    println!("\n=== 小说概念收集 ===");
    println!("请选择概念收集方式：");
    println!("1. 手动输入");
    println!("2. AI 自动生成");

    if ctx.ask("请选择（1-2）：").trim() == "2" {
        println!("\n=== AI 正在生成小说概念 ===");
        match generate_concept(ctx).await {
            Ok(concept) => {
                println!("AI 已生成小说概念，请查看并确认。");
                return concept;
            }
            Err(e) => {
                log::warn!("Concept generation failed: {:#}", e);
                println!("AI 生成失败，请手动输入小说概念。");
            }
        }
    }

    collect_manually(ctx)
}

async fn generate_concept(ctx: &StepContext) -> Result<ConceptRecord> {
    let text = ctx.generate(CONCEPT_SYSTEM_PROMPT, CONCEPT_PROMPT).await?;
    Ok(parse_concept(&text)?)
}

fn collect_manually(ctx: &StepContext) -> ConceptRecord {
    println!("\n请回答以下问题来帮助我们理解您的小说构想：");

    let mut concept = ConceptRecord {
        title: ctx.ask("1. 小说的暂定标题是什么？"),
        logline: ctx.ask("2. 用一句话概括这个故事："),
        genre: ctx.ask("3. 您期望的小说类型是什么？（如：奇幻、科幻、言情等）"),
        target_audience: ctx.ask("4. 目标读者群体是？"),
        setting: ctx.ask("5. 故事发生的背景设定是？"),
        style: ctx.ask("6. 期望的写作风格是？（如：轻松、严肃、悬疑等）"),
        word_count_target: parse_word_count(&ctx.ask("7. 预计字数目标是多少？")),
        ..Default::default()
    };

    println!("\n8. 请描述主要人物（每行一个，格式：姓名,角色,特点）：");
    loop {
        let line = ctx.ask("输入人物信息（直接回车结束）：");
        if line.trim().is_empty() {
            break;
        }
        concept.characters.push(parse_manual_character(&line));
    }

    println!("\n9. 请描述关键情节点（每行一个）：");
    loop {
        let line = ctx.ask("输入情节点（直接回车结束）：");
        if line.trim().is_empty() {
            break;
        }
        concept.plot_points.push(line.trim().to_string());
    }

    concept.additional_notes = ctx.ask("10. 其他补充说明：");
    concept
}

pub struct CollectConcept {
    ctx: StepContext,
}

#[async_trait]
impl Step<ConceptWorkflowState> for CollectConcept {
    async fn run(&self, state: &mut ConceptWorkflowState) -> Result<()> {
        state.concept = collect(&self.ctx).await;
        Ok(())
    }
}

pub struct Summarize {
    ctx: StepContext,
}

#[async_trait]
impl Step<ConceptWorkflowState> for Summarize {
    async fn run(&self, state: &mut ConceptWorkflowState) -> Result<()> {
        println!("\n=== 当前小说概念总结 ===");
        print!("{}", render_concept(&state.concept));

        println!("\n=== 概念确认 ===");
        println!("1. 确认并继续");
        println!("2. 需要修改");
        println!("3. 重新开始");
        let choice = self.ctx.ask("请选择（1-3）：");

        match choice.trim() {
            "1" => {
                state.feedback_needed = false;
                state.restart_requested = false;
            }
            "3" => {
                state.feedback_needed = true;
                state.restart_requested = true;
            }
            _ => {
                state.feedback_needed = true;
                state.restart_requested = false;
            }
        }
        state.user_input = choice;

        if state.feedback_needed && feedback_budget_spent(state) {
            log::info!(
                "Feedback budget of {} rounds spent, keeping current concept",
                state.max_feedback_rounds
            );
            println!("已达到最大修改次数，将使用当前版本继续。");
        }
        Ok(())
    }
}

pub struct GetFeedback {
    ctx: StepContext,
}

#[async_trait]
impl Step<ConceptWorkflowState> for GetFeedback {
    async fn run(&self, state: &mut ConceptWorkflowState) -> Result<()> {
        if state.restart_requested {
            return Ok(());
        }

        println!("\n=== 修改概念 ===");
        for (i, item) in [
            "标题",
            "故事梗概",
            "类型",
            "目标读者",
            "背景设定",
            "写作风格",
            "目标字数",
            "主要人物",
            "关键情节点",
            "补充说明",
        ]
        .iter()
        .enumerate()
        {
            println!("{}. {}", i + 1, item);
        }
        state.user_input = self.ctx.ask("请选择要修改的项目（1-10）：");
        Ok(())
    }
}

pub struct Modify {
    ctx: StepContext,
}

#[async_trait]
impl Step<ConceptWorkflowState> for Modify {
    async fn run(&self, state: &mut ConceptWorkflowState) -> Result<()> {
        if state.restart_requested {
            state.restart_requested = false;
            state.feedback_rounds = 0;
            state.concept = collect(&self.ctx).await;
            return Ok(());
        }

        state.feedback_rounds += 1;

        match prompt_edit(&self.ctx, &state.concept, &state.user_input) {
            Some(edit) => {
                log::debug!("Applying concept edit: {:?}", edit);
                if !apply_edit(&mut state.concept, edit) {
                    println!("编号超出范围，未做修改。");
                }
            }
            None => log::info!("No concept edit for input {:?}", state.user_input),
        }
        Ok(())
    }
}

/// Asks for the new value of the item chosen in `item`.
fn prompt_edit(ctx: &StepContext, concept: &ConceptRecord, item: &str) -> Option<ConceptEdit> {
    let edit = match item.trim() {
        "1" => ConceptEdit::SetTitle(ctx.ask("新的标题：")),
        "2" => ConceptEdit::SetLogline(ctx.ask("新的故事梗概：")),
        "3" => ConceptEdit::SetGenre(ctx.ask("新的类型：")),
        "4" => ConceptEdit::SetTargetAudience(ctx.ask("新的目标读者：")),
        "5" => ConceptEdit::SetSetting(ctx.ask("新的背景设定：")),
        "6" => ConceptEdit::SetStyle(ctx.ask("新的写作风格：")),
        "7" => ConceptEdit::SetWordCount(parse_word_count(&ctx.ask("新的目标字数："))),
        "8" => {
            println!("当前人物列表：");
            for (i, c) in concept.characters.iter().enumerate() {
                println!("{}. {}（{}）：{}", i + 1, c.name, c.role, c.traits);
            }
            match ctx.ask("请选择操作（1. 添加 2. 修改 3. 删除）：").trim() {
                "1" => ConceptEdit::AddCharacter(ask_character(ctx)),
                "2" => {
                    let pos = parse_position(&ctx.ask("要修改的人物编号："))?;
                    if pos > concept.characters.len() {
                        return Some(ConceptEdit::UpdateCharacter(pos, Character::default()));
                    }
                    ConceptEdit::UpdateCharacter(pos, ask_character(ctx))
                }
                "3" => ConceptEdit::RemoveCharacter(parse_position(&ctx.ask("要删除的人物编号："))?),
                _ => return None,
            }
        }
        "9" => {
            println!("当前情节点列表：");
            for (i, point) in concept.plot_points.iter().enumerate() {
                println!("{}. {}", i + 1, point);
            }
            match ctx.ask("请选择操作（1. 添加 2. 修改 3. 删除）：").trim() {
                "1" => ConceptEdit::AddPlotPoint(ctx.ask("新的情节点：")),
                "2" => {
                    let pos = parse_position(&ctx.ask("要修改的情节点编号："))?;
                    if pos > concept.plot_points.len() {
                        return Some(ConceptEdit::UpdatePlotPoint(pos, String::new()));
                    }
                    ConceptEdit::UpdatePlotPoint(pos, ctx.ask("新的情节点："))
                }
                "3" => ConceptEdit::RemovePlotPoint(parse_position(&ctx.ask("要删除的情节点编号："))?),
                _ => return None,
            }
        }
        "10" => ConceptEdit::SetNotes(ctx.ask("新的补充说明：")),
        _ => return None,
    };
    Some(edit)
}

fn ask_character(ctx: &StepContext) -> Character {
    Character {
        name: ctx.ask("姓名："),
        role: ctx.ask("角色："),
        traits: ctx.ask("特点："),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::io::NativeStorage;
    use crate::core::prompt::ScriptedPrompter;
    use crate::engine::Executor;
    use crate::services::llm::LlmClient;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct MockLlmClient {
        reply: Option<String>,
        call_count: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String> {
            *self.call_count.lock().unwrap() += 1;
            assert!(prompt.contains("标题：[标题]"));
            self.reply.clone().ok_or_else(|| anyhow!("status 500"))
        }
    }

    struct Harness {
        ctx: StepContext,
        prompter: Arc<ScriptedPrompter>,
        llm_calls: Arc<Mutex<usize>>,
    }

    fn harness(answers: Vec<&str>, reply: Option<&str>) -> Harness {
        let prompter = Arc::new(ScriptedPrompter::new(answers));
        let llm_calls = Arc::new(Mutex::new(0));
        let llm = Arc::new(MockLlmClient {
            reply: reply.map(str::to_string),
            call_count: llm_calls.clone(),
        });
        let ctx = StepContext::new(
            Arc::new(Config::default()),
            llm,
            prompter.clone(),
            Arc::new(NativeStorage::new()),
        );
        Harness {
            ctx,
            prompter,
            llm_calls,
        }
    }

    /// Answers for one manual collection pass, mode selection included.
    fn manual_answers(title: &str) -> Vec<&str> {
        vec![
            "1",
            title,
            "一名领航员寻找回家的航线",
            "科幻",
            "青年读者",
            "银河边缘",
            "冷峻",
            "about 50,000 words",
            "林遥,主角,沉默",
            "苏岚,搭档",
            "",
            "醒来",
            "出发",
            "归来",
            "",
            "无",
        ]
    }

    async fn run(
        h: &Harness,
        max_rounds: u32,
    ) -> Result<(ConceptWorkflowState, Vec<&'static str>)> {
        let graph = concept_workflow(h.ctx.clone())?;
        Ok(Executor::new(&graph)
            .run_traced(ConceptWorkflowState::new(max_rounds))
            .await?)
    }

    #[test]
    fn test_concept_decision() {
        let mut state = ConceptWorkflowState::new(10);
        assert_eq!(concept_decision(&state), ConceptDecision::Confirmed);
        state.feedback_needed = true;
        assert_eq!(concept_decision(&state), ConceptDecision::NeedFeedback);
        state.feedback_rounds = 10;
        assert_eq!(concept_decision(&state), ConceptDecision::Confirmed);
    }

    #[test]
    fn test_label_names() {
        let need: &'static str = ConceptDecision::NeedFeedback.into();
        let done: &'static str = ConceptDecision::Confirmed.into();
        assert_eq!(need, "need_feedback");
        assert_eq!(done, "confirmed");
    }

    #[tokio::test]
    async fn test_manual_collection_keeps_order_and_count() -> Result<()> {
        let mut answers = manual_answers("星海");
        answers.push("1");
        let h = harness(answers, None);

        let (state, trace) = run(&h, 10).await?;
        let concept = state.concept;

        assert_eq!(trace, vec![COLLECT_CONCEPT, SUMMARIZE]);
        assert_eq!(concept.title, "星海");
        assert_eq!(concept.word_count_target, 50_000);
        assert_eq!(concept.characters.len(), 2);
        assert_eq!(concept.characters[0].name, "林遥");
        assert_eq!(concept.characters[1].name, "苏岚");
        assert_eq!(concept.characters[1].traits, "");
        assert_eq!(concept.plot_points, vec!["醒来", "出发", "归来"]);
        assert_eq!(concept.additional_notes, "无");
        assert_eq!(*h.llm_calls.lock().unwrap(), 0);
        assert_eq!(h.prompter.remaining(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_two_feedback_rounds_modify_twice() -> Result<()> {
        let mut answers = manual_answers("星海");
        answers.extend([
            // round 1: rename
            "2", "1", "新星海",
            // round 2: remove plot point 9 (out of range)
            "2", "9", "3", "9",
            // confirm
            "1",
        ]);
        let h = harness(answers, None);

        let (state, trace) = run(&h, 10).await?;

        assert_eq!(trace.iter().filter(|s| **s == MODIFY).count(), 2);
        assert_eq!(trace.last(), Some(&SUMMARIZE));
        assert_eq!(state.feedback_rounds, 2);
        assert!(!state.feedback_needed);
        assert_eq!(state.concept.title, "新星海");
        assert_eq!(state.concept.plot_points, vec!["醒来", "出发", "归来"]);
        assert_eq!(h.prompter.remaining(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_edits_through_modify() -> Result<()> {
        let mut answers = manual_answers("星海");
        answers.extend([
            "2", "8", "1", "赫尔", "反派", "冷酷",
            "2", "9", "2", "2", "启航",
            "2", "8", "3", "1",
            "1",
        ]);
        let h = harness(answers, None);

        let (state, _) = run(&h, 10).await?;
        let names: Vec<_> = state.concept.characters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["苏岚", "赫尔"]);
        assert_eq!(state.concept.plot_points, vec!["醒来", "启航", "归来"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_ai_generation_fills_concept() -> Result<()> {
        let reply = "标题：星海归途\n类型：科幻\n预计字数：十万字\n主要人物：\n1. 林遥 - 主角：沉默\n关键情节点：\n1. 醒来\n2. 归来\n";
        let h = harness(vec!["2", "1"], Some(reply));

        let (state, _) = run(&h, 10).await?;
        assert_eq!(state.concept.title, "星海归途");
        assert_eq!(state.concept.word_count_target, 50_000);
        assert_eq!(state.concept.characters.len(), 1);
        assert_eq!(state.concept.plot_points.len(), 2);
        assert_eq!(*h.llm_calls.lock().unwrap(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_ai_failure_falls_back_to_manual() -> Result<()> {
        let mut answers = manual_answers("手动标题");
        answers[0] = "2";
        answers.push("1");
        let h = harness(answers, None);

        let (state, _) = run(&h, 10).await?;
        assert_eq!(state.concept.title, "手动标题");
        assert_eq!(*h.llm_calls.lock().unwrap(), 1);
        assert_eq!(h.prompter.remaining(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_ai_output_falls_back_to_manual() -> Result<()> {
        let mut answers = manual_answers("手动标题");
        answers[0] = "2";
        answers.push("1");
        let h = harness(answers, Some("抱歉，我无法完成这个请求。"));

        let (state, _) = run(&h, 10).await?;
        assert_eq!(state.concept.title, "手动标题");
        Ok(())
    }

    #[tokio::test]
    async fn test_restart_recollects_fresh_record() -> Result<()> {
        let mut answers = manual_answers("第一版");
        answers.push("3");
        answers.extend(manual_answers("第二版"));
        answers.push("1");
        let h = harness(answers, None);

        let (state, trace) = run(&h, 10).await?;
        assert_eq!(
            trace,
            vec![COLLECT_CONCEPT, SUMMARIZE, GET_FEEDBACK, MODIFY, SUMMARIZE]
        );
        assert_eq!(state.concept.title, "第二版");
        assert_eq!(state.concept.characters.len(), 2);
        assert_eq!(state.concept.plot_points.len(), 3);
        assert_eq!(state.feedback_rounds, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_restart_gives_fresh_round_budget() -> Result<()> {
        let mut answers = manual_answers("第一版");
        // one edit spends the only round
        answers.extend(["2", "1", "改名"]);
        // the cap is reached, so a restart request ends the loop
        answers.push("3");
        let h = harness(answers, None);
        let (state, trace) = run(&h, 1).await?;
        assert_eq!(trace.iter().filter(|s| **s == MODIFY).count(), 1);
        assert!(feedback_budget_spent(&state));

        let mut answers = manual_answers("第一版");
        // restart first, then the single round is still available for an edit
        answers.push("3");
        answers.extend(manual_answers("第二版"));
        answers.extend(["2", "1", "第三版", "1"]);
        let h = harness(answers, None);
        let (state, trace) = run(&h, 1).await?;
        assert_eq!(trace.iter().filter(|s| **s == MODIFY).count(), 2);
        assert_eq!(state.concept.title, "第三版");
        assert_eq!(state.feedback_rounds, 1);
        assert_eq!(h.prompter.remaining(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_feedback_round_cap_confirms() -> Result<()> {
        let mut answers = manual_answers("星海");
        answers.extend(["2", "1", "改名", "2"]);
        let h = harness(answers, None);

        let (state, trace) = run(&h, 1).await?;
        assert_eq!(trace.iter().filter(|s| **s == MODIFY).count(), 1);
        assert_eq!(state.concept.title, "改名");
        assert!(state.feedback_needed);
        assert!(feedback_budget_spent(&state));
        assert_eq!(concept_decision(&state), ConceptDecision::Confirmed);
        Ok(())
    }
}
