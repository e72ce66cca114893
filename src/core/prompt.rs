use inquire::InquireError;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Operator input. An answer is always produced; the empty string doubles
/// as the terminator for list collection.
pub trait Prompter: Send + Sync {
    fn ask(&self, question: &str) -> String;
}

pub struct ConsolePrompter;

impl ConsolePrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsolePrompter {
    fn default() -> Self {
        Self::new()
    }
}

/// Esc counts as an empty answer. Ctrl-C, a missing terminal and I/O
/// errors are returned so the caller can stop the run.
pub fn answer_or_abort(result: Result<String, InquireError>) -> Result<String, InquireError> {
    match result {
        Err(InquireError::OperationCanceled) => {
            log::debug!("Prompt canceled, treating as empty answer");
            Ok(String::new())
        }
        other => other,
    }
}

impl Prompter for ConsolePrompter {
    fn ask(&self, question: &str) -> String {
        match answer_or_abort(inquire::Text::new(question).prompt()) {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("Cannot read operator input: {}", e);
                eprintln!("已中断。");
                let code = match e {
                    InquireError::OperationInterrupted => 130,
                    _ => 1,
                };
                std::process::exit(code);
            }
        }
    }
}

/// Replays canned answers in order.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().map(|a| a.len()).unwrap_or(0)
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, question: &str) -> String {
        log::debug!("Scripted answer for: {}", question);
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or_default()
    }
}
