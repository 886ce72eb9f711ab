//! Operator prompts, injectable so runs can be scripted.
//!
//! Every prompt carries a default. Blank input, end of input and repeated
//! unrecognised answers all resolve to it, so a detached run never blocks.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::io::{BufRead, Write};

use serde::Serialize;

use crate::core::tier::CleanupTier;

/// Invalid answers tolerated before the default is taken.
const MAX_ATTEMPTS: usize = 3;

/// Identifies a question independently of its wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptKey {
    Tier,
    ContinueWithoutElevation,
    IncludeUpdateCache,
    ScanLargeFiles,
}

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub key: PromptKey,
    pub question: String,
    pub choices: Vec<String>,
    /// Index into `choices`.
    pub default: usize,
}

impl Prompt {
    /// `Yes`/`No` question; index 0 is yes.
    #[must_use]
    pub fn yes_no(key: PromptKey, question: &str, default_yes: bool) -> Self {
        Self {
            key,
            question: question.to_string(),
            choices: vec!["Yes".to_string(), "No".to_string()],
            default: usize::from(!default_yes),
        }
    }

    /// Tier selection; choices follow [`CleanupTier::ALL`], default Light.
    #[must_use]
    pub fn tier() -> Self {
        Self {
            key: PromptKey::Tier,
            question: "Select a cleanup tier".to_string(),
            choices: CleanupTier::ALL
                .iter()
                .map(|tier| capitalize(tier.as_str()))
                .collect(),
            default: 0,
        }
    }

    /// Match free-form input: a 1-based number, or a case-insensitive prefix
    /// of exactly one choice.
    #[must_use]
    pub fn parse_answer(&self, input: &str) -> Option<usize> {
        let input = input.trim().to_ascii_lowercase();
        if input.is_empty() {
            return None;
        }
        if let Ok(number) = input.parse::<usize>() {
            return (1..=self.choices.len())
                .contains(&number)
                .then(|| number - 1);
        }
        let mut matches = self
            .choices
            .iter()
            .enumerate()
            .filter(|(_, choice)| choice.to_ascii_lowercase().starts_with(&input));
        match (matches.next(), matches.next()) {
            (Some((index, _)), None) => Some(index),
            _ => None,
        }
    }
}

/// Source of operator answers.
pub trait Prompter {
    /// Index of the chosen answer; must be within `prompt.choices`.
    fn choose(&mut self, prompt: &Prompt) -> usize;
}

/// Ask a yes/no question; `true` means yes.
pub fn confirm(prompter: &mut dyn Prompter, key: PromptKey, question: &str, default_yes: bool) -> bool {
    let prompt = Prompt::yes_no(key, question, default_yes);
    prompter.choose(&prompt) == 0
}

/// Ask for a tier.
pub fn choose_tier(prompter: &mut dyn Prompter) -> CleanupTier {
    let prompt = Prompt::tier();
    let index = prompter.choose(&prompt);
    CleanupTier::ALL
        .get(index)
        .copied()
        .unwrap_or_default()
}

/// Line-oriented prompts over any reader and writer.
pub struct ConsolePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsolePrompter<R, W> {
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn render(&mut self, prompt: &Prompt) {
        let _ = writeln!(self.output, "{}", prompt.question);
        for (index, choice) in prompt.choices.iter().enumerate() {
            let marker = if index == prompt.default {
                " (default)"
            } else {
                ""
            };
            let _ = writeln!(self.output, "  [{}] {choice}{marker}", index + 1);
        }
        let _ = write!(self.output, "> ");
        let _ = self.output.flush();
    }
}

impl<R: BufRead, W: Write> Prompter for ConsolePrompter<R, W> {
    fn choose(&mut self, prompt: &Prompt) -> usize {
        for _ in 0..MAX_ATTEMPTS {
            self.render(prompt);
            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    let _ = writeln!(self.output);
                    return prompt.default;
                }
                Ok(_) => {}
            }
            if line.trim().is_empty() {
                return prompt.default;
            }
            if let Some(index) = prompt.parse_answer(&line) {
                return index;
            }
            let _ = writeln!(
                self.output,
                "Unrecognised answer {:?}; enter a number from 1 to {}.",
                line.trim(),
                prompt.choices.len()
            );
        }
        prompt.default
    }
}

/// Pre-recorded answers, with an optional prompter for everything else.
///
/// Without a fallback, unanswered prompts take their default. Every key asked
/// is recorded in order.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: HashMap<PromptKey, usize>,
    fallback: Option<Box<dyn Prompter>>,
    asked: Vec<PromptKey>,
}

impl ScriptedPrompter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn answer(mut self, key: PromptKey, index: usize) -> Self {
        self.answers.insert(key, index);
        self
    }

    #[must_use]
    pub fn answer_yes_no(self, key: PromptKey, yes: bool) -> Self {
        self.answer(key, usize::from(!yes))
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Box<dyn Prompter>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn asked(&self) -> &[PromptKey] {
        &self.asked
    }
}

impl Prompter for ScriptedPrompter {
    fn choose(&mut self, prompt: &Prompt) -> usize {
        self.asked.push(prompt.key);
        let index = match (self.answers.get(&prompt.key), self.fallback.as_mut()) {
            (Some(index), _) => *index,
            (None, Some(fallback)) => fallback.choose(prompt),
            (None, None) => prompt.default,
        };
        if index < prompt.choices.len() {
            index
        } else {
            prompt.default
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_ascii_uppercase().to_string() + chars.as_str()
    })
}
