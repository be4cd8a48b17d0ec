//! Prompt builder for turn and judge requests.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::candidate::ContentShape;
use crate::core::rules::ContentLimits;
use crate::core::types::{Persona, RejectionReason};
use crate::memory::MemorySlice;

const TURN_SYSTEM_TEMPLATE: &str = include_str!("prompts/turn_system.md");
const TURN_USER_TEMPLATE: &str = include_str!("prompts/turn_user.md");
const JUDGE_SYSTEM_TEMPLATE: &str = include_str!("prompts/judge_system.md");
const JUDGE_USER_TEMPLATE: &str = include_str!("prompts/judge_user.md");

/// A rendered system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Feedback from the previous rejected attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryNotes<'a> {
    pub reasons: &'a [RejectionReason],
    pub rejected_text: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct RetryContextView {
    reasons: Vec<&'static str>,
    text: String,
}

/// Everything a turn prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct TurnPromptInputs<'a> {
    pub topic: &'a str,
    pub persona: &'a Persona,
    pub opponent: &'a Persona,
    pub shape: ContentShape,
    pub round: u32,
    pub max_rounds: u32,
    pub limits: &'a ContentLimits,
    pub memory: &'a MemorySlice,
    pub retry: Option<RetryNotes<'a>>,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("turn_system", TURN_SYSTEM_TEMPLATE)
            .expect("turn system template should be valid");
        env.add_template("turn_user", TURN_USER_TEMPLATE)
            .expect("turn user template should be valid");
        env.add_template("judge_system", JUDGE_SYSTEM_TEMPLATE)
            .expect("judge system template should be valid");
        env.add_template("judge_user", JUDGE_USER_TEMPLATE)
            .expect("judge user template should be valid");
        Self { env }
    }

    pub fn render_turn(&self, input: &TurnPromptInputs<'_>) -> Result<PromptPair> {
        let memory = input.memory;
        let system = self.env.get_template("turn_system")?.render(context! {
            persona => input.persona,
            opponent => input.opponent,
            topic => input.topic,
            round => input.round,
            max_rounds => input.max_rounds,
            shape => input.shape.as_str(),
            first_turn => memory.last_opponent_turn.is_none(),
            limits => input.limits,
        })?;

        let retry = input.retry.map(|notes| RetryContextView {
            reasons: notes.reasons.iter().map(|r| r.as_str()).collect(),
            text: notes.rejected_text.trim().to_string(),
        });
        let user = self.env.get_template("turn_user")?.render(context! {
            round => input.round,
            summary => (!memory.summary.trim().is_empty()).then(|| memory.summary.trim()),
            recent => &memory.recent_turns,
            own_last => memory.last_own_turn.as_ref().map(|t| t.text.as_str()),
            opponent_last => memory.last_opponent_turn.as_ref().map(|t| t.text.as_str()),
            retry => retry,
        })?;

        Ok(PromptPair { system, user })
    }

    pub fn render_judge(
        &self,
        topic: &str,
        a: &Persona,
        b: &Persona,
        transcript: &str,
    ) -> Result<PromptPair> {
        let system = self.env.get_template("judge_system")?.render(context! {
            a_name => &a.name,
            b_name => &b.name,
        })?;
        let user = self.env.get_template("judge_user")?.render(context! {
            topic => topic,
            transcript => transcript.trim(),
        })?;
        Ok(PromptPair { system, user })
    }
}
