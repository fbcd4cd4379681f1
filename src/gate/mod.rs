//! Confirmation gates - yes/no and free-text answers that steps block on

use crate::core::error::{PipelineError, Result};
use async_trait::async_trait;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Source of operator answers.
///
/// `key` names the config key the answer will be stored under; scripted
/// implementations use it to look answers up.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// Ask a yes/no question
    async fn confirm(&self, key: &str, message: &str) -> Result<bool>;

    /// Ask for a free-text answer, hidden when `secret` is set
    async fn ask(&self, key: &str, message: &str, secret: bool) -> Result<String>;
}

/// Terminal prompts
#[derive(Debug, Clone, Default)]
pub struct InteractiveGate;

impl InteractiveGate {
    pub fn new() -> Self {
        Self
    }
}

fn prompt_error(key: &str, error: impl std::fmt::Display) -> PipelineError {
    PipelineError::InvalidInput {
        key: key.to_string(),
        reason: error.to_string(),
    }
}

#[async_trait]
impl ConfirmationGate for InteractiveGate {
    async fn confirm(&self, key: &str, message: &str) -> Result<bool> {
        let prompt = message.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await
        .map_err(|e| prompt_error(key, e))?;

        answer.map_err(|e| prompt_error(key, e))
    }

    async fn ask(&self, key: &str, message: &str, secret: bool) -> Result<String> {
        let prompt = message.trim_end().trim_end_matches(':').to_string();
        let answer = tokio::task::spawn_blocking(move || {
            let theme = ColorfulTheme::default();
            if secret {
                Password::with_theme(&theme)
                    .with_prompt(prompt)
                    .allow_empty_password(true)
                    .interact()
            } else {
                Input::<String>::with_theme(&theme)
                    .with_prompt(prompt)
                    .allow_empty(true)
                    .interact_text()
            }
        })
        .await
        .map_err(|e| prompt_error(key, e))?;

        answer.map_err(|e| prompt_error(key, e))
    }
}

/// Fixed answers keyed by config key, for tests and non-interactive runs.
///
/// Several answers may be queued for one key; each question consumes one.
/// Unanswered questions go to the fallback gate, or fail with
/// `InvalidInput` when there is none.
#[derive(Default)]
pub struct ScriptedGate {
    answers: Mutex<HashMap<String, VecDeque<String>>>,
    assume_yes: bool,
    fallback: Option<Arc<dyn ConfirmationGate>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for a key
    pub fn with_answer(self, key: impl Into<String>, answer: impl Into<String>) -> Self {
        if let Ok(mut answers) = self.answers.lock() {
            answers.entry(key.into()).or_default().push_back(answer.into());
        }
        self
    }

    /// Answer yes to every confirmation without a scripted answer
    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    /// Ask this gate when no scripted answer exists
    pub fn with_fallback(mut self, fallback: Arc<dyn ConfirmationGate>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Keys that were asked, in order
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn next_answer(&self, key: &str) -> Option<String> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(key.to_string());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.get_mut(key).and_then(|queue| queue.pop_front()))
    }
}

fn parse_yes_no(key: &str, answer: &str) -> Result<bool> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" | "true" => Ok(true),
        "n" | "no" | "false" => Ok(false),
        other => Err(PipelineError::InvalidInput {
            key: key.to_string(),
            reason: format!("'{}' is not a yes/no answer", other),
        }),
    }
}

#[async_trait]
impl ConfirmationGate for ScriptedGate {
    async fn confirm(&self, key: &str, message: &str) -> Result<bool> {
        if let Some(answer) = self.next_answer(key) {
            debug!("Scripted confirmation for '{}': {}", key, answer);
            return parse_yes_no(key, &answer);
        }
        if self.assume_yes {
            debug!("Assuming yes for '{}'", key);
            return Ok(true);
        }
        match &self.fallback {
            Some(fallback) => fallback.confirm(key, message).await,
            None => Err(PipelineError::InvalidInput {
                key: key.to_string(),
                reason: "no answer supplied".to_string(),
            }),
        }
    }

    async fn ask(&self, key: &str, message: &str, secret: bool) -> Result<String> {
        if let Some(answer) = self.next_answer(key) {
            debug!("Scripted answer for '{}'", key);
            return Ok(answer);
        }
        match &self.fallback {
            Some(fallback) => fallback.ask(key, message, secret).await,
            None => Err(PipelineError::InvalidInput {
                key: key.to_string(),
                reason: "no answer supplied".to_string(),
            }),
        }
    }
}
