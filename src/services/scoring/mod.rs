//! Criterion scoring: prompt construction, the AI call and strict response parsing.

mod client;
mod error;
mod parser;
mod prompt;

use async_trait::async_trait;

use crate::db::models::{PracticeTask, Submission};
use crate::db::types::{FeedbackCategory, FeedbackSeverity};

pub(crate) use client::AnthropicScorer;
pub(crate) use error::ScoringError;

/// Confidence assumed when the model omits one.
pub(crate) const DEFAULT_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CriterionScores {
    pub(crate) task_achievement: f64,
    pub(crate) coherence_cohesion: f64,
    pub(crate) lexical_resource: f64,
    pub(crate) grammar_accuracy: f64,
}

impl CriterionScores {
    pub(crate) fn as_array(&self) -> [f64; 4] {
        [self.task_achievement, self.coherence_cohesion, self.lexical_resource, self.grammar_accuracy]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TextSpan {
    pub(crate) start: i32,
    pub(crate) end: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FeedbackItem {
    pub(crate) category: FeedbackCategory,
    pub(crate) severity: FeedbackSeverity,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) suggestion: String,
    pub(crate) highlighted_text: String,
    pub(crate) span: Option<TextSpan>,
    pub(crate) confidence: f64,
}

/// Validated output of one scoring call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoreResult {
    pub(crate) scores: CriterionScores,
    /// Overall band as reported by the model; the store recomputes its own.
    pub(crate) reported_overall: f64,
    pub(crate) confidence: f64,
    pub(crate) feedback: Vec<FeedbackItem>,
    pub(crate) model: String,
    pub(crate) duration_seconds: f64,
}

#[async_trait]
pub(crate) trait CriterionScorer: Send + Sync {
    /// Identifier recorded on the assessment when an attempt starts.
    fn model_name(&self) -> &str;

    /// Upper bound on one `score` call, in seconds.
    fn timeout_seconds(&self) -> u64;

    async fn score(
        &self,
        submission: &Submission,
        task: &PracticeTask,
    ) -> Result<ScoreResult, ScoringError>;
}
