use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::models::{Assessment, Feedback};
use crate::db::types::FeedbackCategory;
use crate::services::band;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct CriterionInsight {
    pub(crate) criterion: &'static str,
    pub(crate) score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct ScoreInsights {
    pub(crate) strengths: Vec<CriterionInsight>,
    pub(crate) weaknesses: Vec<CriterionInsight>,
    pub(crate) band_description: &'static str,
}

/// Criteria at least half a band above the average are strengths, half a band below
/// are weaknesses.
pub(crate) fn score_insights(assessment: &Assessment, task_number: i32) -> ScoreInsights {
    let band_description = assessment
        .overall_band_score
        .map(band::band_description)
        .unwrap_or("Not assessed");

    let Some(scores) = assessment.criterion_scores() else {
        return ScoreInsights { strengths: Vec::new(), weaknesses: Vec::new(), band_description };
    };

    let average = band::average(scores);
    let first_label = if task_number == 1 { "Task Achievement" } else { "Task Response" };
    let labels =
        [first_label, "Coherence And Cohesion", "Lexical Resource", "Grammatical Range And Accuracy"];

    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    for (criterion, score) in labels.into_iter().zip(scores) {
        if score >= average + 0.5 {
            strengths.push(CriterionInsight { criterion, score });
        } else if score <= average - 0.5 {
            weaknesses.push(CriterionInsight { criterion, score });
        }
    }

    ScoreInsights { strengths, weaknesses, band_description }
}

/// Groups feedback by category, keeping the store's ordering inside each group.
pub(crate) fn group_feedback(items: Vec<Feedback>) -> BTreeMap<FeedbackCategory, Vec<Feedback>> {
    let mut grouped: BTreeMap<FeedbackCategory, Vec<Feedback>> = BTreeMap::new();
    for item in items {
        grouped.entry(item.category).or_default().push(item);
    }
    grouped
}
