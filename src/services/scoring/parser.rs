use serde::Deserialize;
use serde_json::Value;

use super::{
    CriterionScores, FeedbackItem, ScoringError, TextSpan, DEFAULT_CONFIDENCE,
};
use crate::db::types::{FeedbackCategory, FeedbackSeverity};
use crate::services::band;

const TITLE_MAX_CHARS: usize = 200;

/// Parsed model output before the caller attaches model name and timing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedAssessment {
    pub(crate) scores: CriterionScores,
    pub(crate) reported_overall: f64,
    pub(crate) confidence: f64,
    pub(crate) feedback: Vec<FeedbackItem>,
}

#[derive(Debug, Deserialize)]
struct RawAssessment {
    overall_score: Option<Value>,
    task_achievement: Option<Value>,
    coherence_cohesion: Option<Value>,
    lexical_resource: Option<Value>,
    grammar_accuracy: Option<Value>,
    confidence: Option<Value>,
    feedback: Option<Vec<RawFeedback>>,
}

#[derive(Debug, Deserialize)]
struct RawFeedback {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    content: Option<String>,
    severity: Option<String>,
    suggestion: Option<String>,
    highlighted_text: Option<String>,
    text_start_position: Option<Value>,
    text_end_position: Option<Value>,
    confidence: Option<Value>,
}

/// Parses the model's reply: first balanced JSON object, then strict validation.
pub(crate) fn parse_response(text: &str) -> Result<ParsedAssessment, ScoringError> {
    let block = extract_json_block(text)
        .ok_or_else(|| ScoringError::malformed("no JSON object found in response"))?;
    let raw: RawAssessment = serde_json::from_str(block)
        .map_err(|err| ScoringError::malformed(format!("invalid JSON: {err}")))?;

    let scores = CriterionScores {
        task_achievement: criterion("task_achievement", raw.task_achievement.as_ref())?,
        coherence_cohesion: criterion("coherence_cohesion", raw.coherence_cohesion.as_ref())?,
        lexical_resource: criterion("lexical_resource", raw.lexical_resource.as_ref())?,
        grammar_accuracy: criterion("grammar_accuracy", raw.grammar_accuracy.as_ref())?,
    };

    let reported_overall = required_number("overall_score", raw.overall_score.as_ref())?;
    if !(1.0..=9.0).contains(&reported_overall) {
        return Err(ScoringError::malformed(format!(
            "overall_score {reported_overall} is outside 1.0-9.0"
        )));
    }

    let confidence = confidence("confidence", raw.confidence.as_ref())?;

    let raw_feedback = raw
        .feedback
        .filter(|items| !items.is_empty())
        .ok_or_else(|| ScoringError::malformed("feedback list is missing or empty"))?;
    let feedback = raw_feedback
        .into_iter()
        .enumerate()
        .map(|(index, item)| feedback_item(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedAssessment { scores, reported_overall, confidence, feedback })
}

/// Returns the first balanced top-level `{...}` slice, ignoring braces inside JSON strings.
pub(crate) fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn required_number(field: &str, value: Option<&Value>) -> Result<f64, ScoringError> {
    let value = value
        .filter(|value| !value.is_null())
        .ok_or_else(|| ScoringError::malformed(format!("missing field {field}")))?;
    number(value).ok_or_else(|| ScoringError::malformed(format!("{field} is not a number: {value}")))
}

fn criterion(field: &str, value: Option<&Value>) -> Result<f64, ScoringError> {
    let score = required_number(field, value)?;
    if !band::is_valid_band(score) {
        return Err(ScoringError::malformed(format!(
            "{field} {score} is not a band between 1.0 and 9.0 in 0.5 steps"
        )));
    }
    Ok(score)
}

fn confidence(field: &str, value: Option<&Value>) -> Result<f64, ScoringError> {
    let Some(value) = value.filter(|value| !value.is_null()) else {
        return Ok(DEFAULT_CONFIDENCE);
    };
    let parsed = number(value)
        .ok_or_else(|| ScoringError::malformed(format!("{field} is not a number: {value}")))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(ScoringError::malformed(format!("{field} {parsed} is outside 0-1")));
    }
    Ok(parsed)
}

fn position(field: &str, value: Option<&Value>) -> Result<Option<i32>, ScoringError> {
    let Some(value) = value.filter(|value| !value.is_null()) else {
        return Ok(None);
    };
    let parsed = number(value)
        .ok_or_else(|| ScoringError::malformed(format!("{field} is not a number: {value}")))?;
    if parsed < 0.0 || parsed.fract() != 0.0 || parsed > f64::from(i32::MAX) {
        return Err(ScoringError::malformed(format!(
            "{field} {parsed} is not a character offset"
        )));
    }
    Ok(Some(parsed as i32))
}

fn feedback_item(index: usize, raw: RawFeedback) -> Result<FeedbackItem, ScoringError> {
    let missing = |field: &str| ScoringError::malformed(format!("feedback[{index}] is missing {field}"));

    let kind = raw.kind.ok_or_else(|| missing("type"))?;
    let category = FeedbackCategory::parse(&kind).ok_or_else(|| {
        ScoringError::malformed(format!("feedback[{index}] has unknown type {kind:?}"))
    })?;

    let severity = match raw.severity.as_deref() {
        None => FeedbackSeverity::Info,
        Some(value) => FeedbackSeverity::parse(value).ok_or_else(|| {
            ScoringError::malformed(format!("feedback[{index}] has unknown severity {value:?}"))
        })?,
    };

    let title = raw.title.map(|title| title.trim().to_string()).ok_or_else(|| missing("title"))?;
    if title.is_empty() {
        return Err(missing("title"));
    }
    let content = raw.content.ok_or_else(|| missing("content"))?;

    let start = position("text_start_position", raw.text_start_position.as_ref())?;
    let end = position("text_end_position", raw.text_end_position.as_ref())?;
    let span = match (start, end) {
        (None, None) => None,
        (Some(start), Some(end)) if end >= start => Some(TextSpan { start, end }),
        (Some(start), Some(end)) => {
            return Err(ScoringError::malformed(format!(
                "feedback[{index}] span ends at {end} before it starts at {start}"
            )));
        }
        _ => {
            return Err(ScoringError::malformed(format!(
                "feedback[{index}] has only one span position"
            )));
        }
    };

    Ok(FeedbackItem {
        category,
        severity,
        title: title.chars().take(TITLE_MAX_CHARS).collect(),
        content,
        suggestion: raw.suggestion.unwrap_or_default(),
        highlighted_text: raw.highlighted_text.unwrap_or_default(),
        span,
        confidence: confidence(&format!("feedback[{index}].confidence"), raw.confidence.as_ref())?,
    })
}
