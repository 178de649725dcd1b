use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::parser::parse_response;
use super::prompt::build_prompt;
use super::{CriterionScorer, ScoreResult, ScoringError};
use crate::core::config::Settings;
use crate::db::models::{PracticeTask, Submission};

const BODY_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub(crate) struct ScorerConfig {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) api_version: String,
    pub(crate) model: String,
    pub(crate) max_tokens: u32,
    pub(crate) temperature: f64,
    pub(crate) timeout: Duration,
}

/// Scores submissions through the Anthropic Messages API.
#[derive(Debug, Clone)]
pub(crate) struct AnthropicScorer {
    client: Client,
    config: ScorerConfig,
}

impl AnthropicScorer {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let ai = settings.ai();
        Self::new(ScorerConfig {
            api_key: ai.api_key.clone(),
            base_url: ai.base_url.clone(),
            api_version: ai.api_version.clone(),
            model: ai.model.clone(),
            max_tokens: ai.max_tokens,
            temperature: ai.temperature,
            timeout: Duration::from_secs(ai.request_timeout),
        })
    }

    pub(crate) fn new(mut config: ScorerConfig) -> anyhow::Result<Self> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30).min(config.timeout))
            .timeout(config.timeout)
            .build()
            .context("Failed to build AI HTTP client")?;

        Ok(Self { client, config })
    }

    async fn send(&self, prompt: String) -> Result<String, ScoringError> {
        let payload = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&payload)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| self.transport_error(err))?;

        if !status.is_success() {
            return Err(ScoringError::Status {
                status: status.as_u16(),
                body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
            });
        }

        response_text(&body)
    }

    fn transport_error(&self, err: reqwest::Error) -> ScoringError {
        if err.is_timeout() {
            ScoringError::Timeout(self.config.timeout.as_secs())
        } else {
            ScoringError::Transport(err.to_string())
        }
    }
}

/// Concatenates the text blocks of a Messages API response body.
fn response_text(body: &str) -> Result<String, ScoringError> {
    let parsed: Value = serde_json::from_str(body)
        .map_err(|err| ScoringError::malformed(format!("response body is not JSON: {err}")))?;

    let text = parsed
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ScoringError::malformed("response has no text content"));
    }
    Ok(text)
}

#[async_trait]
impl CriterionScorer for AnthropicScorer {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn timeout_seconds(&self) -> u64 {
        self.config.timeout.as_secs()
    }

    async fn score(
        &self,
        submission: &Submission,
        task: &PracticeTask,
    ) -> Result<ScoreResult, ScoringError> {
        if submission.content.trim().is_empty() {
            return Err(ScoringError::InvalidInput(format!(
                "submission {} has no content",
                submission.id
            )));
        }

        let timer = Instant::now();
        tracing::info!(
            submission_id = %submission.id,
            task_code = %task.task_code,
            model = %self.config.model,
            "Sending assessment request to AI"
        );

        let text = self.send(build_prompt(submission, task)).await?;
        let parsed = parse_response(&text).inspect_err(|err| {
            tracing::warn!(
                submission_id = %submission.id,
                error = %err,
                response_chars = text.len(),
                "AI response failed validation"
            );
        })?;

        let duration_seconds = timer.elapsed().as_secs_f64();
        tracing::info!(
            submission_id = %submission.id,
            duration_seconds,
            feedback_items = parsed.feedback.len(),
            "AI assessment received"
        );

        Ok(ScoreResult {
            scores: parsed.scores,
            reported_overall: parsed.reported_overall,
            confidence: parsed.confidence,
            feedback: parsed.feedback,
            model: self.config.model.clone(),
            duration_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ModuleType;
    use crate::test_support::fixtures;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scorer(base_url: &str, timeout: Duration) -> AnthropicScorer {
        AnthropicScorer::new(ScorerConfig {
            api_key: "test-key".to_string(),
            base_url: format!("{base_url}/"),
            api_version: "2023-06-01".to_string(),
            model: "claude-test".to_string(),
            max_tokens: 4000,
            temperature: 0.3,
            timeout,
        })
        .expect("scorer")
    }

    fn messages_body(text: &str) -> Value {
        json!({
            "id": "msg_test",
            "type": "message",
            "role": "assistant",
            "model": "claude-test",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn"
        })
    }

    const VALID_REPLY: &str = r#"Assessment follows.
{"overall_score": 7.0, "task_achievement": 7.0, "coherence_cohesion": 6.5,
 "lexical_resource": 7.5, "grammar_accuracy": 7.0, "confidence": 0.9,
 "feedback": [{"type": "overall", "title": "Overall", "content": "Solid.", "severity": "info"}]}"#;

    #[tokio::test]
    async fn scores_submission_through_messages_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({"model": "claude-test", "max_tokens": 4000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(messages_body(VALID_REPLY)))
            .expect(1)
            .mount(&server)
            .await;

        let task = fixtures::practice_task(1, ModuleType::Academic);
        let submission = fixtures::submission(&task, "The graph shows...", 180);

        let result = scorer(&server.uri(), Duration::from_secs(5))
            .score(&submission, &task)
            .await
            .expect("score");

        assert_eq!(result.scores.as_array(), [7.0, 6.5, 7.5, 7.0]);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.model, "claude-test");
        assert_eq!(result.feedback.len(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let task = fixtures::practice_task(2, ModuleType::Academic);
        let submission = fixtures::submission(&task, "Some people think...", 260);

        let err = scorer(&server.uri(), Duration::from_secs(5))
            .score(&submission, &task)
            .await
            .expect_err("status error");

        match err {
            ScoringError::Status { status, body } => {
                assert_eq!(status, 529);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(messages_body(VALID_REPLY))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let task = fixtures::practice_task(1, ModuleType::General);
        let submission = fixtures::submission(&task, "Dear Sir or Madam,", 160);

        let err = scorer(&server.uri(), Duration::from_millis(300))
            .score(&submission, &task)
            .await
            .expect_err("timeout");

        assert!(matches!(err, ScoringError::Timeout(_)), "{err:?}");
    }

    #[tokio::test]
    async fn prose_without_json_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(messages_body("I am unable to assess this response.")),
            )
            .mount(&server)
            .await;

        let task = fixtures::practice_task(1, ModuleType::Academic);
        let submission = fixtures::submission(&task, "The chart illustrates...", 170);

        let err = scorer(&server.uri(), Duration::from_secs(5))
            .score(&submission, &task)
            .await
            .expect_err("malformed");

        assert!(matches!(err, ScoringError::MalformedResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let task = fixtures::practice_task(1, ModuleType::Academic);
        let submission = fixtures::submission(&task, "   ", 0);

        let err = scorer(&server.uri(), Duration::from_secs(5))
            .score(&submission, &task)
            .await
            .expect_err("invalid input");

        assert!(matches!(err, ScoringError::InvalidInput(_)));
    }

    #[test]
    fn response_text_joins_text_blocks() {
        let body = json!({"content": [
            {"type": "text", "text": "{\"a\":"},
            {"type": "tool_use", "id": "x"},
            {"type": "text", "text": " 1}"}
        ]});
        assert_eq!(response_text(&body.to_string()).expect("text"), "{\"a\": 1}");
        assert!(matches!(
            response_text("{\"content\": []}"),
            Err(ScoringError::MalformedResponse(_))
        ));
    }
}
