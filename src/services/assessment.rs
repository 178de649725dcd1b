//! The assessment record store: one assessment per submission, completed at most once.

use std::time::Instant;

use sqlx::PgPool;
use thiserror::Error;
use time::{Duration, PrimitiveDateTime};

use crate::core::{metrics as app_metrics, time::primitive_now_utc};
use crate::db::models::Assessment;
use crate::db::types::AssessmentStatus;
use crate::repositories::{assessments, feedback, practice_tasks, submissions};
use crate::services::band;
use crate::services::scoring::{CriterionScorer, ScoreResult, ScoringError};

#[derive(Debug, Error)]
pub(crate) enum AssessmentError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("assessment is already in progress")]
    InProgress,
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error("failed to store assessment result: {0}")]
    Transaction(#[source] sqlx::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Grace on top of the AI timeout before a `processing` attempt counts as abandoned.
pub(crate) const STALE_GRACE_SECONDS: u64 = 120;

/// Attempts started before the returned instant are treated as abandoned.
pub(crate) fn stale_before(now: PrimitiveDateTime, ai_timeout_seconds: u64) -> PrimitiveDateTime {
    let window = ai_timeout_seconds.saturating_add(STALE_GRACE_SECONDS).min(i64::MAX as u64);
    now.saturating_sub(Duration::seconds(window as i64))
}

/// A `processing` row started after `stale_before` still belongs to a live attempt.
pub(crate) fn is_in_flight(assessment: &Assessment, stale_before: PrimitiveDateTime) -> bool {
    assessment.status == AssessmentStatus::Processing
        && assessment.started_at.is_some_and(|started| started >= stale_before)
}

#[derive(Debug)]
pub(crate) enum AssessOutcome {
    /// The submission was already assessed; nothing was recomputed.
    AlreadyCompleted(Assessment),
    Completed(Assessment),
}

impl AssessOutcome {
    pub(crate) fn assessment(&self) -> &Assessment {
        match self {
            Self::AlreadyCompleted(assessment) | Self::Completed(assessment) => assessment,
        }
    }

    pub(crate) fn into_assessment(self) -> Assessment {
        match self {
            Self::AlreadyCompleted(assessment) | Self::Completed(assessment) => assessment,
        }
    }
}

/// Loads or creates the assessment for a submission under a row lock.
///
/// A completed assessment comes back untouched and an in-flight one is refused with
/// `InProgress`. Anything else is moved to `processing` with a fresh `started_at`.
/// The flag is true when the row was created.
pub(crate) async fn get_or_create(
    pool: &PgPool,
    submission_id: &str,
    model: &str,
    stale_before: PrimitiveDateTime,
) -> Result<(Assessment, bool), AssessmentError> {
    let now = primitive_now_utc();
    let mut tx = pool.begin().await?;

    let mut existing = assessments::lock_by_submission(&mut tx, submission_id).await?;
    if existing.is_none() {
        let id = uuid::Uuid::new_v4().to_string();
        if let Some(created) =
            assessments::insert_processing(&mut tx, &id, submission_id, model, now).await?
        {
            tx.commit().await?;
            return Ok((created, true));
        }
        // Lost an insert race; the winner's row is visible now.
        existing = assessments::lock_by_submission(&mut tx, submission_id).await?;
    }

    let existing =
        existing.ok_or_else(|| AssessmentError::NotFound(format!("assessment for {submission_id}")))?;

    if existing.status == AssessmentStatus::Completed {
        tx.commit().await?;
        return Ok((existing, false));
    }
    if is_in_flight(&existing, stale_before) {
        return Err(AssessmentError::InProgress);
    }

    let started = assessments::mark_processing(&mut tx, &existing.id, model, now)
        .await?
        .unwrap_or(existing);
    tx.commit().await?;

    Ok((started, false))
}

/// Writes scores, feedback and the submission status in one transaction.
///
/// The overall band is recomputed from the four criteria. If another process completed
/// the assessment first, the stored row is returned and nothing is written.
pub(crate) async fn complete(
    pool: &PgPool,
    assessment: &Assessment,
    result: &ScoreResult,
) -> Result<Assessment, AssessmentError> {
    let overall = band::overall_band_score(result.scores.as_array());
    if overall != result.reported_overall {
        tracing::info!(
            assessment_id = %assessment.id,
            reported = result.reported_overall,
            recomputed = overall,
            "Overriding model overall band with recomputed value"
        );
    }

    let now = primitive_now_utc();
    let mut tx = pool.begin().await.map_err(AssessmentError::Transaction)?;

    let update = assessments::CompletionUpdate {
        overall_band_score: overall,
        task_achievement_score: result.scores.task_achievement,
        coherence_cohesion_score: result.scores.coherence_cohesion,
        lexical_resource_score: result.scores.lexical_resource,
        grammar_accuracy_score: result.scores.grammar_accuracy,
        ai_confidence_score: result.confidence,
        processing_time_seconds: result.duration_seconds.max(0.0),
        ai_model_used: &result.model,
        completed_at: now,
    };

    let Some(completed) = assessments::complete(&mut tx, &assessment.id, update)
        .await
        .map_err(AssessmentError::Transaction)?
    else {
        drop(tx);
        tracing::info!(
            assessment_id = %assessment.id,
            "Assessment already completed by another worker"
        );
        return assessments::find_by_id(pool, &assessment.id)
            .await?
            .ok_or_else(|| AssessmentError::NotFound(format!("assessment {}", assessment.id)));
    };

    for item in &result.feedback {
        feedback::insert(
            &mut tx,
            feedback::NewFeedback {
                id: uuid::Uuid::new_v4().to_string(),
                assessment_id: &completed.id,
                category: item.category,
                severity: item.severity,
                title: &item.title,
                content: &item.content,
                suggestion: &item.suggestion,
                highlighted_text: &item.highlighted_text,
                text_start_position: item.span.map(|span| span.start),
                text_end_position: item.span.map(|span| span.end),
                ai_confidence: item.confidence,
                created_at: now,
            },
        )
        .await
        .map_err(AssessmentError::Transaction)?;
    }

    submissions::mark_assessed(&mut tx, &completed.submission_id, now)
        .await
        .map_err(AssessmentError::Transaction)?;

    tx.commit().await.map_err(AssessmentError::Transaction)?;

    Ok(completed)
}

/// Marks an attempt failed and bumps `retry_count`. Completed rows are never touched.
pub(crate) async fn fail(
    pool: &PgPool,
    assessment: &Assessment,
    message: &str,
) -> Result<Option<Assessment>, AssessmentError> {
    let failed = assessments::fail(pool, &assessment.id, message, primitive_now_utc()).await?;
    Ok(failed)
}

/// Runs one scoring attempt for a submission end to end.
pub(crate) async fn assess_submission(
    pool: &PgPool,
    scorer: &dyn CriterionScorer,
    submission_id: &str,
) -> Result<AssessOutcome, AssessmentError> {
    let timer = Instant::now();
    let result = run_attempt(pool, scorer, submission_id).await;

    let status = match &result {
        Ok(AssessOutcome::AlreadyCompleted(_)) => "skipped",
        Ok(AssessOutcome::Completed(_)) => "completed",
        Err(_) => "failed",
    };
    metrics::counter!(app_metrics::JOBS_TOTAL, "status" => status).increment(1);
    if status != "skipped" {
        metrics::histogram!(app_metrics::DURATION_SECONDS).record(timer.elapsed().as_secs_f64());
    }

    result
}

async fn run_attempt(
    pool: &PgPool,
    scorer: &dyn CriterionScorer,
    submission_id: &str,
) -> Result<AssessOutcome, AssessmentError> {
    let submission = submissions::find_by_id(pool, submission_id)
        .await?
        .ok_or_else(|| AssessmentError::NotFound(format!("submission {submission_id}")))?;
    let task = practice_tasks::find_by_id(pool, &submission.task_id)
        .await?
        .ok_or_else(|| AssessmentError::NotFound(format!("practice task {}", submission.task_id)))?;

    let cutoff = stale_before(primitive_now_utc(), scorer.timeout_seconds());
    let (assessment, created) =
        get_or_create(pool, &submission.id, scorer.model_name(), cutoff).await?;
    if assessment.status == AssessmentStatus::Completed {
        tracing::info!(
            submission_id = %submission.id,
            assessment_id = %assessment.id,
            "Submission already assessed; skipping"
        );
        return Ok(AssessOutcome::AlreadyCompleted(assessment));
    }

    tracing::info!(
        submission_id = %submission.id,
        assessment_id = %assessment.id,
        created,
        retry_count = assessment.retry_count,
        "Starting assessment"
    );

    let result = match scorer.score(&submission, &task).await {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(
                submission_id = %submission.id,
                assessment_id = %assessment.id,
                kind = err.kind(),
                error = %err,
                "Assessment scoring failed"
            );
            if let Err(store_err) = fail(pool, &assessment, &err.to_string()).await {
                tracing::error!(
                    assessment_id = %assessment.id,
                    error = %store_err,
                    "Failed to record assessment failure"
                );
            }
            return Err(AssessmentError::Scoring(err));
        }
    };

    let completed = match complete(pool, &assessment, &result).await {
        Ok(completed) => completed,
        Err(err) => {
            tracing::error!(
                submission_id = %submission.id,
                assessment_id = %assessment.id,
                error = %err,
                "Failed to store assessment result"
            );
            // Stays `processing`; stale recovery fails it later.
            if let Err(store_err) =
                assessments::note_error(pool, &assessment.id, &err.to_string(), primitive_now_utc())
                    .await
            {
                tracing::error!(
                    assessment_id = %assessment.id,
                    error = %store_err,
                    "Failed to record assessment storage error"
                );
            }
            return Err(err);
        }
    };

    tracing::info!(
        submission_id = %submission.id,
        assessment_id = %completed.id,
        overall = ?completed.overall_band_score,
        "Assessment completed"
    );

    Ok(AssessOutcome::Completed(completed))
}
