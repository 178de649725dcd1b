use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::credits::CreditGate;
use crate::services::scoring::CriterionScorer;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    scorer: Arc<dyn CriterionScorer>,
    credits: Arc<dyn CreditGate>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        scorer: Arc<dyn CriterionScorer>,
        credits: Arc<dyn CreditGate>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, scorer, credits }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn scorer(&self) -> &dyn CriterionScorer {
        self.inner.scorer.as_ref()
    }

    pub(crate) fn credits(&self) -> &dyn CreditGate {
        self.inner.credits.as_ref()
    }
}
