use sqlx::PgPool;

use crate::db::models::PracticeTask;

const COLUMNS: &str = "\
    id, task_code, title, module_type, task_number, instruction, prompt, \
    word_limit_min, word_limit_max, time_limit_minutes, is_active, created_at, updated_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<PracticeTask>, sqlx::Error> {
    sqlx::query_as::<_, PracticeTask>(&format!("SELECT {COLUMNS} FROM practice_tasks WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}
