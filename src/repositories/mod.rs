pub(crate) mod assessment_requests;
pub(crate) mod assessments;
pub(crate) mod feedback;
pub(crate) mod health;
pub(crate) mod practice_tasks;
pub(crate) mod submissions;
pub(crate) mod subscriptions;
pub(crate) mod users;
