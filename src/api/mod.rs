pub(crate) mod admin;
pub(crate) mod assessments;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod router;
