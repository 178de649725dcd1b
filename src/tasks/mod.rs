pub(crate) mod maintenance;
pub(crate) mod processor;
pub(crate) mod scheduler;
