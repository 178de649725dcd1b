pub(crate) mod assessment;
pub(crate) mod band;
pub(crate) mod credits;
pub(crate) mod insights;
pub(crate) mod queue;
pub(crate) mod scoring;
