pub const DEFINITIONS_REFRESH_COUNTER: &str = "local_evaluation_refresh_total";
pub const INCONCLUSIVE_EVALUATION_COUNTER: &str = "local_evaluation_inconclusive_total";
pub const LOADED_FLAGS_GAUGE: &str = "local_evaluation_loaded_flags";
pub const SKIPPED_DEFINITIONS_COUNTER: &str = "local_evaluation_skipped_definitions_total";
