pub mod cohort_matching;
pub mod cohort_models;
