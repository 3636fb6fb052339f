use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PROJECT: &str = "nyc_airbnb";
pub const DEFAULT_JOB_TYPE: &str = "basic_cleaning";

/// Identity of one tracked execution. Stores receive it at construction and
/// tag every lineage record with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunContext {
    pub run_id: Uuid,
    pub project: String,
    pub job_type: String,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(project: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            project: project.into(),
            job_type: job_type.into(),
            started_at: Utc::now(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT, DEFAULT_JOB_TYPE)
    }
}
