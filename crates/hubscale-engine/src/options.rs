//! Scaling options and their validation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Configuration for scaling one task hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingOptions {
    pub task_hub_name: String,
    /// Activity work items a single worker is expected to process (`M`).
    pub max_activities_per_worker: u32,
    /// Orchestration backlog a single worker can own (`N`).
    pub max_orchestrations_per_worker: u32,
    /// Discover partitions from the partitions table instead of the
    /// `taskhub.json` blob.
    pub use_table_partition_management: bool,
}

/// A single rule an option value breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsViolation {
    pub field: &'static str,
    pub message: String,
}

impl OptionsViolation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for OptionsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ScalingOptions {
    pub fn new(task_hub_name: impl Into<String>) -> Self {
        Self {
            task_hub_name: task_hub_name.into(),
            max_activities_per_worker: 10,
            max_orchestrations_per_worker: 5,
            use_table_partition_management: false,
        }
    }

    pub fn with_max_activities_per_worker(mut self, value: u32) -> Self {
        self.max_activities_per_worker = value;
        self
    }

    pub fn with_max_orchestrations_per_worker(mut self, value: u32) -> Self {
        self.max_orchestrations_per_worker = value;
        self
    }

    pub fn with_table_partition_management(mut self, enabled: bool) -> Self {
        self.use_table_partition_management = enabled;
        self
    }

    /// Check every rule and return all violations, empty when valid.
    pub fn validate(&self) -> Vec<OptionsViolation> {
        let mut violations = Vec::new();

        if self.task_hub_name.trim().is_empty() {
            violations.push(OptionsViolation::new("taskHubName", "must not be empty"));
        }
        if self.max_activities_per_worker < 1 {
            violations.push(OptionsViolation::new(
                "maxActivitiesPerWorker",
                "must be at least 1",
            ));
        }
        if self.max_orchestrations_per_worker < 1 {
            violations.push(OptionsViolation::new(
                "maxOrchestrationsPerWorker",
                "must be at least 1",
            ));
        }

        violations
    }
}
