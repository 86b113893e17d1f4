//! Scaler metadata parsing.
//!
//! KEDA passes the trigger's `metadata` map from the `ScaledObject` on
//! every call. Keys are matched case-insensitively. Parsing keeps going
//! after the first bad value so that every problem is reported at once.
//!
//! | Key                           | Default               |
//! |-------------------------------|-----------------------|
//! | `taskHubName`                 | required              |
//! | `maxActivitiesPerWorker`      | 10                    |
//! | `maxOrchestrationsPerWorker`  | 5                     |
//! | `useTablePartitionManagement` | false                 |
//! | `connection`                  | none                  |
//! | `connectionFromEnv`           | `AzureWebJobsStorage` |

use std::collections::HashMap;
use std::fmt;

use hubscale_engine::{OptionsViolation, ScalingOptions};
use thiserror::Error;

/// Environment variable consulted when no connection is configured.
pub const DEFAULT_CONNECTION_ENV: &str = "AzureWebJobsStorage";

/// Where the storage connection string comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionSource {
    /// The connection string itself, from the `connection` key.
    Literal(String),
    /// Name of an environment variable in the scaler's own process.
    FromEnv(String),
}

impl fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(_) => f.write_str("Literal(<redacted>)"),
            Self::FromEnv(name) => f.debug_tuple("FromEnv").field(name).finish(),
        }
    }
}

/// Parsed and validated trigger metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalerMetadata {
    pub options: ScalingOptions,
    pub connection: ConnectionSource,
}

/// Every problem found in a metadata map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_violations(.0))]
pub struct MetadataError(pub Vec<OptionsViolation>);

fn join_violations(violations: &[OptionsViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ScalerMetadata {
    pub fn parse(metadata: &HashMap<String, String>) -> Result<Self, MetadataError> {
        let values: HashMap<String, &str> = metadata
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
            .collect();
        let get = |key: &str| values.get(key).copied().filter(|v| !v.is_empty());

        let mut violations = Vec::new();

        let task_hub_name = match get("taskhubname") {
            Some(name) => name.to_string(),
            None => {
                violations.push(OptionsViolation::new("taskHubName", "is required"));
                String::new()
            }
        };

        let mut options = ScalingOptions::new(task_hub_name);
        if let Some(value) = parse_capacity(
            get("maxactivitiesperworker"),
            "maxActivitiesPerWorker",
            &mut violations,
        ) {
            options.max_activities_per_worker = value;
        }
        if let Some(value) = parse_capacity(
            get("maxorchestrationsperworker"),
            "maxOrchestrationsPerWorker",
            &mut violations,
        ) {
            options.max_orchestrations_per_worker = value;
        }
        if let Some(raw) = get("usetablepartitionmanagement") {
            match parse_bool(raw) {
                Some(enabled) => options.use_table_partition_management = enabled,
                None => violations.push(OptionsViolation::new(
                    "useTablePartitionManagement",
                    format!("{raw:?} is not true or false"),
                )),
            }
        }

        if get("usemanagedidentity").and_then(parse_bool) == Some(true)
            || get("accountname").is_some()
            || get("clientid").is_some()
        {
            violations.push(OptionsViolation::new(
                "useManagedIdentity",
                "managed identity is not supported; configure a SAS connection string",
            ));
        }

        let connection = match (get("connection"), get("connectionfromenv")) {
            (Some(_), Some(_)) => {
                violations.push(OptionsViolation::new(
                    "connection",
                    "set only one of connection and connectionFromEnv",
                ));
                ConnectionSource::FromEnv(DEFAULT_CONNECTION_ENV.to_string())
            }
            (Some(literal), None) => ConnectionSource::Literal(literal.to_string()),
            (None, Some(env)) => ConnectionSource::FromEnv(env.to_string()),
            (None, None) => ConnectionSource::FromEnv(DEFAULT_CONNECTION_ENV.to_string()),
        };

        // Fields already reported during parsing are not checked twice.
        for violation in options.validate() {
            if !violations.iter().any(|v| v.field == violation.field) {
                violations.push(violation);
            }
        }

        if violations.is_empty() {
            Ok(Self { options, connection })
        } else {
            Err(MetadataError(violations))
        }
    }
}

fn parse_capacity(
    raw: Option<&str>,
    field: &'static str,
    violations: &mut Vec<OptionsViolation>,
) -> Option<u32> {
    let raw = raw?;
    match raw.parse::<i64>() {
        Ok(value) if (1..=i64::from(i32::MAX)).contains(&value) => u32::try_from(value).ok(),
        Ok(value) => {
            violations.push(OptionsViolation::new(
                field,
                format!("{value} is outside 1..={}", i32::MAX),
            ));
            None
        }
        Err(_) => {
            violations.push(OptionsViolation::new(field, format!("{raw:?} is not an integer")));
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
