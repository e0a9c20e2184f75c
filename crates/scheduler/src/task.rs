use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchedulerError;

/// Namespace for migrating legacy numeric task IDs into UUIDv5. Fixed so the
/// mapping is reproducible across daemon restarts and across machines.
const LEGACY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x1d2b_9e7a_9f0a_4a8e_8c3a_7e6b5a4d3c2b);

/// A pre-migration integer task ID, as the original scheduler addressed
/// tasks before it moved to UUIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegacyTaskId(pub u32);

impl LegacyTaskId {
    /// Deterministic mapping into the UUID space so the same legacy ID
    /// always migrates to the same task UUID.
    pub fn to_uuid(self) -> Uuid {
        Uuid::new_v5(&LEGACY_ID_NAMESPACE, self.0.to_string().as_bytes())
    }
}

fn resolve_alias(expr: &str) -> &str {
    match expr {
        "@reboot" => "@reboot",
        "@yearly" | "@annually" => "0 0 0 1 1 * *",
        "@monthly" => "0 0 0 1 * * *",
        "@weekly" => "0 0 0 * * Sun *",
        "@daily" | "@midnight" => "0 0 0 * * * *",
        "@hourly" => "0 0 * * * * *",
        "@minutely" => "0 * * * * * *",
        other => other,
    }
}

/// When a task fires. `Periodic`'s interval is whole seconds; the scheduler
/// enforces a 1s floor when a task is created (`Scheduler::schedule`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum TimeSpec {
    Exact { at: DateTime<Utc> },
    Periodic { period_secs: u64 },
    Cron { expression: String },
}

impl TimeSpec {
    /// Next fire time strictly after `after`, or `None` if the spec can
    /// never fire again (an exact time already in the past, or an exhausted
    /// cron schedule).
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        match self {
            TimeSpec::Exact { at } => Ok((*at > after).then_some(*at)),
            TimeSpec::Periodic { period_secs } => {
                Ok(Some(after + chrono::Duration::seconds(*period_secs as i64)))
            }
            TimeSpec::Cron { expression } => {
                let resolved = resolve_alias(expression);
                if resolved == "@reboot" {
                    // Fires once, immediately, the first time it is evaluated
                    // after scheduler start; the caller is expected to treat
                    // a `None` second call as "already fired this boot".
                    return Ok(Some(after));
                }
                let schedule = Schedule::from_str(resolved).map_err(|source| {
                    SchedulerError::InvalidCron {
                        expr: expression.clone(),
                        source,
                    }
                })?;
                Ok(schedule.after(&after).next())
            }
        }
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self, TimeSpec::Exact { .. }) || matches!(self, TimeSpec::Cron { expression } if expression == "@reboot")
    }
}

/// One scheduled task. `persist = false` tasks do not survive
/// `Scheduler::reload` (see `crate::Scheduler`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub client_id: String,
    pub task_id: Uuid,
    pub description: String,
    pub time_spec: TimeSpec,
    pub payload: serde_json::Value,
    pub persist: bool,
    pub enabled: bool,
    #[serde(skip)]
    pub next_fire: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(
        client_id: impl Into<String>,
        description: impl Into<String>,
        time_spec: TimeSpec,
        payload: serde_json::Value,
        persist: bool,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            task_id: Uuid::new_v4(),
            description: description.into(),
            time_spec,
            payload,
            persist,
            enabled: true,
            next_fire: None,
        }
    }

    pub fn from_legacy_id(legacy: LegacyTaskId, mut self) -> Self {
        self.task_id = legacy.to_uuid();
        self
    }
}
