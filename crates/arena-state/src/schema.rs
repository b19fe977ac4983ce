//! SurrealDB row types
//!
//! Enum and date columns are stored as strings; timestamps use SurrealDB's
//! native datetime. Conversion to the `storage_traits` records happens at the
//! boundary in `surreal_store`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    AgentId, AgentOutcome, AgentProfile, ContentDigest, FailureRecord, OutcomeStatus,
    StorageResult,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn format_day(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_day(s: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| StorageError::Serialization(format!("bad date {s:?}: {e}")))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> StorageResult<T> {
    s.parse::<T>().map_err(StorageError::Serialization)
}

// ---------------------------------------------------------------------------
// agents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRow {
    /// SurrealDB record ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub agent_id: String,
    pub name: String,
    /// "trading" | "utility" | "coding"
    pub arena_type: String,
    /// "alpha" | "beta" | "omega"
    pub tier: String,
    pub score: f64,
    pub price: f64,
    pub interface_ref: Option<String>,
    pub keywords: Vec<String>,
    pub active: bool,
    /// YYYY-MM-DD
    pub last_run_date: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<&AgentProfile> for AgentRow {
    fn from(p: &AgentProfile) -> Self {
        AgentRow {
            id: None,
            agent_id: p.agent_id.0.clone(),
            name: p.name.clone(),
            arena_type: p.arena_type.as_str().to_string(),
            tier: p.tier.as_str().to_string(),
            score: p.score,
            price: p.price,
            interface_ref: p.interface_ref.as_ref().map(|d| d.as_str().to_string()),
            keywords: p.keywords.clone(),
            active: p.active,
            last_run_date: p.last_run_date.map(format_day),
            created_at: p.created_at,
        }
    }
}

impl AgentRow {
    pub fn into_profile(self) -> StorageResult<AgentProfile> {
        Ok(AgentProfile {
            agent_id: AgentId(self.agent_id),
            name: self.name,
            arena_type: parse_enum(&self.arena_type)?,
            tier: parse_enum(&self.tier)?,
            score: self.score,
            price: self.price,
            interface_ref: self.interface_ref.map(ContentDigest::try_from).transpose()?,
            keywords: self.keywords,
            active: self.active,
            last_run_date: self.last_run_date.as_deref().map(parse_day).transpose()?,
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// daily_outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub agent_id: String,
    /// YYYY-MM-DD
    pub run_date: String,
    /// "SCORED" | "FAILED"
    pub status: String,
    pub tier: String,
    pub previous_score: f64,
    pub new_score: f64,
    pub new_price: f64,
    pub performance_index: Option<f64>,
    pub was_capped: bool,
    pub ceiling_hit: bool,
    pub failure_reason: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub run_timestamp: DateTime<Utc>,
}

impl From<&AgentOutcome> for OutcomeRow {
    fn from(o: &AgentOutcome) -> Self {
        OutcomeRow {
            id: None,
            agent_id: o.agent_id.0.clone(),
            run_date: format_day(o.run_date),
            status: o.status.as_str().to_string(),
            tier: o.tier.as_str().to_string(),
            previous_score: o.previous_score,
            new_score: o.new_score,
            new_price: o.new_price,
            performance_index: o.performance_index,
            was_capped: o.was_capped,
            ceiling_hit: o.ceiling_hit,
            failure_reason: o.failure_reason.clone(),
            run_timestamp: o.run_timestamp,
        }
    }
}

impl OutcomeRow {
    pub fn into_outcome(self) -> StorageResult<AgentOutcome> {
        let status = match self.status.as_str() {
            "SCORED" => OutcomeStatus::Scored,
            "FAILED" => OutcomeStatus::Failed,
            other => {
                return Err(StorageError::Serialization(format!(
                    "unknown outcome status: {other}"
                )))
            }
        };
        Ok(AgentOutcome {
            agent_id: AgentId(self.agent_id),
            run_date: parse_day(&self.run_date)?,
            status,
            tier: parse_enum(&self.tier)?,
            previous_score: self.previous_score,
            new_score: self.new_score,
            new_price: self.new_price,
            performance_index: self.performance_index,
            was_capped: self.was_capped,
            ceiling_hit: self.ceiling_hit,
            failure_reason: self.failure_reason,
            run_timestamp: self.run_timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// failed_runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub agent_id: String,
    pub run_date: String,
    pub reason: String,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl FailureRow {
    pub fn new(agent_id: &AgentId, day: NaiveDate, reason: &str) -> Self {
        FailureRow {
            id: None,
            agent_id: agent_id.0.clone(),
            run_date: format_day(day),
            reason: reason.to_string(),
            recorded_at: Utc::now(),
        }
    }

    pub fn into_record(self) -> StorageResult<FailureRecord> {
        Ok(FailureRecord {
            agent_id: AgentId(self.agent_id),
            run_date: parse_day(&self.run_date)?,
            reason: self.reason,
            recorded_at: self.recorded_at,
        })
    }
}

// ---------------------------------------------------------------------------
// interfaces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub digest: String,
    pub code: String,
}
