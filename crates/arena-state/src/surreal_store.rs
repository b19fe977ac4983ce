//! SurrealDB-backed AgentStore and InterfaceStore
//!
//! Uses the row types in `schema`, converting to/from `storage_traits`
//! records at the boundary.

use async_trait::async_trait;
use chrono::NaiveDate;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::handle;
use crate::schema::{self, AgentRow, FailureRow, InterfaceRow, OutcomeRow};
use crate::storage_traits::{
    AgentId, AgentOutcome, AgentProfile, AgentStore, ContentDigest, FailureRecord,
    InterfaceRef, InterfaceStore, StorageResult, TierScore,
};

/// Client-side (transport) failures are retryable; database-side failures
/// are not.
fn map_db_err(e: surrealdb::Error) -> StorageError {
    match e {
        surrealdb::Error::Api(inner) => StorageError::Unavailable(inner.to_string()),
        other => StorageError::Backend(other.to_string()),
    }
}

/// SurrealDB-backed implementation of [`AgentStore`] and [`InterfaceStore`].
#[derive(Clone)]
pub struct SurrealArenaStore {
    db: Surreal<Any>,
}

impl SurrealArenaStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `arena/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect_url("mem://").await?;
        info!("SurrealArenaStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect to an explicit URL (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let db = handle::connect_url(url).await?;
        info!("SurrealArenaStore connected ({})", url);
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// See [`crate::handle::CloudConfig::from_env`] for the variables read.
    pub async fn from_env() -> crate::Result<Self> {
        let db = handle::connect_from_env().await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_agent_row(&self, aid: &str) -> StorageResult<Option<AgentRow>> {
        let aid_owned = aid.to_string();
        let rows: Vec<AgentRow> = self
            .db
            .query("SELECT * FROM agents WHERE agent_id = $aid")
            .bind(("aid", aid_owned))
            .await
            .map_err(map_db_err)?
            .take(0)
            .map_err(map_db_err)?;
        Ok(rows.into_iter().next())
    }

    /// `AgentNotFound` if the agent is gone, `ScoreConflict` if it no
    /// longer holds `expected`.
    async fn check_basis(&self, agent_id: &AgentId, expected: TierScore) -> StorageResult<()> {
        let profile = self
            .fetch_agent_row(&agent_id.0)
            .await?
            .ok_or_else(|| StorageError::AgentNotFound {
                agent_id: agent_id.0.clone(),
            })?
            .into_profile()?;
        if expected.matches(&profile) {
            Ok(())
        } else {
            Err(StorageError::ScoreConflict {
                agent_id: agent_id.0.clone(),
            })
        }
    }
}

#[async_trait]
impl AgentStore for SurrealArenaStore {
    async fn register(&self, profile: AgentProfile) -> StorageResult<()> {
        let row = AgentRow::from(&profile);
        debug!(agent_id = %profile.agent_id, "registering agent");

        self.db
            .query(
                "BEGIN TRANSACTION; \
                 DELETE agents WHERE agent_id = $aid; \
                 CREATE agents CONTENT $row; \
                 COMMIT TRANSACTION;",
            )
            .bind(("aid", profile.agent_id.0.clone()))
            .bind(("row", row))
            .await
            .map_err(map_db_err)?
            .check()
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<AgentProfile> {
        self.fetch_agent_row(&agent_id.0)
            .await?
            .ok_or_else(|| StorageError::AgentNotFound {
                agent_id: agent_id.0.clone(),
            })?
            .into_profile()
    }

    async fn list_agents(&self) -> StorageResult<Vec<AgentProfile>> {
        let rows: Vec<AgentRow> = self
            .db
            .query("SELECT * FROM agents ORDER BY created_at ASC")
            .await
            .map_err(map_db_err)?
            .take(0)
            .map_err(map_db_err)?;
        rows.into_iter().map(AgentRow::into_profile).collect()
    }

    async fn list_due(&self, day: NaiveDate) -> StorageResult<Vec<AgentProfile>> {
        let day_str = schema::format_day(day);
        let rows: Vec<AgentRow> = self
            .db
            .query("SELECT * FROM agents WHERE active = true ORDER BY created_at ASC")
            .await
            .map_err(map_db_err)?
            .take(0)
            .map_err(map_db_err)?;
        rows.into_iter()
            .filter(|r| r.last_run_date.as_deref() != Some(day_str.as_str()))
            .map(AgentRow::into_profile)
            .collect()
    }

    async fn outcome_for(
        &self,
        agent_id: &AgentId,
        day: NaiveDate,
    ) -> StorageResult<Option<AgentOutcome>> {
        let rows: Vec<OutcomeRow> = self
            .db
            .query("SELECT * FROM daily_outcomes WHERE agent_id = $aid AND run_date = $day")
            .bind(("aid", agent_id.0.clone()))
            .bind(("day", schema::format_day(day)))
            .await
            .map_err(map_db_err)?
            .take(0)
            .map_err(map_db_err)?;
        rows.into_iter().next().map(OutcomeRow::into_outcome).transpose()
    }

    async fn record_outcome(&self, outcome: &AgentOutcome) -> StorageResult<()> {
        let already = StorageError::AlreadyRecorded {
            agent_id: outcome.agent_id.0.clone(),
            run_date: outcome.run_date.to_string(),
        };
        if self
            .outcome_for(&outcome.agent_id, outcome.run_date)
            .await?
            .is_some()
        {
            return Err(already);
        }
        let basis = outcome.basis();
        self.check_basis(&outcome.agent_id, basis).await?;

        debug!(agent_id = %outcome.agent_id, run_date = %outcome.run_date, "recording outcome");

        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 LET $updated = (UPDATE agents \
                     SET score = $score, price = $price, last_run_date = $day \
                     WHERE agent_id = $aid AND tier = $tier AND score = $prev RETURN AFTER); \
                 IF array::len($updated) = 0 { THROW \"score conflict\"; }; \
                 CREATE daily_outcomes CONTENT $row; \
                 COMMIT TRANSACTION;",
            )
            .bind(("row", OutcomeRow::from(outcome)))
            .bind(("tier", basis.tier.as_str().to_string()))
            .bind(("prev", basis.score))
            .bind(("score", outcome.new_score))
            .bind(("price", outcome.new_price))
            .bind(("day", schema::format_day(outcome.run_date)))
            .bind(("aid", outcome.agent_id.0.clone()))
            .await
            .map_err(map_db_err)
            .and_then(|r| r.check().map_err(map_db_err));

        match result {
            Ok(_) => Ok(()),
            // A concurrent writer won the unique (agent_id, run_date) index,
            // or moved the profile off the basis this outcome was scored on.
            Err(e) => match self.outcome_for(&outcome.agent_id, outcome.run_date).await {
                Ok(Some(_)) => Err(already),
                Ok(None) => match self.check_basis(&outcome.agent_id, basis).await {
                    Ok(()) => Err(e),
                    Err(conflict) => Err(conflict),
                },
                Err(_) => Err(e),
            },
        }
    }

    async fn record_failure(
        &self,
        agent_id: &AgentId,
        day: NaiveDate,
        reason: &str,
    ) -> StorageResult<()> {
        let _created: Option<FailureRow> = self
            .db
            .create("failed_runs")
            .content(FailureRow::new(agent_id, day, reason))
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn failures(&self, agent_id: &AgentId) -> StorageResult<Vec<FailureRecord>> {
        let rows: Vec<FailureRow> = self
            .db
            .query("SELECT * FROM failed_runs WHERE agent_id = $aid ORDER BY recorded_at ASC")
            .bind(("aid", agent_id.0.clone()))
            .await
            .map_err(map_db_err)?
            .take(0)
            .map_err(map_db_err)?;
        rows.into_iter().map(FailureRow::into_record).collect()
    }

    async fn history(&self, agent_id: &AgentId) -> StorageResult<Vec<AgentOutcome>> {
        let rows: Vec<OutcomeRow> = self
            .db
            .query("SELECT * FROM daily_outcomes WHERE agent_id = $aid ORDER BY run_date ASC")
            .bind(("aid", agent_id.0.clone()))
            .await
            .map_err(map_db_err)?
            .take(0)
            .map_err(map_db_err)?;
        rows.into_iter().map(OutcomeRow::into_outcome).collect()
    }

    async fn update_tier(
        &self,
        agent_id: &AgentId,
        expected: TierScore,
        next: TierScore,
        price: f64,
    ) -> StorageResult<AgentProfile> {
        let rows: Vec<AgentRow> = self
            .db
            .query(
                "UPDATE agents SET tier = $tier, score = $score, price = $price \
                 WHERE agent_id = $aid AND tier = $was_tier AND score = $was_score \
                 RETURN AFTER",
            )
            .bind(("tier", next.tier.as_str().to_string()))
            .bind(("score", next.score))
            .bind(("price", price))
            .bind(("aid", agent_id.0.clone()))
            .bind(("was_tier", expected.tier.as_str().to_string()))
            .bind(("was_score", expected.score))
            .await
            .map_err(map_db_err)?
            .take(0)
            .map_err(map_db_err)?;
        match rows.into_iter().next() {
            Some(row) => row.into_profile(),
            // Nothing matched: tell a missing agent apart from a moved one.
            None => {
                self.check_basis(agent_id, expected).await?;
                Err(StorageError::ScoreConflict {
                    agent_id: agent_id.0.clone(),
                })
            }
        }
    }
}

#[async_trait]
impl InterfaceStore for SurrealArenaStore {
    async fn put(&self, code: &str) -> StorageResult<InterfaceRef> {
        let digest = ContentDigest::from_bytes(code.as_bytes());
        if self.contains(&digest).await? {
            return Ok(digest);
        }

        let row = InterfaceRow {
            id: None,
            digest: digest.as_str().to_string(),
            code: code.to_string(),
        };
        let created: Result<Option<InterfaceRow>, _> =
            self.db.create("interfaces").content(row).await;
        match created {
            Ok(_) => Ok(digest),
            // Same content stored concurrently: the unique digest index fired.
            Err(e) => {
                if self.contains(&digest).await? {
                    Ok(digest)
                } else {
                    Err(map_db_err(e))
                }
            }
        }
    }

    async fn get(&self, interface_ref: &InterfaceRef) -> StorageResult<String> {
        let rows: Vec<InterfaceRow> = self
            .db
            .query("SELECT * FROM interfaces WHERE digest = $d")
            .bind(("d", interface_ref.as_str().to_string()))
            .await
            .map_err(map_db_err)?
            .take(0)
            .map_err(map_db_err)?;
        rows.into_iter()
            .next()
            .map(|r| r.code)
            .ok_or_else(|| StorageError::InterfaceNotFound {
                digest: interface_ref.as_str().to_string(),
            })
    }

    async fn contains(&self, interface_ref: &InterfaceRef) -> StorageResult<bool> {
        let rows: Vec<InterfaceRow> = self
            .db
            .query("SELECT * FROM interfaces WHERE digest = $d")
            .bind(("d", interface_ref.as_str().to_string()))
            .await
            .map_err(map_db_err)?
            .take(0)
            .map_err(map_db_err)?;
        Ok(!rows.is_empty())
    }
}
