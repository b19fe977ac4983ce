//! SurrealDB schema migrations and initialization
//!
//! Sets up the arena tables and the indexes that back the storage
//! guarantees (one outcome per agent per day, unique digests).

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all arena tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing arena SurrealDB schema");

    init_agents_table(db).await?;
    init_outcomes_table(db).await?;
    init_failed_runs_table(db).await?;
    init_interfaces_table(db).await?;

    info!("Arena schema initialization complete");
    Ok(())
}

/// Initialize `agents` table
///
/// Schema:
/// ```text
/// TABLE agents {
///   agent_id:       STRING (unique)
///   name:           STRING
///   arena_type:     STRING (trading | utility | coding, indexed)
///   tier:           STRING (alpha | beta | omega)
///   score:          FLOAT
///   price:          FLOAT
///   interface_ref:  STRING?
///   keywords:       ARRAY<STRING>
///   active:         BOOL (indexed)
///   last_run_date:  STRING? (YYYY-MM-DD)
///   created_at:     DATETIME
/// }
/// ```
async fn init_agents_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing agents table");

    let sql = r#"
        DEFINE TABLE agents SCHEMALESS;
        DEFINE INDEX idx_agent_id ON TABLE agents COLUMNS agent_id UNIQUE;
        DEFINE INDEX idx_agent_arena ON TABLE agents COLUMNS arena_type;
        DEFINE INDEX idx_agent_active ON TABLE agents COLUMNS active;
    "#;

    db.query(sql).await?;
    info!("✓ agents table initialized");
    Ok(())
}

/// Initialize `daily_outcomes` table
///
/// Constraints:
/// - `(agent_id, run_date)` is unique: an agent is scored at most once per day
/// - rows are never updated after creation
async fn init_outcomes_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing daily_outcomes table");

    let sql = r#"
        DEFINE TABLE daily_outcomes SCHEMALESS;
        DEFINE INDEX idx_outcome_agent_day ON TABLE daily_outcomes COLUMNS agent_id, run_date UNIQUE;
        DEFINE INDEX idx_outcome_agent ON TABLE daily_outcomes COLUMNS agent_id;
    "#;

    db.query(sql).await?;
    info!("✓ daily_outcomes table initialized");
    Ok(())
}

/// Initialize `failed_runs` table (append-only failure log)
async fn init_failed_runs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing failed_runs table");

    let sql = r#"
        DEFINE TABLE failed_runs SCHEMALESS;
        DEFINE INDEX idx_failed_agent ON TABLE failed_runs COLUMNS agent_id;
    "#;

    db.query(sql).await?;
    info!("✓ failed_runs table initialized");
    Ok(())
}

/// Initialize `interfaces` table (content-addressed interface code)
async fn init_interfaces_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing interfaces table");

    let sql = r#"
        DEFINE TABLE interfaces SCHEMALESS;
        DEFINE INDEX idx_interface_digest ON TABLE interfaces COLUMNS digest UNIQUE;
    "#;

    db.query(sql).await?;
    info!("✓ interfaces table initialized");
    Ok(())
}
