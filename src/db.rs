use anyhow::Context;
use log::debug;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::collections::BTreeMap;
use std::path::Path;

/// Opening parameters stored for one (token, validity) pair.
///
/// All fields are independently optional: an absent field stays absent in
/// the stored JSON, so a later merge never clobbers it. `min_msat` travels
/// as a decimal string because downstream JSON consumers truncate 64-bit
/// integers.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpeningParams {
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_msat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proportional: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_client_to_self_delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
}

/// The validity-0 row: the token's policy script plus token-level extra data.
#[derive(Debug, Clone, Default, Deserialize)]
struct ScriptRow {
    #[serde(default)]
    script: String,
    #[serde(default)]
    extra_data: Option<serde_json::Value>,
}

/// One token's full stored state, assembled from a bulk scan.
#[derive(Debug, Clone, Default)]
pub struct Params {
    /// Policy script source; empty means no policy is configured.
    pub script: String,
    /// Token-level extra data from the script row.
    pub extra_data: Option<serde_json::Value>,
    /// Opening parameters keyed by validity (> 0).
    pub opening_params: BTreeMap<i64, OpeningParams>,
}

/// The subset of fields a policy script may replace. Only well-typed fields
/// extracted from the script result are ever set here.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandidateUpdate {
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_msat: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proportional: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
}

impl CandidateUpdate {
    pub fn is_empty(&self) -> bool {
        self.min_msat.is_none() && self.proportional.is_none() && self.extra_data.is_none()
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        // Enable WAL mode for crash safety
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Bulk-read every stored row into a per-token view.
    ///
    /// A malformed params blob on any row fails the whole load: evaluation
    /// must never run against a partial view of the store.
    pub fn load_all(&self) -> anyhow::Result<BTreeMap<String, Params>> {
        let mut stmt = self.conn.prepare(
            "SELECT token, validity, params FROM new_channel_params ORDER BY token, validity",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut all: BTreeMap<String, Params> = BTreeMap::new();
        for row in rows {
            let (token, validity, params) = row?;
            let entry = all.entry(token.clone()).or_default();
            if validity == 0 {
                let script: ScriptRow = serde_json::from_str(&params)
                    .with_context(|| format!("malformed script row for token {}", token))?;
                entry.script = script.script;
                entry.extra_data = script.extra_data;
            } else {
                let op: OpeningParams = serde_json::from_str(&params).with_context(|| {
                    format!(
                        "malformed params row for token {} validity {}",
                        token, validity
                    )
                })?;
                entry.opening_params.insert(validity, op);
            }
        }

        Ok(all)
    }

    /// Merge `update` onto the stored params for exactly (token, validity).
    ///
    /// Shallow JSON-object merge: keys in `update` win, stored keys not in
    /// `update` are preserved. An empty update leaves the row untouched.
    /// Rows are updated in place only; a missing row is a no-op, never an
    /// insert.
    pub fn merge_update(
        &self,
        token: &str,
        validity: i64,
        update: &CandidateUpdate,
    ) -> anyhow::Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT params FROM new_channel_params WHERE token = ?1 AND validity = ?2",
                rusqlite::params![token, validity],
                |row| row.get(0),
            )
            .optional()?;

        let Some(stored) = stored else {
            debug!(
                "merge_update: no row for token {} validity {}, skipping",
                token, validity
            );
            return Ok(());
        };

        let mut merged: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&stored).with_context(|| {
                format!(
                    "malformed params row for token {} validity {}",
                    token, validity
                )
            })?;
        let patch = serde_json::to_value(update)?;
        if let serde_json::Value::Object(fields) = patch {
            merged.extend(fields);
        }

        self.conn.execute(
            "UPDATE new_channel_params SET params = ?3 WHERE token = ?1 AND validity = ?2",
            rusqlite::params![token, validity, serde_json::to_string(&merged)?],
        )?;
        Ok(())
    }
}

const SCHEMA: &str = r#"
-- Per-token policy scripts (validity 0) and opening parameters (validity > 0)
CREATE TABLE IF NOT EXISTS new_channel_params (
    token TEXT NOT NULL,
    validity INTEGER NOT NULL,
    params TEXT NOT NULL,
    PRIMARY KEY (token, validity)
);
"#;
