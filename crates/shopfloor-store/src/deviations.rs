use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use shopfloor_core::ids::{DeviationId, OperationId, UserId};
use shopfloor_core::DeviationEntry;

use crate::error::StoreError;
use crate::row_helpers;

const DEFAULT_LIMIT: u32 = 100;

/// Filters for listing the deviation log.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviationQuery {
    /// Substring matched against the description, the actor's username,
    /// the operation name and the order name.
    pub search: Option<String>,
    pub operation_id: Option<OperationId>,
    pub limit: Option<u32>,
}

pub struct DeviationRepo;

impl DeviationRepo {
    /// Append one entry. Entries are never updated afterwards.
    #[instrument(skip(conn, entry), fields(operation_id = %entry.operation_id, kind = %entry.kind))]
    pub fn append(conn: &Connection, entry: &DeviationEntry) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO deviations (id, logged_at, actor, description, kind, operation_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                entry.id.as_str(),
                row_helpers::ts(&entry.logged_at),
                entry.actor.as_str(),
                entry.description,
                entry.kind.to_string(),
                entry.operation_id.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn list(conn: &Connection, q: &DeviationQuery) -> Result<Vec<DeviationEntry>, StoreError> {
        let mut sql = String::from(
            "SELECT d.id, d.logged_at, d.actor, d.description, d.kind, d.operation_id
             FROM deviations d
             JOIN users u ON u.id = d.actor
             JOIN operations o ON o.id = d.operation_id
             JOIN orders r ON r.id = o.order_id
             WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(operation_id) = &q.operation_id {
            sql.push_str(&format!(" AND d.operation_id = ?{}", params.len() + 1));
            params.push(Box::new(operation_id.as_str().to_string()));
        }
        if let Some(search) = q.search.as_deref().filter(|s| !s.is_empty()) {
            let n = params.len() + 1;
            sql.push_str(&format!(
                " AND (d.description LIKE ?{n} ESCAPE '\\' OR u.username LIKE ?{n} ESCAPE '\\'
                   OR o.name LIKE ?{n} ESCAPE '\\' OR r.name LIKE ?{n} ESCAPE '\\')"
            ));
            params.push(Box::new(format!("%{}%", row_helpers::escape_like(search))));
        }

        sql.push_str(" ORDER BY d.logged_at DESC, d.id DESC");
        let limit = q.limit.unwrap_or(DEFAULT_LIMIT);
        sql.push_str(&format!(" LIMIT {limit}"));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(param_refs.as_slice())?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_entry(row)?);
        }
        Ok(entries)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<DeviationEntry, StoreError> {
    const T: &str = "deviations";
    let kind: String = row_helpers::get(row, 4, T, "kind")?;
    Ok(DeviationEntry {
        id: DeviationId::from_raw(row_helpers::get::<String>(row, 0, T, "id")?),
        logged_at: row_helpers::get_ts(row, 1, T, "logged_at")?,
        actor: UserId::from_raw(row_helpers::get::<String>(row, 2, T, "actor")?),
        description: row_helpers::get(row, 3, T, "description")?,
        kind: row_helpers::parse_enum(&kind, T, "kind")?,
        operation_id: OperationId::from_raw(row_helpers::get::<String>(row, 5, T, "operation_id")?),
    })
}
