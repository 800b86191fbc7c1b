use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};

use shopfloor_core::ids::{ExecutorId, OperationId, OrderId, ShopId, UserId};
use shopfloor_core::{Operation, PredictionUpdate};

use crate::error::StoreError;
use crate::row_helpers;

/// Fields written when an operation starts.
#[derive(Clone, Debug)]
pub struct StartRecord<'a> {
    pub actual_start: DateTime<Utc>,
    pub shop_id: &'a ShopId,
    pub executors: &'a [ExecutorId],
    pub predict_start: DateTime<Utc>,
    pub predict_end: DateTime<Utc>,
}

pub struct OperationRepo;

// `previous_operation_id` is derived: whichever row points at this one.
const OPERATION_SELECT: &str = "SELECT o.id, o.order_id, o.name, o.description, o.shop_id, o.master,
        o.planned_start, o.planned_end, o.predict_start, o.predict_end,
        o.actual_start, o.actual_end, o.next_operation_id,
        (SELECT p.id FROM operations p WHERE p.next_operation_id = o.id LIMIT 1)
 FROM operations o";

impl OperationRepo {
    #[instrument(skip(conn, op), fields(operation_id = %op.id, order_id = %op.order_id))]
    pub fn insert(conn: &Connection, op: &Operation) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO operations (id, order_id, name, description, shop_id, master,
                planned_start, planned_end, predict_start, predict_end, actual_start, actual_end,
                next_operation_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            rusqlite::params![
                op.id.as_str(),
                op.order_id.as_str(),
                op.name,
                op.description,
                op.shop_id.as_ref().map(ShopId::as_str),
                op.master.as_ref().map(UserId::as_str),
                row_helpers::ts_opt(op.planned_start.as_ref()),
                row_helpers::ts_opt(op.planned_end.as_ref()),
                row_helpers::ts_opt(op.predict_start.as_ref()),
                row_helpers::ts_opt(op.predict_end.as_ref()),
                row_helpers::ts_opt(op.actual_start.as_ref()),
                row_helpers::ts_opt(op.actual_end.as_ref()),
                op.next_operation.as_ref().map(OperationId::as_str),
                row_helpers::ts(&Utc::now()),
            ],
        )?;
        Self::replace_executors(conn, &op.id, &op.executors)
    }

    #[instrument(skip(conn), fields(operation_id = %id))]
    pub fn get(conn: &Connection, id: &OperationId) -> Result<Operation, StoreError> {
        let op = conn
            .query_row(
                &format!("{OPERATION_SELECT} WHERE o.id = ?1"),
                [id.as_str()],
                |row| Ok(row_to_operation(row)),
            )
            .optional()?
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("operation {id}")))?;
        Self::with_executors(conn, op)
    }

    /// Every operation of an order, in storage order. Chains never cross
    /// orders, so this is also the full chain neighbourhood of each member.
    #[instrument(skip(conn), fields(order_id = %order_id))]
    pub fn list_for_order(
        conn: &Connection,
        order_id: &OrderId,
    ) -> Result<Vec<Operation>, StoreError> {
        Self::query(
            conn,
            &format!("{OPERATION_SELECT} WHERE o.order_id = ?1 ORDER BY o.created_at, o.id"),
            rusqlite::params![order_id.as_str()],
        )
    }

    /// Unstarted chain roots that carry a prediction.
    pub fn unstarted_roots(conn: &Connection) -> Result<Vec<Operation>, StoreError> {
        Self::query(
            conn,
            &format!(
                "{OPERATION_SELECT}
                 WHERE o.actual_start IS NULL
                   AND o.predict_start IS NOT NULL
                   AND NOT EXISTS (SELECT 1 FROM operations p WHERE p.next_operation_id = o.id)
                 ORDER BY o.predict_start, o.id"
            ),
            [],
        )
    }

    /// Operation in a shop whose forecast finishes last.
    pub fn last_in_shop(conn: &Connection, shop_id: &ShopId) -> Result<Option<Operation>, StoreError> {
        let found = Self::query(
            conn,
            &format!(
                "{OPERATION_SELECT} WHERE o.shop_id = ?1 AND o.predict_end IS NOT NULL
                 ORDER BY o.predict_end DESC, o.id DESC LIMIT 1"
            ),
            rusqlite::params![shop_id.as_str()],
        )?;
        Ok(found.into_iter().next())
    }

    /// Operation whose forecast starts first, across all orders.
    pub fn first_by_prediction(conn: &Connection) -> Result<Option<Operation>, StoreError> {
        let found = Self::query(
            conn,
            &format!(
                "{OPERATION_SELECT} WHERE o.predict_start IS NOT NULL
                 ORDER BY o.predict_start ASC, o.id ASC LIMIT 1"
            ),
            [],
        )?;
        Ok(found.into_iter().next())
    }

    #[instrument(skip(conn, record), fields(operation_id = %id))]
    pub fn record_start(
        conn: &Connection,
        id: &OperationId,
        record: &StartRecord<'_>,
    ) -> Result<(), StoreError> {
        let changed = conn.execute(
            "UPDATE operations
             SET actual_start = ?1, shop_id = ?2, predict_start = ?3, predict_end = ?4
             WHERE id = ?5 AND actual_start IS NULL",
            rusqlite::params![
                row_helpers::ts(&record.actual_start),
                record.shop_id.as_str(),
                row_helpers::ts(&record.predict_start),
                row_helpers::ts(&record.predict_end),
                id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::Conflict(format!("operation {id} already started")));
        }
        Self::replace_executors(conn, id, record.executors)
    }

    #[instrument(skip(conn), fields(operation_id = %id))]
    pub fn record_end(
        conn: &Connection,
        id: &OperationId,
        actual_end: &DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let changed = conn.execute(
            "UPDATE operations SET actual_end = ?1
             WHERE id = ?2 AND actual_start IS NOT NULL AND actual_end IS NULL",
            rusqlite::params![row_helpers::ts(actual_end), id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::Conflict(format!("operation {id} cannot end")));
        }
        Ok(())
    }

    /// Bulk-write forecasts.
    pub fn write_predictions(
        conn: &Connection,
        updates: &[PredictionUpdate],
    ) -> Result<(), StoreError> {
        let mut stmt = conn.prepare(
            "UPDATE operations SET predict_start = ?1, predict_end = ?2 WHERE id = ?3",
        )?;
        for update in updates {
            let changed = stmt.execute(rusqlite::params![
                row_helpers::ts(&update.predict_start),
                row_helpers::ts(&update.predict_end),
                update.operation_id.as_str(),
            ])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("operation {}", update.operation_id)));
            }
        }
        debug!(count = updates.len(), "predictions written");
        Ok(())
    }

    /// Point `id` at a new successor (or clear it).
    #[instrument(skip(conn), fields(operation_id = %id))]
    pub fn set_next(
        conn: &Connection,
        id: &OperationId,
        next: Option<&OperationId>,
    ) -> Result<(), StoreError> {
        let changed = conn.execute(
            "UPDATE operations SET next_operation_id = ?1 WHERE id = ?2",
            rusqlite::params![next.map(OperationId::as_str), id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("operation {id}")));
        }
        Ok(())
    }

    pub fn replace_executors(
        conn: &Connection,
        id: &OperationId,
        executors: &[ExecutorId],
    ) -> Result<(), StoreError> {
        conn.execute(
            "DELETE FROM operation_executors WHERE operation_id = ?1",
            [id.as_str()],
        )?;
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO operation_executors (operation_id, executor_id) VALUES (?1, ?2)",
        )?;
        for executor in executors {
            stmt.execute(rusqlite::params![id.as_str(), executor.as_str()])?;
        }
        Ok(())
    }

    /// Hand every operation of an order to a new master.
    pub fn reassign_master(
        conn: &Connection,
        order_id: &OrderId,
        master: Option<&UserId>,
    ) -> Result<usize, StoreError> {
        Ok(conn.execute(
            "UPDATE operations SET master = ?1 WHERE order_id = ?2",
            rusqlite::params![master.map(UserId::as_str), order_id.as_str()],
        )?)
    }

    #[instrument(skip(conn), fields(operation_id = %id))]
    pub fn delete(conn: &Connection, id: &OperationId) -> Result<(), StoreError> {
        let changed = conn.execute("DELETE FROM operations WHERE id = ?1", [id.as_str()])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("operation {id}")));
        }
        Ok(())
    }

    fn query<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<Operation>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut ops = Vec::new();
        while let Some(row) = rows.next()? {
            ops.push(row_to_operation(row)?);
        }
        ops.into_iter()
            .map(|op| Self::with_executors(conn, op))
            .collect()
    }

    fn with_executors(conn: &Connection, mut op: Operation) -> Result<Operation, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT executor_id FROM operation_executors WHERE operation_id = ?1 ORDER BY executor_id",
        )?;
        op.executors = stmt
            .query_map([op.id.as_str()], |row| {
                Ok(ExecutorId::from_raw(row.get::<_, String>(0)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(op)
    }
}

fn row_to_operation(row: &rusqlite::Row<'_>) -> Result<Operation, StoreError> {
    const T: &str = "operations";
    Ok(Operation {
        id: OperationId::from_raw(row_helpers::get::<String>(row, 0, T, "id")?),
        order_id: OrderId::from_raw(row_helpers::get::<String>(row, 1, T, "order_id")?),
        name: row_helpers::get(row, 2, T, "name")?,
        description: row_helpers::get_opt(row, 3, T, "description")?,
        shop_id: row_helpers::get_opt::<String>(row, 4, T, "shop_id")?.map(ShopId::from_raw),
        master: row_helpers::get_opt::<String>(row, 5, T, "master")?.map(UserId::from_raw),
        executors: Vec::new(),
        planned_start: row_helpers::get_opt_ts(row, 6, T, "planned_start")?,
        planned_end: row_helpers::get_opt_ts(row, 7, T, "planned_end")?,
        predict_start: row_helpers::get_opt_ts(row, 8, T, "predict_start")?,
        predict_end: row_helpers::get_opt_ts(row, 9, T, "predict_end")?,
        actual_start: row_helpers::get_opt_ts(row, 10, T, "actual_start")?,
        actual_end: row_helpers::get_opt_ts(row, 11, T, "actual_end")?,
        next_operation: row_helpers::get_opt::<String>(row, 12, T, "next_operation_id")?
            .map(OperationId::from_raw),
        previous_operation: row_helpers::get_opt::<String>(row, 13, T, "previous_operation_id")?
            .map(OperationId::from_raw),
    })
}
