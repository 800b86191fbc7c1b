use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use shopfloor_core::ids::{OrderId, UserId};
use shopfloor_core::Order;

use crate::error::StoreError;
use crate::row_helpers;

/// Completed vs. total operations of one order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProgress {
    pub completed: u32,
    pub total: u32,
}

pub struct OrderRepo;

const ORDER_COLUMNS: &str =
    "id, name, description, deadline, default_master, created_by, created_at";

impl OrderRepo {
    #[instrument(skip(conn, order), fields(order_id = %order.id))]
    pub fn insert(conn: &Connection, order: &Order) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO orders (id, name, description, deadline, default_master, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                order.id.as_str(),
                order.name,
                order.description,
                row_helpers::ts_opt(order.deadline.as_ref()),
                order.default_master.as_ref().map(UserId::as_str),
                order.created_by.as_str(),
                row_helpers::ts(&order.created_at),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(conn), fields(order_id = %id))]
    pub fn get(conn: &Connection, id: &OrderId) -> Result<Order, StoreError> {
        conn.query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
            [id.as_str()],
            |row| Ok(row_to_order(row)),
        )
        .optional()?
        .transpose()?
        .ok_or_else(|| StoreError::NotFound(format!("order {id}")))
    }

    /// Orders by creation time, oldest first.
    pub fn list(conn: &Connection, limit: u32, offset: u32) -> Result<Vec<Order>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at ASC, id ASC LIMIT ?1 OFFSET ?2"
        ))?;
        let mut rows = stmt.query(rusqlite::params![limit, offset])?;
        let mut orders = Vec::new();
        while let Some(row) = rows.next()? {
            orders.push(row_to_order(row)?);
        }
        Ok(orders)
    }

    /// Overwrite the editable fields of an order.
    #[instrument(skip(conn, order), fields(order_id = %order.id))]
    pub fn update(conn: &Connection, order: &Order) -> Result<(), StoreError> {
        let changed = conn.execute(
            "UPDATE orders SET name = ?1, description = ?2, deadline = ?3, default_master = ?4
             WHERE id = ?5",
            rusqlite::params![
                order.name,
                order.description,
                row_helpers::ts_opt(order.deadline.as_ref()),
                order.default_master.as_ref().map(UserId::as_str),
                order.id.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("order {}", order.id)));
        }
        Ok(())
    }

    /// Delete an order; its operations go with it.
    #[instrument(skip(conn), fields(order_id = %id))]
    pub fn delete(conn: &Connection, id: &OrderId) -> Result<(), StoreError> {
        let changed = conn.execute("DELETE FROM orders WHERE id = ?1", [id.as_str()])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("order {id}")));
        }
        Ok(())
    }

    pub fn progress(conn: &Connection, id: &OrderId) -> Result<OrderProgress, StoreError> {
        let (completed, total): (u32, u32) = conn.query_row(
            "SELECT COALESCE(SUM(actual_end IS NOT NULL), 0), COUNT(*)
             FROM operations WHERE order_id = ?1",
            [id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(OrderProgress { completed, total })
    }
}

fn row_to_order(row: &rusqlite::Row<'_>) -> Result<Order, StoreError> {
    Ok(Order {
        id: OrderId::from_raw(row_helpers::get::<String>(row, 0, "orders", "id")?),
        name: row_helpers::get(row, 1, "orders", "name")?,
        description: row_helpers::get(row, 2, "orders", "description")?,
        deadline: row_helpers::get_opt_ts(row, 3, "orders", "deadline")?,
        default_master: row_helpers::get_opt::<String>(row, 4, "orders", "default_master")?
            .map(UserId::from_raw),
        created_by: UserId::from_raw(row_helpers::get::<String>(row, 5, "orders", "created_by")?),
        created_at: row_helpers::get_ts(row, 6, "orders", "created_at")?,
    })
}
