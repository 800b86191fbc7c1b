//! Assembly shops and the executors who work in them.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use shopfloor_core::ids::{ExecutorId, ShopId};

use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopRow {
    pub id: ShopId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorRow {
    pub id: ExecutorId,
    pub full_name: String,
    pub shops: Vec<ShopId>,
}

pub struct CatalogRepo;

impl CatalogRepo {
    #[instrument(skip(conn))]
    pub fn create_shop(conn: &Connection, name: &str) -> Result<ShopRow, StoreError> {
        let id = ShopId::new();
        conn.execute(
            "INSERT INTO shops (id, name, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![id.as_str(), name, row_helpers::ts(&Utc::now())],
        )?;
        Ok(ShopRow {
            id,
            name: name.to_string(),
        })
    }

    #[instrument(skip(conn), fields(shop_id = %id))]
    pub fn get_shop(conn: &Connection, id: &ShopId) -> Result<ShopRow, StoreError> {
        conn.query_row(
            "SELECT id, name FROM shops WHERE id = ?1",
            [id.as_str()],
            |row| {
                Ok(ShopRow {
                    id: ShopId::from_raw(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("shop {id}")))
    }

    pub fn shop_exists(conn: &Connection, id: &ShopId) -> Result<bool, StoreError> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM shops WHERE id = ?1", [id.as_str()], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_shops(conn: &Connection) -> Result<Vec<ShopRow>, StoreError> {
        let mut stmt = conn.prepare("SELECT id, name FROM shops ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ShopRow {
                    id: ShopId::from_raw(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    #[instrument(skip(conn, shops))]
    pub fn create_executor(
        conn: &Connection,
        full_name: &str,
        shops: &[ShopId],
    ) -> Result<ExecutorRow, StoreError> {
        let id = ExecutorId::new();
        conn.execute(
            "INSERT INTO executors (id, full_name, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![id.as_str(), full_name, row_helpers::ts(&Utc::now())],
        )?;
        for shop in shops {
            conn.execute(
                "INSERT INTO executor_shops (executor_id, shop_id) VALUES (?1, ?2)",
                rusqlite::params![id.as_str(), shop.as_str()],
            )?;
        }
        Ok(ExecutorRow {
            id,
            full_name: full_name.to_string(),
            shops: shops.to_vec(),
        })
    }

    /// The subset of `ids` that has no executor row.
    pub fn missing_executors(
        conn: &Connection,
        ids: &[ExecutorId],
    ) -> Result<Vec<ExecutorId>, StoreError> {
        let mut stmt = conn.prepare("SELECT 1 FROM executors WHERE id = ?1")?;
        let mut missing = Vec::new();
        for id in ids {
            if !stmt.exists([id.as_str()])? {
                missing.push(id.clone());
            }
        }
        Ok(missing)
    }

    /// Executors working in a shop, by name.
    #[instrument(skip(conn), fields(shop_id = %shop_id))]
    pub fn executors_in_shop(
        conn: &Connection,
        shop_id: &ShopId,
    ) -> Result<Vec<ExecutorRow>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT e.id, e.full_name
             FROM executors e JOIN executor_shops es ON es.executor_id = e.id
             WHERE es.shop_id = ?1
             ORDER BY e.full_name",
        )?;
        let heads = stmt
            .query_map([shop_id.as_str()], |row| {
                Ok((
                    ExecutorId::from_raw(row.get::<_, String>(0)?),
                    row.get::<_, String>(1)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        heads
            .into_iter()
            .map(|(id, full_name)| {
                let shops = Self::shops_of(conn, &id)?;
                Ok(ExecutorRow {
                    id,
                    full_name,
                    shops,
                })
            })
            .collect()
    }

    fn shops_of(conn: &Connection, executor: &ExecutorId) -> Result<Vec<ShopId>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT shop_id FROM executor_shops WHERE executor_id = ?1 ORDER BY shop_id",
        )?;
        let shops = stmt
            .query_map([executor.as_str()], |row| {
                Ok(ShopId::from_raw(row.get::<_, String>(0)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(shops)
    }
}
