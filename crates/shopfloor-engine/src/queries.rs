use tracing::{instrument, warn};

use shopfloor_core::ids::{OrderId, ShopId};
use shopfloor_core::{DeviationEntry, Operation, Order};
use shopfloor_store::deviations::{DeviationQuery, DeviationRepo};
use shopfloor_store::operations::OperationRepo;
use shopfloor_store::orders::{OrderProgress, OrderRepo};

use crate::error::SchedulerError;
use crate::sequencer;
use crate::Scheduler;

impl Scheduler {
    /// Operations of an order in execution order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn sequence_order(&self, order_id: &OrderId) -> Result<Vec<Operation>, SchedulerError> {
        let operations = self.database().with_conn(|conn| {
            OrderRepo::get(conn, order_id)?;
            OperationRepo::list_for_order(conn, order_id)
        })?;
        let sequenced = sequencer::sequence_with_warnings(operations);
        if !sequenced.warnings.is_empty() {
            warn!(count = sequenced.warnings.len(), "order has corrupt chain links");
        }
        Ok(sequenced.operations)
    }

    pub fn list_orders(&self, limit: u32, offset: u32) -> Result<Vec<Order>, SchedulerError> {
        Ok(self
            .database()
            .with_conn(|conn| OrderRepo::list(conn, limit, offset))?)
    }

    pub fn order_progress(&self, order_id: &OrderId) -> Result<OrderProgress, SchedulerError> {
        Ok(self.database().with_conn(|conn| {
            OrderRepo::get(conn, order_id)?;
            OrderRepo::progress(conn, order_id)
        })?)
    }

    /// The operation in `shop_id` forecast to finish last.
    pub fn last_in_shop(&self, shop_id: &ShopId) -> Result<Operation, SchedulerError> {
        self.database()
            .with_conn(|conn| OperationRepo::last_in_shop(conn, shop_id))?
            .ok_or_else(|| SchedulerError::NotFound(format!("operations in shop {shop_id}")))
    }

    /// The operation forecast to start first.
    pub fn first_operation(&self) -> Result<Operation, SchedulerError> {
        self.database()
            .with_conn(OperationRepo::first_by_prediction)?
            .ok_or_else(|| SchedulerError::NotFound("operations".into()))
    }

    pub fn deviation_log(&self, query: &DeviationQuery) -> Result<Vec<DeviationEntry>, SchedulerError> {
        Ok(self
            .database()
            .with_conn(|conn| DeviationRepo::list(conn, query))?)
    }
}
