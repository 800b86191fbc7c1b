//! Plan edits: orders, operations and chain links. All of these require the
//! planning capability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use shopfloor_core::ids::{OperationId, OrderId, UserId};
use shopfloor_core::{NewOperation, NewOrder, Operation, Order};
use shopfloor_store::catalog::CatalogRepo;
use shopfloor_store::operations::OperationRepo;
use shopfloor_store::orders::OrderRepo;
use shopfloor_store::users::UserRepo;
use shopfloor_store::Connection;

use crate::chain::{ChainArena, ChainWalk};
use crate::error::SchedulerError;
use crate::Scheduler;

/// Partial edit of an order. `None` leaves a field as it is.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    /// Changing this reassigns every operation of the order.
    pub default_master: Option<Option<UserId>>,
}

impl Scheduler {
    #[instrument(skip(self, new), fields(actor = %actor_id))]
    pub fn create_order(&self, actor_id: &UserId, new: NewOrder) -> Result<Order, SchedulerError> {
        let order = self.database().transaction::<_, _, SchedulerError>(|conn| {
            let actor = UserRepo::get(conn, actor_id)?;
            actor.authorize_planning()?;
            require_name(&new.name, "order")?;
            if let Some(master) = &new.default_master {
                UserRepo::get(conn, master)?;
            }
            let order = Order {
                id: OrderId::new(),
                name: new.name.trim().to_string(),
                description: new.description.clone(),
                deadline: new.deadline,
                default_master: new.default_master.clone(),
                created_by: actor.id.clone(),
                created_at: self.now(),
            };
            OrderRepo::insert(conn, &order)?;
            Ok(order)
        })?;
        info!(order_id = %order.id, "order created");
        Ok(order)
    }

    #[instrument(skip(self, update), fields(actor = %actor_id, order_id = %order_id))]
    pub fn update_order(
        &self,
        actor_id: &UserId,
        order_id: &OrderId,
        update: OrderUpdate,
    ) -> Result<Order, SchedulerError> {
        self.database().transaction::<_, _, SchedulerError>(|conn| {
            UserRepo::get(conn, actor_id)?.authorize_planning()?;
            let mut order = OrderRepo::get(conn, order_id)?;
            if let Some(name) = &update.name {
                require_name(name, "order")?;
                order.name = name.trim().to_string();
            }
            if let Some(description) = &update.description {
                order.description = description.clone();
            }
            if let Some(deadline) = update.deadline {
                order.deadline = deadline;
            }
            if let Some(master) = &update.default_master {
                if let Some(id) = master {
                    UserRepo::get(conn, id)?;
                }
                if order.default_master != *master {
                    order.default_master = master.clone();
                    let moved = OperationRepo::reassign_master(conn, &order.id, master.as_ref())?;
                    info!(operations = moved, "default master reassigned");
                }
            }
            OrderRepo::update(conn, &order)?;
            Ok(order)
        })
    }

    /// Delete an order together with its operations and their deviation log.
    #[instrument(skip(self), fields(actor = %actor_id, order_id = %order_id))]
    pub fn delete_order(&self, actor_id: &UserId, order_id: &OrderId) -> Result<(), SchedulerError> {
        self.database().transaction::<_, _, SchedulerError>(|conn| {
            UserRepo::get(conn, actor_id)?.authorize_planning()?;
            OrderRepo::delete(conn, order_id)?;
            Ok(())
        })
    }

    /// Create an operation. Forecasts default to the plan and the master
    /// defaults to the order's default master.
    #[instrument(skip(self, new), fields(actor = %actor_id, order_id = %new.order_id))]
    pub fn add_operation(
        &self,
        actor_id: &UserId,
        new: NewOperation,
    ) -> Result<Operation, SchedulerError> {
        let op = self.database().transaction::<_, _, SchedulerError>(|conn| {
            UserRepo::get(conn, actor_id)?.authorize_planning()?;
            require_name(&new.name, "operation")?;
            if new.planned_end <= new.planned_start {
                return Err(SchedulerError::Validation(
                    "planned end must be after planned start".into(),
                ));
            }
            let order = OrderRepo::get(conn, &new.order_id)?;
            if let Some(shop) = &new.shop_id {
                if !CatalogRepo::shop_exists(conn, shop)? {
                    return Err(SchedulerError::Validation(format!("unknown shop {shop}")));
                }
            }
            let missing = CatalogRepo::missing_executors(conn, &new.executors)?;
            if let Some(first) = missing.first() {
                return Err(SchedulerError::Validation(format!("unknown executor {first}")));
            }
            let master = new.master.clone().or(order.default_master.clone());
            if let Some(master) = &master {
                UserRepo::get(conn, master)?;
            }

            let duration = new.planned_end - new.planned_start;
            let predict_start = new.predict_start.unwrap_or(new.planned_start);
            let predict_end = new.predict_end.unwrap_or(predict_start + duration);
            if predict_end < predict_start {
                return Err(SchedulerError::Validation(
                    "predicted end must not precede predicted start".into(),
                ));
            }

            let op = Operation {
                id: OperationId::new(),
                order_id: order.id.clone(),
                name: new.name.trim().to_string(),
                description: new.description.clone(),
                shop_id: new.shop_id.clone(),
                master,
                executors: new.executors.clone(),
                planned_start: Some(new.planned_start),
                planned_end: Some(new.planned_end),
                predict_start: Some(predict_start),
                predict_end: Some(predict_end),
                actual_start: None,
                actual_end: None,
                next_operation: None,
                previous_operation: None,
            };
            OperationRepo::insert(conn, &op)?;
            if let Some(next) = &new.next_operation {
                validate_link(conn, &op.id, next)?;
                OperationRepo::set_next(conn, &op.id, Some(next))?;
            }
            Ok(OperationRepo::get(conn, &op.id)?)
        })?;
        info!(operation_id = %op.id, "operation created");
        Ok(op)
    }

    /// Point `from` at `to`, or unlink it when `to` is `None`.
    #[instrument(skip(self), fields(actor = %actor_id, from = %from))]
    pub fn link_operations(
        &self,
        actor_id: &UserId,
        from: &OperationId,
        to: Option<&OperationId>,
    ) -> Result<Operation, SchedulerError> {
        self.database().transaction::<_, _, SchedulerError>(|conn| {
            UserRepo::get(conn, actor_id)?.authorize_planning()?;
            OperationRepo::get(conn, from)?;
            if let Some(to) = to {
                validate_link(conn, from, to)?;
            }
            OperationRepo::set_next(conn, from, to)?;
            Ok(OperationRepo::get(conn, from)?)
        })
    }

    /// Delete one operation. Its predecessor becomes a tail.
    #[instrument(skip(self), fields(actor = %actor_id, operation_id = %operation_id))]
    pub fn delete_operation(
        &self,
        actor_id: &UserId,
        operation_id: &OperationId,
    ) -> Result<(), SchedulerError> {
        self.database().transaction::<_, _, SchedulerError>(|conn| {
            UserRepo::get(conn, actor_id)?.authorize_planning()?;
            OperationRepo::delete(conn, operation_id)?;
            Ok(())
        })
    }
}

fn require_name(name: &str, what: &str) -> Result<(), SchedulerError> {
    if name.trim().is_empty() {
        return Err(SchedulerError::Validation(format!("{what} name must not be empty")));
    }
    Ok(())
}

/// `from -> to` must stay a simple chain inside one order.
fn validate_link(conn: &Connection, from: &OperationId, to: &OperationId) -> Result<(), SchedulerError> {
    if from == to {
        return Err(SchedulerError::Validation(format!(
            "operation {from} cannot follow itself"
        )));
    }
    let source = OperationRepo::get(conn, from)?;
    let target = OperationRepo::get(conn, to)?;
    if source.order_id != target.order_id {
        return Err(SchedulerError::Validation(format!(
            "operations {from} and {to} belong to different orders"
        )));
    }
    if let Some(previous) = &target.previous_operation {
        if previous != from {
            return Err(SchedulerError::Validation(format!(
                "operation {to} already follows {previous}"
            )));
        }
    }
    let arena = ChainArena::new(OperationRepo::list_for_order(conn, &source.order_id)?);
    if ChainWalk::new().forward(&arena, to).contains(from) {
        return Err(SchedulerError::Validation(format!(
            "linking {from} to {to} would close a cycle"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{at, floor, Floor};
    use shopfloor_store::orders::OrderProgress;

    fn new_op(f: &Floor, name: &str, start_h: u32, end_h: u32) -> NewOperation {
        NewOperation {
            order_id: f.order.id.clone(),
            name: name.into(),
            description: None,
            shop_id: Some(f.shop.id.clone()),
            master: None,
            executors: vec![f.worker.id.clone()],
            planned_start: at(start_h, 0),
            planned_end: at(end_h, 0),
            predict_start: None,
            predict_end: None,
            next_operation: None,
        }
    }

    #[test]
    fn create_order_requires_planner() {
        let f = floor();
        let new = NewOrder {
            name: "Conveyor".into(),
            description: "line 3".into(),
            deadline: None,
            default_master: Some(f.master.id.clone()),
        };
        let err = f.scheduler.create_order(&f.master.id, new.clone()).unwrap_err();
        assert_eq!(err.kind(), "forbidden");

        let order = f.scheduler.create_order(&f.tech.id, new).unwrap();
        assert_eq!(order.created_by, f.tech.id);
        assert_eq!(order.created_at, at(7, 0));
    }

    #[test]
    fn blank_order_name_rejected() {
        let f = floor();
        let err = f
            .scheduler
            .create_order(
                &f.tech.id,
                NewOrder {
                    name: "   ".into(),
                    description: String::new(),
                    deadline: None,
                    default_master: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn add_operation_defaults_forecast_and_master() {
        let f = floor();
        let op = f.scheduler.add_operation(&f.tech.id, new_op(&f, "Cut", 8, 11)).unwrap();
        assert_eq!(op.predict_start, Some(at(8, 0)));
        assert_eq!(op.predict_end, Some(at(11, 0)));
        assert_eq!(op.master.as_ref(), Some(&f.master.id));
        assert_eq!(op.executors, vec![f.worker.id.clone()]);
    }

    #[test]
    fn add_operation_validates_plan_and_catalog() {
        let f = floor();
        let err = f.scheduler.add_operation(&f.tech.id, new_op(&f, "Bad", 11, 11)).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");

        let mut ghost_shop = new_op(&f, "Ghost", 8, 9);
        ghost_shop.shop_id = Some(shopfloor_core::ids::ShopId::from_raw("shop_x"));
        assert_eq!(f.scheduler.add_operation(&f.tech.id, ghost_shop).unwrap_err().kind(), "invalid_input");

        let mut unknown_order = new_op(&f, "Lost", 8, 9);
        unknown_order.order_id = OrderId::from_raw("ord_missing");
        assert_eq!(f.scheduler.add_operation(&f.tech.id, unknown_order).unwrap_err().kind(), "not_found");
    }

    #[test]
    fn add_operation_with_successor_links_it() {
        let f = floor();
        let second = f.scheduler.add_operation(&f.tech.id, new_op(&f, "Paint", 11, 12)).unwrap();
        let mut first = new_op(&f, "Weld", 8, 11);
        first.next_operation = Some(second.id.clone());
        let first = f.scheduler.add_operation(&f.tech.id, first).unwrap();
        assert_eq!(first.next_operation.as_ref(), Some(&second.id));
        assert_eq!(f.get(&second.id).previous_operation.as_ref(), Some(&first.id));
    }

    #[test]
    fn link_rules() {
        let f = floor();
        let a = f.add_op("A", at(8, 0), 1, None);
        let b = f.add_op("B", at(9, 0), 1, None);
        let c = f.add_op("C", at(10, 0), 1, None);

        let self_loop = f.scheduler.link_operations(&f.tech.id, &a.id, Some(&a.id));
        assert_eq!(self_loop.unwrap_err().kind(), "invalid_input");

        f.scheduler.link_operations(&f.tech.id, &a.id, Some(&b.id)).unwrap();
        let taken = f.scheduler.link_operations(&f.tech.id, &c.id, Some(&b.id));
        assert_eq!(taken.unwrap_err().kind(), "invalid_input");

        f.scheduler.link_operations(&f.tech.id, &b.id, Some(&c.id)).unwrap();
        let cycle = f.scheduler.link_operations(&f.tech.id, &c.id, Some(&a.id));
        assert_eq!(cycle.unwrap_err().kind(), "invalid_input");

        // relinking the same pair is a no-op
        f.scheduler.link_operations(&f.tech.id, &a.id, Some(&b.id)).unwrap();

        let unlinked = f.scheduler.link_operations(&f.tech.id, &b.id, None).unwrap();
        assert!(unlinked.is_tail());
        assert!(f.get(&c.id).is_root());
    }

    #[test]
    fn cross_order_link_rejected() {
        let f = floor();
        let a = f.add_op("A", at(8, 0), 1, None);
        let other = f
            .scheduler
            .create_order(
                &f.tech.id,
                NewOrder {
                    name: "Other".into(),
                    description: String::new(),
                    deadline: None,
                    default_master: None,
                },
            )
            .unwrap();
        let mut foreign = new_op(&f, "Foreign", 9, 10);
        foreign.order_id = other.id;
        let foreign = f.scheduler.add_operation(&f.tech.id, foreign).unwrap();
        let err = f
            .scheduler
            .link_operations(&f.tech.id, &a.id, Some(&foreign.id))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn default_master_change_reassigns_operations() {
        let f = floor();
        let a = f.add_op("A", at(8, 0), 1, None);
        let b = f.add_op("B", at(9, 0), 1, None);
        let order = f
            .scheduler
            .update_order(
                &f.tech.id,
                &f.order.id,
                OrderUpdate {
                    default_master: Some(Some(f.other_master.id.clone())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(order.default_master.as_ref(), Some(&f.other_master.id));
        assert_eq!(f.get(&a.id).master.as_ref(), Some(&f.other_master.id));
        assert_eq!(f.get(&b.id).master.as_ref(), Some(&f.other_master.id));
    }

    #[test]
    fn renaming_keeps_assignments() {
        let f = floor();
        let a = f.add_op("A", at(8, 0), 1, None);
        let order = f
            .scheduler
            .update_order(
                &f.tech.id,
                &f.order.id,
                OrderUpdate {
                    name: Some("Press, rev 2".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(order.name, "Press, rev 2");
        assert_eq!(f.get(&a.id).master.as_ref(), Some(&f.master.id));
    }

    #[test]
    fn delete_order_cascades_and_delete_operation_unlinks() {
        let f = floor();
        let b = f.add_op("B", at(9, 0), 1, None);
        let a = f.add_op("A", at(8, 0), 1, Some(&b.id));

        f.scheduler.delete_operation(&f.tech.id, &b.id).unwrap();
        assert!(f.get(&a.id).is_tail());

        f.scheduler.delete_order(&f.tech.id, &f.order.id).unwrap();
        let progress = f
            .scheduler
            .database()
            .with_conn(|conn| OrderRepo::progress(conn, &f.order.id))
            .unwrap();
        assert_eq!(progress, OrderProgress { completed: 0, total: 0 });
        assert_eq!(
            f.scheduler.delete_order(&f.tech.id, &f.order.id).unwrap_err().kind(),
            "not_found"
        );
    }
}
