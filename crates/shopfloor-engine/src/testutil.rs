use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use shopfloor_core::ids::{OperationId, OrderId};
use shopfloor_core::{FixedClock, Operation, Order, Role, User};
use shopfloor_store::catalog::{CatalogRepo, ExecutorRow, ShopRow};
use shopfloor_store::operations::OperationRepo;
use shopfloor_store::orders::OrderRepo;
use shopfloor_store::users::UserRepo;
use shopfloor_store::Database;

use crate::Scheduler;

pub(crate) fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 15, h, m, 0).unwrap()
}

/// A small shop floor: one order, one shop with one worker, and a user per role.
pub(crate) struct Floor {
    pub scheduler: Scheduler,
    pub clock: Arc<FixedClock>,
    pub tech: User,
    pub master: User,
    pub other_master: User,
    pub observer: User,
    pub shop: ShopRow,
    pub worker: ExecutorRow,
    pub order: Order,
}

pub(crate) fn floor() -> Floor {
    let db = Database::in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(at(7, 0)));
    let (tech, master, other_master, observer, shop, worker, order) = db
        .with_conn(|conn| {
            let tech = UserRepo::create(conn, "tech", Role::Technologist)?;
            let master = UserRepo::create(conn, "master", Role::Master)?;
            let other_master = UserRepo::create(conn, "other", Role::Master)?;
            let observer = UserRepo::create(conn, "viewer", Role::Observer)?;
            let shop = CatalogRepo::create_shop(conn, "Assembly 1")?;
            let worker = CatalogRepo::create_executor(conn, "Ann Lee", &[shop.id.clone()])?;
            let order = Order {
                id: OrderId::new(),
                name: "Hydraulic press".into(),
                description: String::new(),
                deadline: None,
                default_master: Some(master.id.clone()),
                created_by: tech.id.clone(),
                created_at: at(6, 0),
            };
            OrderRepo::insert(conn, &order)?;
            Ok((tech, master, other_master, observer, shop, worker, order))
        })
        .unwrap();

    Floor {
        scheduler: Scheduler::new(db, clock.clone()),
        clock,
        tech,
        master,
        other_master,
        observer,
        shop,
        worker,
        order,
    }
}

impl Floor {
    /// Insert an operation of the floor's order, assigned to `master`, with
    /// predictions equal to the plan. Successors must be inserted first.
    pub fn add_op(
        &self,
        name: &str,
        start: DateTime<Utc>,
        hours: i64,
        next: Option<&OperationId>,
    ) -> Operation {
        let end = start + Duration::hours(hours);
        let op = Operation {
            id: OperationId::new(),
            order_id: self.order.id.clone(),
            name: name.into(),
            description: None,
            shop_id: None,
            master: Some(self.master.id.clone()),
            executors: Vec::new(),
            planned_start: Some(start),
            planned_end: Some(end),
            predict_start: Some(start),
            predict_end: Some(end),
            actual_start: None,
            actual_end: None,
            next_operation: next.cloned(),
            previous_operation: None,
        };
        self.scheduler
            .database()
            .with_conn(|conn| OperationRepo::insert(conn, &op))
            .unwrap();
        op
    }

    pub fn get(&self, id: &OperationId) -> Operation {
        self.scheduler
            .database()
            .with_conn(|conn| OperationRepo::get(conn, id))
            .unwrap()
    }
}
