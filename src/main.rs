//! # shopfloor
//!
//! Command-line front end: wires settings, telemetry and the SQLite store
//! into a [`Scheduler`] and prints every result as JSON on stdout.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use shopfloor_core::ids::{ExecutorId, OperationId, OrderId, ShopId, UserId};
use shopfloor_core::{NewOperation, NewOrder, Role, SystemClock};
use shopfloor_engine::{run_periodic, Scheduler, StartRequest};
use shopfloor_settings::ShopfloorSettings;
use shopfloor_store::catalog::CatalogRepo;
use shopfloor_store::database::DatabaseOptions;
use shopfloor_store::deviations::DeviationQuery;
use shopfloor_store::users::UserRepo;
use shopfloor_store::{Database, StoreError};
use shopfloor_telemetry::TelemetryConfig;

/// Operation-chain scheduler for manufacturing orders.
#[derive(Parser, Debug)]
#[command(name = "shopfloor", about = "Operation-chain scheduler for manufacturing orders")]
struct Cli {
    /// Settings file (defaults to `~/.shopfloor/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database (overrides settings).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register an actor.
    AddUser {
        username: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
    },
    /// Register an assembly shop.
    AddShop { name: String },
    /// Register an executor working in the given shops.
    AddExecutor {
        full_name: String,
        #[arg(long = "shop")]
        shops: Vec<String>,
    },
    /// Create an order.
    CreateOrder {
        name: String,
        #[arg(long)]
        actor: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, value_parser = parse_timestamp)]
        deadline: Option<DateTime<Utc>>,
        /// Username of the order's default master.
        #[arg(long)]
        master: Option<String>,
    },
    /// Add an operation to an order.
    AddOperation {
        order: String,
        name: String,
        #[arg(long)]
        actor: String,
        #[arg(long, value_parser = parse_timestamp)]
        start: DateTime<Utc>,
        #[arg(long, value_parser = parse_timestamp)]
        end: DateTime<Utc>,
        #[arg(long)]
        shop: Option<String>,
        #[arg(long = "executor")]
        executors: Vec<String>,
        /// Operation that follows this one.
        #[arg(long)]
        next: Option<String>,
    },
    /// Point one operation at its successor, or unlink it.
    Link {
        from: String,
        to: Option<String>,
        #[arg(long)]
        actor: String,
    },
    /// List the operations of an order in execution order.
    Sequence { order: String },
    /// Completed vs. total operations of an order.
    Progress { order: String },
    /// Start an operation.
    Start {
        operation: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        shop: String,
        #[arg(long = "executor", required = true)]
        executors: Vec<String>,
    },
    /// Finish an operation.
    End {
        operation: String,
        #[arg(long)]
        actor: String,
    },
    /// Move stale unstarted chain roots to today once.
    Sweep,
    /// Run the drift sweep periodically until Ctrl-C.
    Watch {
        /// Seconds between sweeps (overrides settings).
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Show the deviation log, newest first.
    Logs {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        operation: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse()
}

fn load_settings(cli: &Cli) -> Result<ShopfloorSettings> {
    let mut settings = match &cli.config {
        Some(path) => shopfloor_settings::load_settings_from_path(path),
        None => shopfloor_settings::load_settings(),
    }
    .context("failed to load settings")?;
    if let Some(db) = &cli.db {
        settings.database.path = db.clone();
    }
    Ok(settings)
}

fn open_scheduler(settings: &ShopfloorSettings) -> Result<Scheduler> {
    let options = DatabaseOptions {
        busy_timeout: Duration::from_millis(settings.database.busy_timeout_ms),
        max_tx_retries: settings.database.max_tx_retries,
    };
    let db = Database::open_with(&settings.database.path, &options).with_context(|| {
        format!("failed to open database {}", settings.database.path.display())
    })?;
    Ok(Scheduler::new(db, Arc::new(SystemClock)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn user_id(scheduler: &Scheduler, username: &str) -> Result<UserId> {
    let user = scheduler
        .database()
        .with_conn(|conn| UserRepo::get_by_username(conn, username))
        .with_context(|| format!("unknown user {username:?}"))?;
    Ok(user.id)
}

async fn run(cli: Cli, settings: ShopfloorSettings) -> Result<()> {
    let scheduler = open_scheduler(&settings)?;

    match cli.command {
        Command::AddUser { username, role } => {
            let user = scheduler
                .database()
                .with_conn(|conn| UserRepo::create(conn, &username, role))?;
            print_json(&user)
        }
        Command::AddShop { name } => {
            let shop = scheduler
                .database()
                .with_conn(|conn| CatalogRepo::create_shop(conn, &name))?;
            print_json(&shop)
        }
        Command::AddExecutor { full_name, shops } => {
            let shops: Vec<ShopId> = shops.into_iter().map(ShopId::from_raw).collect();
            let executor = scheduler.database().transaction::<_, _, StoreError>(|conn| {
                for shop in &shops {
                    CatalogRepo::get_shop(conn, shop)?;
                }
                CatalogRepo::create_executor(conn, &full_name, &shops)
            })?;
            print_json(&executor)
        }
        Command::CreateOrder {
            name,
            actor,
            description,
            deadline,
            master,
        } => {
            let actor = user_id(&scheduler, &actor)?;
            let default_master = master
                .map(|m| user_id(&scheduler, &m))
                .transpose()?;
            let order = scheduler.create_order(
                &actor,
                NewOrder {
                    name,
                    description,
                    deadline,
                    default_master,
                },
            )?;
            print_json(&order)
        }
        Command::AddOperation {
            order,
            name,
            actor,
            start,
            end,
            shop,
            executors,
            next,
        } => {
            let actor = user_id(&scheduler, &actor)?;
            let op = scheduler.add_operation(
                &actor,
                NewOperation {
                    order_id: OrderId::from_raw(order),
                    name,
                    description: None,
                    shop_id: shop.map(ShopId::from_raw),
                    master: None,
                    executors: executors.into_iter().map(ExecutorId::from_raw).collect(),
                    planned_start: start,
                    planned_end: end,
                    predict_start: None,
                    predict_end: None,
                    next_operation: next.map(OperationId::from_raw),
                },
            )?;
            print_json(&op)
        }
        Command::Link { from, to, actor } => {
            let actor = user_id(&scheduler, &actor)?;
            let to = to.map(OperationId::from_raw);
            let op = scheduler.link_operations(&actor, &OperationId::from_raw(from), to.as_ref())?;
            print_json(&op)
        }
        Command::Sequence { order } => {
            print_json(&scheduler.sequence_order(&OrderId::from_raw(order))?)
        }
        Command::Progress { order } => {
            print_json(&scheduler.order_progress(&OrderId::from_raw(order))?)
        }
        Command::Start {
            operation,
            actor,
            shop,
            executors,
        } => {
            let actor = user_id(&scheduler, &actor)?;
            let request = StartRequest {
                shop_id: ShopId::from_raw(shop),
                executor_ids: executors.into_iter().map(ExecutorId::from_raw).collect(),
            };
            let outcome =
                scheduler.start_operation(&actor, &OperationId::from_raw(operation), &request)?;
            print_json(&outcome)
        }
        Command::End { operation, actor } => {
            let actor = user_id(&scheduler, &actor)?;
            let outcome = scheduler.end_operation(&actor, &OperationId::from_raw(operation))?;
            print_json(&outcome)
        }
        Command::Sweep => print_json(&scheduler.refresh_stale_predictions()?),
        Command::Watch { interval } => {
            let every = Duration::from_secs(interval.unwrap_or(settings.sweep.interval_secs).max(1));
            info!(interval_secs = every.as_secs(), "watching for stale predictions");
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for ctrl+c");
                }
            };
            let runs = run_periodic(Arc::new(scheduler), every, shutdown).await;
            print_json(&serde_json::json!({ "runs": runs }))
        }
        Command::Logs {
            search,
            operation,
            limit,
        } => {
            let query = DeviationQuery {
                search,
                operation_id: operation.map(OperationId::from_raw),
                limit,
            };
            print_json(&scheduler.deviation_log(&query)?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let telemetry = TelemetryConfig::from_level_name(&settings.logging.level, settings.logging.json);
    if let Err(e) = shopfloor_telemetry::init_telemetry(&telemetry) {
        eprintln!("shopfloor: failed to initialize logging: {e}");
    }

    run(cli, settings).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_start_with_executors() {
        let cli = Cli::try_parse_from([
            "shopfloor", "--db", "/tmp/x.db", "start", "op_1", "--actor", "anna", "--shop",
            "shop_1", "--executor", "exe_1", "--executor", "exe_2",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        match cli.command {
            Command::Start { operation, executors, .. } => {
                assert_eq!(operation, "op_1");
                assert_eq!(executors, vec!["exe_1", "exe_2"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn start_requires_an_executor() {
        let err = Cli::try_parse_from([
            "shopfloor", "start", "op_1", "--actor", "anna", "--shop", "shop_1",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn timestamps_and_roles_are_validated() {
        assert_eq!(
            parse_timestamp("2024-04-15T09:00:00+02:00").unwrap(),
            DateTime::parse_from_rfc3339("2024-04-15T07:00:00Z").unwrap()
        );
        assert!(parse_timestamp("tomorrow").is_err());
        assert_eq!(parse_role("master").unwrap(), Role::Master);
        assert!(parse_role("foreman").is_err());
    }

    #[test]
    fn cli_db_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("settings.json");
        std::fs::write(&config, r#"{"database": {"path": "/srv/a.db"}}"#).unwrap();
        let cli = Cli::try_parse_from([
            "shopfloor",
            "--config",
            config.to_str().unwrap(),
            "--db",
            "/srv/b.db",
            "sweep",
        ])
        .unwrap();
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.database.path, PathBuf::from("/srv/b.db"));
    }
}
