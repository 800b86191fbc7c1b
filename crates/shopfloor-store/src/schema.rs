/// SQL DDL for the shopfloor database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS shops (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS executors (
    id TEXT PRIMARY KEY,
    full_name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS executor_shops (
    executor_id TEXT NOT NULL REFERENCES executors(id) ON DELETE CASCADE,
    shop_id TEXT NOT NULL REFERENCES shops(id) ON DELETE CASCADE,
    PRIMARY KEY (executor_id, shop_id)
);

CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    deadline TEXT,
    default_master TEXT REFERENCES users(id) ON DELETE SET NULL,
    created_by TEXT NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS operations (
    id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    shop_id TEXT REFERENCES shops(id) ON DELETE SET NULL,
    master TEXT REFERENCES users(id) ON DELETE SET NULL,
    planned_start TEXT,
    planned_end TEXT,
    predict_start TEXT,
    predict_end TEXT,
    actual_start TEXT,
    actual_end TEXT,
    next_operation_id TEXT UNIQUE REFERENCES operations(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    CHECK (next_operation_id IS NULL OR next_operation_id <> id)
);

CREATE TABLE IF NOT EXISTS operation_executors (
    operation_id TEXT NOT NULL REFERENCES operations(id) ON DELETE CASCADE,
    executor_id TEXT NOT NULL REFERENCES executors(id) ON DELETE CASCADE,
    PRIMARY KEY (operation_id, executor_id)
);

CREATE TABLE IF NOT EXISTS deviations (
    id TEXT PRIMARY KEY,
    logged_at TEXT NOT NULL,
    actor TEXT NOT NULL REFERENCES users(id),
    description TEXT NOT NULL,
    kind TEXT NOT NULL,
    operation_id TEXT NOT NULL REFERENCES operations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_operations_order ON operations(order_id);
CREATE INDEX IF NOT EXISTS idx_operations_shop_predict ON operations(shop_id, predict_end);
CREATE INDEX IF NOT EXISTS idx_operations_predict_start ON operations(predict_start);
CREATE INDEX IF NOT EXISTS idx_deviations_logged_at ON deviations(logged_at);
CREATE INDEX IF NOT EXISTS idx_deviations_operation ON deviations(operation_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA synchronous = NORMAL;
"#;
