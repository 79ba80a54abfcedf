pub mod models;
pub mod repository;

use std::str::FromStr;
use std::time::Duration;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Error as SqlxError;

use crate::config::CoreConfig;

/// SQLite 데이터베이스 초기화 및 연결
///
/// 메모리 DB는 연결마다 별도 DB가 되므로 연결 하나를 풀 수명 동안 유지합니다.
pub async fn init_database(config: &CoreConfig) -> Result<SqlitePool, SqlxError> {
    info!("🗄️  SQLite 데이터베이스 초기화 중... ({})", config.database_url);

    let mut options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    let pool_options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        options = options.journal_mode(SqliteJournalMode::Wal);
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = pool_options.connect_with(options).await?;

    // 테이블 생성
    create_tables(&pool).await?;

    info!("✅ 데이터베이스 초기화 완료");

    Ok(pool)
}

/// 필요한 테이블 생성
async fn create_tables(pool: &SqlitePool) -> Result<(), SqlxError> {
    // 사용자 테이블 (잔액은 동행인만 의미 있음)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            phone TEXT NOT NULL UNIQUE,
            nickname TEXT NOT NULL DEFAULT '',
            role INTEGER NOT NULL,
            balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
            created_at TEXT NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 동행 요청 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS demands (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id INTEGER NOT NULL REFERENCES users(id),
            hospital TEXT NOT NULL,
            hospital_addr TEXT NOT NULL,
            service_time TEXT NOT NULL,
            expected_price INTEGER NOT NULL,
            service_content TEXT NOT NULL,
            contact_name TEXT NOT NULL,
            contact_phone TEXT NOT NULL,
            status INTEGER NOT NULL DEFAULT 0,
            order_id INTEGER,
            deleted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 주문 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_no TEXT NOT NULL UNIQUE,
            demand_id INTEGER NOT NULL REFERENCES demands(id),
            patient_id INTEGER NOT NULL REFERENCES users(id),
            companion_id INTEGER NOT NULL REFERENCES users(id),
            order_amount INTEGER NOT NULL,
            companion_income INTEGER NOT NULL,
            status INTEGER NOT NULL DEFAULT 1,
            has_patient_eval INTEGER NOT NULL DEFAULT 0,
            has_companion_eval INTEGER NOT NULL DEFAULT 0,
            cancel_reason TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 잔액 명세 테이블 (추가 전용)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS balance_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            serial_no TEXT NOT NULL UNIQUE,
            companion_id INTEGER NOT NULL REFERENCES users(id),
            kind INTEGER NOT NULL,
            amount INTEGER NOT NULL,
            remark TEXT NOT NULL DEFAULT '',
            ref_order_no TEXT,
            created_at TEXT NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    // 평가 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS evaluations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL REFERENCES orders(id),
            from_user_id INTEGER NOT NULL REFERENCES users(id),
            to_user_id INTEGER NOT NULL REFERENCES users(id),
            score INTEGER NOT NULL CHECK (score BETWEEN 1 AND 5),
            content TEXT NOT NULL,
            img_urls TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            UNIQUE (order_id, from_user_id)
        )"
    )
    .execute(pool)
    .await?;

    // 인덱스 생성
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_demands_patient ON demands(patient_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_demands_status ON demands(status, created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_companion ON orders(companion_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_patient ON orders(patient_id)")
        .execute(pool)
        .await?;

    // 요청당 취소되지 않은 주문은 최대 하나
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_active_demand
         ON orders(demand_id) WHERE status != 5"
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_companion ON balance_records(companion_id, created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evaluations_to_user ON evaluations(to_user_id)")
        .execute(pool)
        .await?;

    info!("📋 테이블 생성 완료");

    Ok(())
}
