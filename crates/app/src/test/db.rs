//! Database test utilities.
//!
//! A single PostgreSQL container starts once per test binary; every test
//! gets its own freshly migrated database inside it, so state never leaks
//! between tests.

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use once_cell::sync::Lazy;
use sqlx::{Connection, PgConnection, PgPool, query};
use tokio::sync::OnceCell;
use uuid::Uuid;

use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres as PostgresImage;

use veritag::ids::{BatchUuid, ProductUuid, TagUuid};

const DB_USER: &str = "veritag_test";
const DB_PASSWORD: &str = "veritag_test_password";

static POSTGRES_CONTAINER: Lazy<OnceCell<ContainerAsync<PostgresImage>>> =
    Lazy::new(OnceCell::new);

async fn container() -> &'static ContainerAsync<PostgresImage> {
    POSTGRES_CONTAINER
        .get_or_init(|| async {
            PostgresImage::default()
                .with_user(DB_USER)
                .with_password(DB_PASSWORD)
                .with_db_name("veritag_test")
                .with_env_var("POSTGRES_INITDB_ARGS", "--auth-host=trust")
                .start()
                .await
                .expect("Failed to start PostgreSQL container")
        })
        .await
}

pub(crate) struct TestDb {
    pool: PgPool,
}

impl TestDb {
    /// Create an isolated, migrated test database with a unique name.
    pub(crate) async fn new() -> Self {
        let container = container().await;

        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get container port");

        let host = std::env::var("TESTCONTAINERS_HOST_OVERRIDE")
            .unwrap_or_else(|_| "localhost".to_string());

        let name = format!("veritag_test_{}", Uuid::new_v4().simple());

        let admin_url = format!("postgresql://{DB_USER}:{DB_PASSWORD}@{host}:{port}/postgres");

        let mut conn = PgConnection::connect(&admin_url)
            .await
            .expect("Failed to connect to postgres database");

        query(&format!("CREATE DATABASE \"{name}\""))
            .execute(&mut conn)
            .await
            .expect("Failed to create test database");

        conn.close().await.expect("Failed to close admin connection");

        let database_url = format!("postgresql://{DB_USER}:{DB_PASSWORD}@{host}:{port}/{name}");

        let pool = PgPool::connect(&database_url)
            .await
            .expect("Failed to create pool for test database");

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations on test database");

        Self { pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Seed a scan row.
    pub(crate) async fn insert_scan(
        &self,
        tag_id: TagUuid,
        scan_count: i64,
        first_scan_at: Option<Timestamp>,
    ) {
        query(
            "INSERT INTO scans (tag_id, product_id, batch_id, first_scan_at, scan_count, valid) \
             VALUES ($1, $2, $3, $4, $5, TRUE)",
        )
        .bind(tag_id.into_uuid())
        .bind(ProductUuid::new().into_uuid())
        .bind(BatchUuid::new().into_uuid())
        .bind(first_scan_at.map(SqlxTimestamp::from))
        .bind(scan_count)
        .execute(&self.pool)
        .await
        .expect("Failed to insert scan row");
    }
}
