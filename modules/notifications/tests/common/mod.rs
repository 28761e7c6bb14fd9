use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect to the test database, or return None so the caller can skip
/// when no database is available (CI without Postgres).
pub async fn try_pool() -> Option<PgPool> {
    dotenvy::dotenv().ok();

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping database-backed test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./db/migrations")
        .set_ignore_missing(true)
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

/// Fresh tenant id per test so runs never interfere.
pub fn test_tenant() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("ten_{}", &token[..8])
}
