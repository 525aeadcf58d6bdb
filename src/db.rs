use sea_orm::{DatabaseConnection, SqlxSqliteConnector};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

pub async fn init_pool(db_path: &str) -> Result<DatabaseConnection, sqlx::Error> {
    let abs_path = std::fs::canonicalize(db_path)
        .unwrap_or_else(|_| std::path::PathBuf::from(db_path));
    tracing::info!("Database absolute path: {:?}", abs_path);

    // Ensure parent directory exists
    if let Some(parent) = Path::new(db_path).parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let url = format!("sqlite:{}?mode=rwc", db_path);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    run_migrations(&pool).await?;

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    if let Err(e) = sqlx::migrate!("./migrations").run(pool).await {
        tracing::error!("Database migration failed: {}", e);
        return Err(e.into());
    }

    tracing::info!("Database migrations applied successfully");
    Ok(())
}

/// Single-connection in-memory database with migrations applied.
///
/// The connection is never recycled, otherwise SQLite would drop the schema.
#[cfg(test)]
pub async fn memory() -> DatabaseConnection {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    run_migrations(&pool).await.expect("Migrations failed");

    SqlxSqliteConnector::from_sqlx_sqlite_pool(pool)
}
