use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[tracing::instrument(name = "Initialize database pool")]
pub async fn init_db() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    sqlx::migrate!().run(&pool).await?;

    tracing::info!("Database pool initialized");
    Ok(pool)
}
