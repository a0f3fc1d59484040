use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Build the Postgres pool. Checkout waits are bounded so a stuck database
/// surfaces as an error instead of blocking a handler forever.
pub fn create_pool(database_url: &str, max_size: u32) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_size)
        .min_idle(Some(2))
        .connection_timeout(Duration::from_secs(5))
        .test_on_check_out(true)
        .build(manager)?;

    tracing::info!(max_size = max_size, "database connection pool created");
    Ok(pool)
}
