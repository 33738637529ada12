mod from_row;
pub mod queries;
mod schema;

pub use schema::init_db;

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::activation::ActivationService;

pub type DbPool = Pool<SqliteConnectionManager>;

/// How long a connection waits on a locked database before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// License store pool
    pub db: DbPool,
    /// Code minting and verification
    pub activation: ActivationService,
    /// Static key for admin endpoints (`None` rejects every admin request)
    pub admin_api_key: Option<String>,
    /// Shared secret for purchase webhook signatures (`None` accepts all)
    pub webhook_secret: Option<String>,
    /// Product name shown on the service info endpoint and in emails
    pub app_name: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
    });
    Pool::builder().max_size(10).build(manager)
}
