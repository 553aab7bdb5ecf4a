//! Database layer - connection pool, migrations and repositories
//!
//! - Connection pool shared by every handler, no Arc<Mutex<Connection>>
//! - List operations return the total with `COUNT(*) OVER()` in the same query
//! - Rely on DB constraints and map conflicts, no check-then-insert for uniqueness
//! - Transactions for multi-step operations (imports, auto-match)

pub mod migrate;
pub mod pool;
pub mod repos;

pub use pool::{connect, create_pool, create_pool_with_options, ping};
pub use sqlx::PgPool;
pub use repos::*;
