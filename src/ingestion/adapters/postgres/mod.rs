//! `PostgreSQL` adapters for the webhook event stream and dead letters.

mod dead_letter;
mod models;
mod schema;
mod stream;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub use dead_letter::PostgresDeadLetterStore;
pub use stream::PostgresEventStream;

/// `PostgreSQL` connection pool type for ingestion adapters.
pub type EventPgPool = Pool<ConnectionManager<PgConnection>>;
