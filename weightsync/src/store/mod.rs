pub mod backends;
mod connection;
pub(crate) mod schema;
mod snapshots;
pub mod traits;

pub use backends::libsql::LibSqlStore;
pub use backends::memory::MemoryStore;
pub use connection::Database;
pub use snapshots::SnapshotRepository;
pub use traits::*;
