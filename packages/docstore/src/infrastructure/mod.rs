//! Infrastructure layer - Storage adapters
//!
//! - `JsonFileStore`: Embedded-File (one JSON file per collection)
//! - `SqliteDocumentStore`: Embedded-Relational (feature `sqlite`)
//! - `RemoteStore`: Remote-Replicated over a `RemoteClient`
//!   (`PostgresClient` behind feature `postgres`, `InMemoryRemoteClient`)

pub mod file_store;
pub mod remote;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use file_store::JsonFileStore;
pub use remote::{apply_tls_fix, InMemoryRemoteClient, RemoteClient, RemoteStore};
#[cfg(feature = "postgres")]
pub use remote::{PostgresClient, CONNECT_TIMEOUT};
#[cfg(feature = "sqlite")]
pub use sqlite_store::{SqliteDocumentStore, SQLITE_FILE_NAME};
