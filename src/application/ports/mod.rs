pub mod conflict_log;
pub mod connectivity;
pub mod entity_store;
pub mod event_sink;
pub mod remote_backend;
pub mod sync_queue;

pub use conflict_log::ConflictLog;
pub use connectivity::ConnectivityProbe;
pub use entity_store::EntityStore;
pub use event_sink::SyncEventSink;
pub use remote_backend::{PushError, PushOutcome, RemoteBackend, RemoteConflict};
pub use sync_queue::SyncQueue;
