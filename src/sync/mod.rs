pub mod reconcile;
pub mod scheduler;

pub use reconcile::{merge_remote, ReconcileReport, ReconciliationEngine, RemotePull};
pub use scheduler::{ChannelSnapshot, SyncScheduler};
