//! Service layer for stream-service
//!
//! - `lifecycle`: state machine, provider orchestration, reads
//! - `targets`: multistream destination authorization
//! - `reconciler`: background repair of unresolved intents

pub mod lifecycle;
pub mod reconciler;
pub mod targets;

pub use lifecycle::{Actor, EventOutcome, LifecycleService, ProviderEvent};
pub use reconciler::{ReconcileReport, Reconciler};
pub use targets::TargetManager;
