//! Mining wallet housekeeping
//!
//! ```text
//! AddressReconciler ─┐
//!                    ├─> MiningSupervisor (every reconcile_interval)
//! SyncGate ──────────┘
//! ```

pub mod reconciler;
pub mod supervisor;
pub mod sync_gate;

pub use reconciler::{has_same_addresses, AddressReconciler, ReconcileOutcome};
pub use supervisor::MiningSupervisor;
pub use sync_gate::{is_synced, SyncGate, SyncOutcome};
