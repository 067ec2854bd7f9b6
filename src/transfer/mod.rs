//! Moving mined funds out of the mining wallet
//!
//! [`TransferPolicy`] decides how much may leave, [`ExecutionGuard`] keeps
//! evaluations single-flight and [`TransferEngine`] drives both on a timer.

pub mod engine;
pub mod guard;
pub mod policy;

pub use engine::{describe_interval, TickOutcome, TransferEngine};
pub use guard::{ExecutionGuard, GuardPermit};
pub use policy::{round_amount, TransferMode, TransferPolicy};
