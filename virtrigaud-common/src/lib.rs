//! # VirtRigaud Common
//!
//! Shared primitives used across the control plane: logging initialization,
//! condition bookkeeping, exponential backoff, resource-quantity arithmetic
//! and snapshot schedules.

pub mod backoff;
pub mod conditions;
pub mod logging;
pub mod quantity;
pub mod schedule;

pub use backoff::Backoff;
pub use conditions::{Condition, ConditionStatus};
pub use logging::{init_logging, init_logging_json};
pub use quantity::{format_bytes, parse_quantity, QuantityError};
pub use schedule::{Schedule, ScheduleError};
