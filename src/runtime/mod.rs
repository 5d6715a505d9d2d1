//! Entity runtime: mortal objects, the cooperative scheduler that delivers
//! their death signals, and the host adapter the runtime leans on for
//! timers, I/O, and external resources.

/// Mortal entities and their lifecycles.
pub mod entity;
/// Host adapter trait and the shipped hosts.
pub mod host;
/// Cooperative tick scheduler.
pub mod scheduler;

pub use entity::{CompositeOp, Entity, EntityId, EntityKind, Reaper};
pub use host::{Host, HostFuture, SimHost, SystemHost};
pub use scheduler::{yield_now, SchedHandle, Scheduler, Task};
