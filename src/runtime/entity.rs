//! Mortal entities: the objects whose deaths drive !~ATH control flow.
//!
//! An entity owns a name, a kind, and a one-shot death signal observable by
//! any number of waiters. Death is monotonic and is never delivered
//! synchronously: `die()` marks the entity dying and schedules the signal
//! through the [`Reaper`], which the scheduler drains at the next tick
//! boundary. Composite entities reference their operands without taking
//! ownership.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use uuid::Uuid;

use crate::error::AthError;
use crate::interpreter::value::Value;

use super::host::HostFuture;

/// Unique entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Create a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Operator of a composite entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    /// Dead when every operand is dead.
    And,
    /// Dead when any operand is dead.
    Or,
    /// Dead as soon as the composite is observed (next tick).
    Not,
}

/// What an entity is.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    /// The program entity, `THIS`.
    This,
    /// Dies when its duration elapses.
    Timer { duration_ms: i64 },
    /// Dies when the child process exits.
    Process { argv: Vec<String> },
    /// Dies when the socket closes or errors.
    Connection { host: String, port: i64 },
    /// Dies when the watched path is deleted.
    Watcher { path: String },
    /// Created by `bifurcate`; dies when the branch's code completes.
    Branch,
    /// Synthesized for entity expressions.
    Composite { op: CompositeOp },
}

/// Queue of death signals awaiting delivery. `die()` enqueues here; the
/// scheduler delivers at the start of each tick, which is what makes a
/// death requested on tick *k* observable no earlier than tick *k+1*.
#[derive(Clone, Default)]
pub struct Reaper {
    pending: Rc<RefCell<Vec<(String, Rc<Cell<bool>>)>>>,
}

impl Reaper {
    /// Create an empty reap queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn schedule(&self, name: &str, flag: Rc<Cell<bool>>) {
        self.pending.borrow_mut().push((name.to_string(), flag));
    }

    /// Whether any death signal is waiting for delivery.
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Deliver every queued death signal. Returns how many were delivered.
    pub fn deliver(&self) -> usize {
        let drained: Vec<_> = self.pending.borrow_mut().drain(..).collect();
        for (name, flag) in &drained {
            tracing::debug!(entity = %name, "death signal delivered");
            flag.set(true);
        }
        drained.len()
    }
}

/// A mortal object.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    name: String,
    kind: EntityKind,
    /// Set by `die()`; resources are released once this flips.
    dying: Cell<bool>,
    /// The observable death signal, shared with waiters.
    dead: Rc<Cell<bool>>,
    reaper: ReaperHandle,
    /// Module exports for `.~ATH` watcher imports.
    exports: RefCell<HashMap<String, Value>>,
    is_module: Cell<bool>,
}

// Reaper is cloneable but Entity only needs scheduling; a thin alias keeps
// the Debug derive quiet about the queue contents.
#[derive(Clone)]
struct ReaperHandle(Reaper);

impl std::fmt::Debug for ReaperHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Reaper")
    }
}

impl Entity {
    /// Create an entity registered against the given reap queue.
    pub fn new(name: impl Into<String>, kind: EntityKind, reaper: Reaper) -> Rc<Entity> {
        Rc::new(Entity {
            id: EntityId::new(),
            name: name.into(),
            kind,
            dying: Cell::new(false),
            dead: Rc::new(Cell::new(false)),
            reaper: ReaperHandle(reaper),
            exports: RefCell::new(HashMap::new()),
            is_module: Cell::new(false),
        })
    }

    /// Unique id of this entity.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Name the entity was imported or bifurcated under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entity's kind.
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// True until `die()` is called.
    pub fn is_alive(&self) -> bool {
        !self.dying.get()
    }

    /// True once the death signal has been delivered by the scheduler.
    pub fn is_dead(&self) -> bool {
        self.dead.get()
    }

    /// Request death. Idempotent; the observable signal fires on the next
    /// scheduler tick, and the entity's lifecycle task releases any owned
    /// host resource when it observes the request.
    pub fn die(&self) {
        if self.dying.replace(true) {
            return;
        }
        self.reaper.0.schedule(&self.name, Rc::clone(&self.dead));
    }

    /// Branch completion is death.
    pub fn complete(&self) {
        self.die();
    }

    /// Future resolving when the death signal fires.
    pub fn death(&self) -> DeathFuture {
        DeathFuture {
            flag: Rc::clone(&self.dead),
        }
    }

    /// Install module exports after a `.~ATH` watcher import ran its file.
    pub fn set_exports(&self, bindings: Vec<(String, Value)>) {
        self.exports.borrow_mut().extend(bindings);
        self.is_module.set(true);
    }

    /// Whether this watcher entity was loaded as a module.
    pub fn is_module(&self) -> bool {
        self.is_module.get()
    }

    /// Look up a module export.
    pub fn export(&self, name: &str) -> Option<Value> {
        self.exports.borrow().get(name).cloned()
    }
}

/// One-shot death signal future. Any number of these may exist per entity;
/// all resume once the signal fires.
pub struct DeathFuture {
    flag: Rc<Cell<bool>>,
}

impl Future for DeathFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.flag.get() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Lifecycle task for an entity backed by a host resource (timer, process,
/// connection, watcher): the entity dies when the resource future resolves,
/// and an early `die()` ends the task, dropping the resource exactly once.
pub fn resource_lifecycle(
    entity: Rc<Entity>,
    mut resource: HostFuture,
) -> impl Future<Output = Result<(), AthError>> {
    std::future::poll_fn(move |cx| {
        if !entity.is_alive() {
            return Poll::Ready(Ok(()));
        }
        match resource.as_mut().poll(cx) {
            Poll::Ready(outcome) => {
                if let Err(err) = outcome {
                    tracing::debug!(entity = %entity.name(), error = %err, "resource ended with error");
                }
                entity.die();
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    })
}

/// Lifecycle task for a composite entity: watches operand death signals and
/// dies when the operator's condition holds. `Not` dies on its first poll.
pub fn composite_lifecycle(
    entity: Rc<Entity>,
    op: CompositeOp,
    operands: Vec<Rc<Entity>>,
) -> impl Future<Output = Result<(), AthError>> {
    std::future::poll_fn(move |_| {
        if !entity.is_alive() {
            return Poll::Ready(Ok(()));
        }
        let satisfied = match op {
            CompositeOp::And => operands.iter().all(|e| e.is_dead()),
            CompositeOp::Or => operands.iter().any(|e| e.is_dead()),
            CompositeOp::Not => true,
        };
        if satisfied {
            entity.die();
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::Waker;

    fn poll_death(fut: &mut DeathFuture) -> Poll<()> {
        let mut cx = Context::from_waker(Waker::noop());
        Pin::new(fut).poll(&mut cx)
    }

    #[test]
    fn death_is_delivered_through_the_reaper() {
        let reaper = Reaper::new();
        let entity = Entity::new("T", EntityKind::This, reaper.clone());
        let mut waiter = entity.death();

        entity.die();
        assert!(!entity.is_alive());
        assert!(!entity.is_dead(), "signal must not fire synchronously");
        assert_eq!(poll_death(&mut waiter), Poll::Pending);

        assert_eq!(reaper.deliver(), 1);
        assert!(entity.is_dead());
        assert_eq!(poll_death(&mut waiter), Poll::Ready(()));
    }

    #[test]
    fn die_is_idempotent() {
        let reaper = Reaper::new();
        let entity = Entity::new("T", EntityKind::This, reaper.clone());
        entity.die();
        entity.die();
        entity.die();
        assert_eq!(reaper.deliver(), 1);
        assert_eq!(reaper.deliver(), 0);
    }

    #[test]
    fn death_is_monotonic() {
        let reaper = Reaper::new();
        let entity = Entity::new("T", EntityKind::This, reaper.clone());
        entity.die();
        reaper.deliver();
        assert!(entity.is_dead());
        // A second request changes nothing.
        entity.die();
        reaper.deliver();
        assert!(entity.is_dead());
    }

    #[test]
    fn multiple_waiters_all_resume() {
        let reaper = Reaper::new();
        let entity = Entity::new("T", EntityKind::This, reaper.clone());
        let mut a = entity.death();
        let mut b = entity.death();
        entity.die();
        reaper.deliver();
        assert_eq!(poll_death(&mut a), Poll::Ready(()));
        assert_eq!(poll_death(&mut b), Poll::Ready(()));
    }

    #[test]
    fn entity_ids_are_distinct() {
        let reaper = Reaper::new();
        let a = Entity::new("X", EntityKind::This, reaper.clone());
        let b = Entity::new("X", EntityKind::This, reaper);
        assert_ne!(a.id(), b.id());
    }
}
