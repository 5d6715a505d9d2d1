//! Single-threaded cooperative scheduler.
//!
//! Maintains a task list of boxed futures polled once per tick with a no-op
//! waker; suspended tasks simply report `Pending` and are re-polled next
//! tick. Death signals queued during a tick are delivered at the start of
//! the next, and tasks spawned mid-tick join the worklist immediately so a
//! freshly spawned branch reaches its first suspension before its parent
//! resumes. When a tick makes no progress the scheduler parks on the host.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::AthError;

use super::entity::Reaper;
use super::host::Host;

/// Boxed task future. Tasks resolve to `Ok` or to the error that escaped
/// them; a non-main task's error marks the whole program as failing.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), AthError>>>>;

/// A schedulable unit: a labelled future.
pub struct Task {
    label: String,
    future: TaskFuture,
    is_main: bool,
}

impl Task {
    /// Wrap a future as a task.
    pub fn new(
        label: impl Into<String>,
        future: impl Future<Output = Result<(), AthError>> + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            future: Box::pin(future),
            is_main: false,
        }
    }
}

/// Cloneable handle through which running tasks spawn further tasks.
#[derive(Clone, Default)]
pub struct SchedHandle {
    spawned: Rc<RefCell<Vec<Task>>>,
    tick: Rc<Cell<u64>>,
}

impl SchedHandle {
    /// Create a fresh handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task; it is polled for the first time within the current
    /// tick (or the next one if the scheduler is idle).
    pub fn spawn(&self, task: Task) {
        self.spawned.borrow_mut().push(task);
    }

    /// Current tick number, monotonically increasing from zero.
    pub fn current_tick(&self) -> u64 {
        self.tick.get()
    }

    fn take_spawned(&self) -> Vec<Task> {
        std::mem::take(&mut *self.spawned.borrow_mut())
    }

    fn has_spawned(&self) -> bool {
        !self.spawned.borrow().is_empty()
    }
}

struct TickReport {
    progressed: bool,
    main_result: Option<Result<(), AthError>>,
}

/// The scheduler proper: owns the task list and drives the tick loop.
pub struct Scheduler {
    handle: SchedHandle,
    reaper: Reaper,
    tasks: Vec<Task>,
    task_errors: Vec<AthError>,
}

impl Scheduler {
    /// Create a scheduler over the given spawn handle and reap queue.
    pub fn new(handle: SchedHandle, reaper: Reaper) -> Self {
        Self {
            handle,
            reaper,
            tasks: Vec::new(),
            task_errors: Vec::new(),
        }
    }

    /// Run `main` to completion, then invoke `cleanup` (which releases the
    /// entity table) and drain every remaining task. Returns main's error,
    /// or the first error any other task died with, or `Ok`.
    pub fn run(
        &mut self,
        host: &dyn Host,
        main: Task,
        cleanup: impl FnOnce(),
    ) -> Result<(), AthError> {
        let mut main = main;
        main.is_main = true;
        self.tasks.push(main);

        let mut main_result: Option<Result<(), AthError>> = None;
        let mut cleanup = Some(cleanup);

        loop {
            let report = self.tick();
            if report.main_result.is_some() {
                main_result = report.main_result;
            }

            if main_result.is_some() {
                if let Some(cleanup) = cleanup.take() {
                    tracing::debug!("top-level stream exhausted; releasing entities");
                    cleanup();
                    continue;
                }
            }

            if self.tasks.is_empty() && !self.handle.has_spawned() {
                break;
            }
            if !report.progressed {
                host.park();
            }
        }

        // Flush signals queued by the final completions; no waiters remain.
        self.reaper.deliver();

        match main_result {
            Some(Err(err)) => Err(err),
            _ => match self.task_errors.first() {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            },
        }
    }

    fn tick(&mut self) -> TickReport {
        self.handle.tick.set(self.handle.tick.get() + 1);
        let mut report = TickReport {
            progressed: false,
            main_result: None,
        };

        if self.reaper.deliver() > 0 {
            report.progressed = true;
        }

        let mut still_pending = Vec::new();
        let mut worklist: VecDeque<Task> = self.tasks.drain(..).collect();
        loop {
            let spawned = self.handle.take_spawned();
            if !spawned.is_empty() {
                report.progressed = true;
                worklist.extend(spawned);
            }
            let Some(mut task) = worklist.pop_front() else {
                break;
            };

            let mut cx = Context::from_waker(Waker::noop());
            match task.future.as_mut().poll(&mut cx) {
                Poll::Ready(result) => {
                    report.progressed = true;
                    if task.is_main {
                        report.main_result = Some(result);
                    } else if let Err(err) = result {
                        tracing::debug!(task = %task.label, error = %err, "task failed");
                        self.task_errors.push(err);
                    }
                }
                Poll::Pending => still_pending.push(task),
            }
        }
        self.tasks = still_pending;

        // Deaths requested during this tick are delivered next tick; the
        // program is still moving, so don't park over them.
        if !self.reaper.is_empty() {
            report.progressed = true;
        }

        report
    }
}

/// Suspend for exactly one scheduler tick.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            Poll::Pending
        }
    }
}
