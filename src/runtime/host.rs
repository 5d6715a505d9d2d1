//! Host adapter: the narrow interface the core consumes for output, input,
//! files, timers, processes, connections, and path watching.
//!
//! Two implementations ship with the crate. [`SystemHost`] binds the real
//! machine. [`SimHost`] runs on a virtual clock with captured output and an
//! in-memory file table; the test suite runs every timed program on it.
//! A host may decline any optional operation with
//! [`HostError::Unsupported`]; the corresponding `import` or built-in then
//! fails at evaluation with a clear message.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::future::Future;
use std::io::{BufRead, Read};
use std::pin::Pin;
use std::rc::Rc;
use std::task::Poll;

use crate::error::HostError;

/// Future handed back by host operations; resolves when the external
/// condition completes. Polled by the scheduler with a no-op waker, so
/// implementations are plain state checks.
pub type HostFuture = Pin<Box<dyn Future<Output = Result<(), HostError>>>>;

/// Operations the interpreter core requires from its embedding.
pub trait Host {
    /// Emit one line of program output (no trailing newline in `line`).
    fn output(&self, line: &str);

    /// Next queued input line, without its newline. `None` when input is
    /// unavailable or exhausted.
    fn read_line(&self) -> Option<String> {
        None
    }

    /// Read a file, or the whole standard input when `path` is `None`.
    fn scry(&self, _path: Option<&str>) -> Result<String, HostError> {
        Err(HostError::Unsupported("scry"))
    }

    /// Write `content` to `path`.
    fn inscribe(&self, _path: &str, _content: &str) -> Result<(), HostError> {
        Err(HostError::Unsupported("inscribe"))
    }

    /// Future that resolves once `duration_ms` milliseconds have elapsed.
    fn spawn_timer(&self, duration_ms: i64) -> HostFuture;

    /// Future that resolves when the spawned child process exits.
    fn spawn_process(&self, _argv: &[String]) -> Result<HostFuture, HostError> {
        Err(HostError::Unsupported("process entities"))
    }

    /// Future that resolves when the connection closes or errors.
    fn open_connection(&self, _host: &str, _port: i64) -> Result<HostFuture, HostError> {
        Err(HostError::Unsupported("connection entities"))
    }

    /// Future that resolves when the path is deleted, or immediately if the
    /// path did not exist at the time of the call.
    fn watch_path(&self, _path: &str) -> Result<HostFuture, HostError> {
        Err(HostError::Unsupported("watcher entities"))
    }

    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Uniform float in `[0, 1)`.
    fn random(&self) -> f64;

    /// Block until external progress is possible: the scheduler calls this
    /// when every task is suspended. Hosts sleep to their earliest timer
    /// deadline (or nap briefly when other external events are pending), so
    /// a deadlocked program parks forever rather than spinning.
    fn park(&self);
}

fn poll_until(mut ready: impl FnMut() -> bool + 'static) -> HostFuture {
    Box::pin(std::future::poll_fn(move |_| {
        if ready() {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }))
}

// ============ SystemHost ============

/// Host bound to the real machine: wall clock, stdout/stdin, `std::fs`,
/// subprocess exit polling, and path watching by metadata polling.
/// `open_connection` is unsupported, which is a valid deployment.
#[derive(Default)]
pub struct SystemHost {
    deadlines: RefCell<BinaryHeap<Reverse<i64>>>,
}

impl SystemHost {
    /// Create a system host.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Host for SystemHost {
    fn output(&self, line: &str) {
        println!("{}", line);
    }

    fn read_line(&self) -> Option<String> {
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Some(line)
            }
        }
    }

    fn scry(&self, path: Option<&str>) -> Result<String, HostError> {
        match path {
            Some(path) => std::fs::read_to_string(path).map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    HostError::Io(format!("File not found: {}", path))
                } else {
                    HostError::Io(format!("Cannot read file: {}", err))
                }
            }),
            None => {
                let mut text = String::new();
                std::io::stdin()
                    .read_to_string(&mut text)
                    .map_err(|err| HostError::Io(format!("Cannot read stdin: {}", err)))?;
                Ok(text)
            }
        }
    }

    fn inscribe(&self, path: &str, content: &str) -> Result<(), HostError> {
        std::fs::write(path, content)
            .map_err(|err| HostError::Io(format!("Cannot write file: {}", err)))
    }

    fn spawn_timer(&self, duration_ms: i64) -> HostFuture {
        let deadline = self.now_ms() + duration_ms;
        self.deadlines.borrow_mut().push(Reverse(deadline));
        poll_until(move || chrono::Utc::now().timestamp_millis() >= deadline)
    }

    fn spawn_process(&self, argv: &[String]) -> Result<HostFuture, HostError> {
        let (command, args) = argv
            .split_first()
            .ok_or_else(|| HostError::Io("process requires a command".to_string()))?;
        let child = std::process::Command::new(command)
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|err| HostError::Io(format!("Cannot spawn process: {}", err)))?;
        Ok(Box::pin(ProcessExit { child: Some(child) }))
    }

    fn watch_path(&self, path: &str) -> Result<HostFuture, HostError> {
        let path = path.to_string();
        Ok(poll_until(move || !std::path::Path::new(&path).exists()))
    }

    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn random(&self) -> f64 {
        rand::random::<f64>()
    }

    fn park(&self) {
        let now = self.now_ms();
        let mut deadlines = self.deadlines.borrow_mut();
        while matches!(deadlines.peek(), Some(Reverse(d)) if *d <= now) {
            deadlines.pop();
        }
        // Nap briefly even with no timer pending: processes and watched
        // paths change without notice, and a deadlocked program should hang
        // without spinning a core.
        let wait = deadlines
            .peek()
            .map(|Reverse(d)| (*d - now).clamp(1, 50))
            .unwrap_or(10);
        drop(deadlines);
        std::thread::sleep(std::time::Duration::from_millis(wait as u64));
    }
}

/// Resolves when the child exits. Dropping the future before exit kills and
/// reaps the child, so an early entity death releases the process.
struct ProcessExit {
    child: Option<std::process::Child>,
}

impl Future for ProcessExit {
    type Output = Result<(), HostError>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        let Some(child) = self.child.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        match child.try_wait() {
            Ok(Some(_status)) => {
                self.child = None;
                Poll::Ready(Ok(()))
            }
            Ok(None) => Poll::Pending,
            Err(err) => {
                self.child = None;
                Poll::Ready(Err(HostError::Io(format!("Cannot wait on process: {}", err))))
            }
        }
    }
}

impl Drop for ProcessExit {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

// ============ SimHost ============

/// Deterministic host on a virtual clock. `park` jumps the clock to the
/// earliest pending timer deadline, so timed programs complete instantly;
/// output is captured per `output` call; scry/inscribe/watch run against an
/// in-memory file table; randomness is a seeded xorshift generator.
pub struct SimHost {
    clock: Rc<Cell<i64>>,
    deadlines: Rc<RefCell<BinaryHeap<Reverse<i64>>>>,
    output: Rc<RefCell<Vec<String>>>,
    input: RefCell<VecDeque<String>>,
    files: Rc<RefCell<HashMap<String, String>>>,
    rng: Cell<u64>,
}

impl SimHost {
    /// Create a simulated host with the clock at zero.
    pub fn new() -> Self {
        Self::with_seed(0x5EED_CAFE)
    }

    /// Create a simulated host with a specific random seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Rc::new(Cell::new(0)),
            deadlines: Rc::new(RefCell::new(BinaryHeap::new())),
            output: Rc::new(RefCell::new(Vec::new())),
            input: RefCell::new(VecDeque::new()),
            files: Rc::new(RefCell::new(HashMap::new())),
            rng: Cell::new(seed | 1),
        }
    }

    /// Lines emitted through `output`, in order.
    pub fn captured_output(&self) -> Vec<String> {
        self.output.borrow().clone()
    }

    /// Queue a line for `read_line`/`HEED`.
    pub fn push_input(&self, line: impl Into<String>) {
        self.input.borrow_mut().push_back(line.into());
    }

    /// Create or overwrite a file in the in-memory table.
    pub fn write_file(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files.borrow_mut().insert(path.into(), content.into());
    }

    /// Delete a file from the in-memory table; pending watchers on the path
    /// observe the deletion.
    pub fn remove_file(&self, path: &str) {
        self.files.borrow_mut().remove(path);
    }

    /// Content of an in-memory file, if present.
    pub fn file(&self, path: &str) -> Option<String> {
        self.files.borrow().get(path).cloned()
    }

    /// Current virtual time in milliseconds.
    pub fn clock_ms(&self) -> i64 {
        self.clock.get()
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SimHost {
    fn output(&self, line: &str) {
        self.output.borrow_mut().push(line.to_string());
    }

    fn read_line(&self) -> Option<String> {
        self.input.borrow_mut().pop_front()
    }

    fn scry(&self, path: Option<&str>) -> Result<String, HostError> {
        match path {
            Some(path) => self
                .files
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| HostError::Io(format!("File not found: {}", path))),
            None => Ok(self.input.borrow_mut().drain(..).collect::<Vec<_>>().join("\n")),
        }
    }

    fn inscribe(&self, path: &str, content: &str) -> Result<(), HostError> {
        self.files
            .borrow_mut()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    fn spawn_timer(&self, duration_ms: i64) -> HostFuture {
        let deadline = self.clock.get() + duration_ms;
        self.deadlines.borrow_mut().push(Reverse(deadline));
        let clock = Rc::clone(&self.clock);
        poll_until(move || clock.get() >= deadline)
    }

    fn watch_path(&self, path: &str) -> Result<HostFuture, HostError> {
        let files = Rc::clone(&self.files);
        let path = path.to_string();
        Ok(poll_until(move || !files.borrow().contains_key(&path)))
    }

    fn now_ms(&self) -> i64 {
        self.clock.get()
    }

    fn random(&self) -> f64 {
        // xorshift64* step; high 53 bits make the mantissa.
        let mut x = self.rng.get();
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng.set(x);
        let mixed = x.wrapping_mul(0x2545_F491_4F6C_DD1D);
        (mixed >> 11) as f64 / (1u64 << 53) as f64
    }

    fn park(&self) {
        let now = self.clock.get();
        let mut deadlines = self.deadlines.borrow_mut();
        while matches!(deadlines.peek(), Some(Reverse(d)) if *d <= now) {
            deadlines.pop();
        }
        match deadlines.peek() {
            Some(Reverse(deadline)) => self.clock.set(*deadline),
            None => panic!(
                "simulated deadlock: every task is suspended and no timer is pending"
            ),
        }
    }
}
