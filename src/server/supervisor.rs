// Master process for the territory server
// Keeps a fixed number of worker processes alive under a bounded restart policy

//! # Supervisor
//!
//! The master never serves requests. It launches `workers` worker processes,
//! tallies their lifecycle events and replaces the ones that die.
//!
//! ```text
//!            launch            Online          Listening (all N)
//! Supervisor ──────> worker ──────────> log ──────────────────> banner
//!     ^                │
//!     │   backoff      │ Exited
//!     └─── RestartTracker <┘  (gives up after max_restarts per window)
//! ```
//!
//! How a worker is started is behind [`WorkerLauncher`]: [`ProcessLauncher`]
//! re-executes a binary, tests plug in an in-process fake.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::server::worker::{parse_ready_line, WORKER_SLOT_ENV};
use crate::{Result, TerritoryError};

/// How long stopped workers get to exit before the master stops waiting
const STOP_GRACE: Duration = Duration::from_secs(15);

/// How long a worker may drain after SIGTERM before it is killed
const TERM_GRACE: Duration = Duration::from_secs(12);

/// Bounds on how often dead workers are replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Restarts allowed across all slots within one `window`
    pub max_restarts: usize,
    /// Sliding window for `max_restarts`; a worker that stayed up this long
    /// also gets its backoff reset
    pub window: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            max_restarts: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    /// Delay before restart number `attempt` (0-based) of the same slot
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Restart { delay: Duration },
    GiveUp { restarts_in_window: usize },
}

/// Applies a [`RestartPolicy`] to a stream of worker exits
#[derive(Debug)]
pub struct RestartTracker {
    policy: RestartPolicy,
    recent: VecDeque<Instant>,
    streaks: HashMap<usize, u32>,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            recent: VecDeque::new(),
            streaks: HashMap::new(),
        }
    }

    /// Decide what to do about the worker in `slot` that exited at `now`
    /// after running for `uptime`
    pub fn record_exit(&mut self, slot: usize, uptime: Duration, now: Instant) -> RestartDecision {
        while let Some(&oldest) = self.recent.front() {
            if now.duration_since(oldest) >= self.policy.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        if self.recent.len() >= self.policy.max_restarts {
            return RestartDecision::GiveUp {
                restarts_in_window: self.recent.len(),
            };
        }
        self.recent.push_back(now);

        let streak = self.streaks.entry(slot).or_insert(0);
        if uptime >= self.policy.window {
            *streak = 0;
        }
        let delay = self.policy.backoff(*streak);
        *streak = streak.saturating_add(1);

        RestartDecision::Restart { delay }
    }
}

/// Lifecycle notifications sent by launched workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Online { slot: usize, pid: u32 },
    Listening { slot: usize, pid: u32, address: String },
    Exited { slot: usize, pid: u32, status: String },
}

/// The master's grip on one launched worker
///
/// Dropping the handle stops the worker as well.
#[derive(Debug)]
pub struct WorkerHandle {
    pub pid: u32,
    stop: Option<oneshot::Sender<()>>,
}

impl WorkerHandle {
    pub fn new(pid: u32, stop: oneshot::Sender<()>) -> Self {
        Self {
            pid,
            stop: Some(stop),
        }
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Starts worker processes
///
/// Every successful launch must be followed, eventually, by exactly one
/// [`WorkerEvent::Exited`] for the returned pid.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(
        &self,
        slot: usize,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<WorkerHandle>;
}

/// Launches workers as child processes of the master
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    term_grace: Duration,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            term_grace: TERM_GRACE,
        }
    }

    /// Re-execute the running binary
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.envs
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// How long a stopped worker may drain before it is killed
    pub fn with_term_grace(mut self, grace: Duration) -> Self {
        self.term_grace = grace;
        self
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        slot: usize,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<WorkerHandle> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(WORKER_SLOT_ENV, slot.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TerritoryError::Internal(format!(
                    "cannot start worker {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let pid = child.id().unwrap_or_default();
        let lines = child.stdout.take().map(|out| BufReader::new(out).lines());
        let (stop_tx, stop_rx) = oneshot::channel();

        let _ = events.send(WorkerEvent::Online { slot, pid });
        tokio::spawn(watch_child(
            slot,
            pid,
            child,
            lines,
            stop_rx,
            self.term_grace,
            events,
        ));

        Ok(WorkerHandle::new(pid, stop_tx))
    }
}

// Relay a child's readiness line and exit status to the master
async fn watch_child(
    slot: usize,
    pid: u32,
    mut child: Child,
    mut lines: Option<Lines<BufReader<ChildStdout>>>,
    mut stop: oneshot::Receiver<()>,
    term_grace: Duration,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = &mut stop => break terminate(pid, &mut child, term_grace).await,
            line = next_line(&mut lines) => match line {
                Ok(Some(line)) => match parse_ready_line(&line) {
                    Some(address) => {
                        let _ = events.send(WorkerEvent::Listening {
                            slot,
                            pid,
                            address: address.to_string(),
                        });
                    }
                    None => debug!("worker {}: {}", pid, line),
                },
                Ok(None) | Err(_) => lines = None,
            },
        }
    };

    let status = match status {
        Ok(status) => status.to_string(),
        Err(e) => format!("unknown status ({})", e),
    };
    let _ = events.send(WorkerEvent::Exited { slot, pid, status });
}

// Ask a worker to drain with SIGTERM, then SIGKILL it once `grace` runs out
async fn terminate(pid: u32, child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = i32::try_from(pid).ok().filter(|pid| *pid > 0) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => return status,
                Err(_) => warn!(
                    "Worker {} still running {:?} after SIGTERM, killing it",
                    pid, grace
                ),
            },
            Err(e) => debug!("Cannot send SIGTERM to worker {}: {}", pid, e),
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.start_kill() {
        debug!("Worker {} already gone: {}", pid, e);
    }
    child.wait().await
}

async fn next_line(
    lines: &mut Option<Lines<BufReader<ChildStdout>>>,
) -> io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

/// Snapshot of the worker pool, published on every change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorStatus {
    /// Workers launched and not yet exited
    pub live: usize,
    /// Live workers that reported their listening address
    pub listening: usize,
    /// Total launches, restarts included
    pub launched: u64,
    /// Replacements scheduled after an exit
    pub restarts: u64,
    /// Set once every initial worker has listened
    pub ready: bool,
}

struct RunningWorker {
    handle: WorkerHandle,
    started: Instant,
    listening: bool,
}

/// Master process: one slot per worker, each slot kept occupied
pub struct Supervisor<L: WorkerLauncher> {
    launcher: L,
    workers: usize,
    policy: RestartPolicy,
    port: Option<u16>,
    status: watch::Sender<SupervisorStatus>,
}

impl<L: WorkerLauncher> Supervisor<L> {
    pub fn new(launcher: L, workers: usize) -> Self {
        let (status, _) = watch::channel(SupervisorStatus::default());
        Self {
            launcher,
            workers: workers.max(1),
            policy: RestartPolicy::default(),
            port: None,
            status,
        }
    }

    pub fn with_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Port named in the readiness banner
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn status(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.subscribe()
    }

    /// Run until `shutdown` is cancelled or the restart guard trips
    ///
    /// Either way every worker is stopped before this returns.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut slots: HashMap<usize, RunningWorker> = HashMap::new();
        let mut tracker = RestartTracker::new(self.policy.clone());
        let mut pending: FuturesUnordered<BoxFuture<'static, usize>> = FuturesUnordered::new();

        info!("Master setting up {} workers...", self.workers);
        for slot in 0..self.workers {
            if let Err(e) = self.spawn(slot, &events_tx, &mut slots).await {
                self.stop_all(&mut slots, &mut events).await;
                return Err(e);
            }
        }

        let outcome = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Master shutting down {} workers", slots.len());
                    break Ok(());
                }
                Some(slot) = pending.next() => {
                    if let Err(e) = self.spawn(slot, &events_tx, &mut slots).await {
                        error!("Failed to start worker in slot {}: {}", slot, e);
                        match tracker.record_exit(slot, Duration::ZERO, Instant::now()) {
                            RestartDecision::Restart { delay } => pending.push(delayed(slot, delay)),
                            RestartDecision::GiveUp { restarts_in_window } => {
                                break Err(self.give_up(restarts_in_window));
                            }
                        }
                    }
                }
                Some(event) = events.recv() => match event {
                    WorkerEvent::Online { slot, pid } => {
                        info!("Worker {} is online (slot {})", pid, slot);
                    }
                    WorkerEvent::Listening { slot, pid, address } => {
                        let Some(worker) = slots.get_mut(&slot).filter(|w| w.handle.pid == pid) else {
                            continue;
                        };
                        worker.listening = true;

                        let listening = slots.values().filter(|w| w.listening).count();
                        let announce = !self.status.borrow().ready && listening >= self.workers;
                        self.publish(&slots, |s| s.ready |= announce);

                        if announce {
                            self.banner();
                        } else {
                            debug!("Worker {} is listening on {}", pid, address);
                        }
                    }
                    WorkerEvent::Exited { slot, pid, status } => {
                        let Some(worker) = slots.get(&slot).filter(|w| w.handle.pid == pid) else {
                            debug!("Ignoring exit of replaced worker {}", pid);
                            continue;
                        };
                        let uptime = worker.started.elapsed();
                        slots.remove(&slot);
                        warn!("Worker {} died with {} after {:?}", pid, status, uptime);

                        match tracker.record_exit(slot, uptime, Instant::now()) {
                            RestartDecision::Restart { delay } => {
                                info!("Starting a new worker in slot {} in {:?}", slot, delay);
                                pending.push(delayed(slot, delay));
                                self.publish(&slots, |s| s.restarts += 1);
                            }
                            RestartDecision::GiveUp { restarts_in_window } => {
                                self.publish(&slots, |_| {});
                                break Err(self.give_up(restarts_in_window));
                            }
                        }
                    }
                },
            }
        };

        self.stop_all(&mut slots, &mut events).await;
        outcome
    }

    async fn spawn(
        &self,
        slot: usize,
        events: &mpsc::UnboundedSender<WorkerEvent>,
        slots: &mut HashMap<usize, RunningWorker>,
    ) -> Result<()> {
        let handle = self.launcher.launch(slot, events.clone()).await?;
        slots.insert(
            slot,
            RunningWorker {
                handle,
                started: Instant::now(),
                listening: false,
            },
        );
        self.publish(slots, |s| s.launched += 1);
        Ok(())
    }

    async fn stop_all(
        &self,
        slots: &mut HashMap<usize, RunningWorker>,
        events: &mut mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        for worker in slots.values_mut() {
            worker.handle.stop();
        }

        let deadline = tokio::time::sleep(STOP_GRACE);
        tokio::pin!(deadline);
        while !slots.is_empty() {
            tokio::select! {
                _ = &mut deadline => {
                    warn!("{} workers did not stop within {:?}", slots.len(), STOP_GRACE);
                    slots.clear();
                }
                event = events.recv() => match event {
                    Some(WorkerEvent::Exited { slot, pid, .. }) => {
                        if slots.get(&slot).map(|w| w.handle.pid) == Some(pid) {
                            slots.remove(&slot);
                            self.publish(slots, |_| {});
                        }
                    }
                    Some(_) => {}
                    None => slots.clear(),
                },
            }
        }
        self.publish(slots, |_| {});
    }

    fn publish(&self, slots: &HashMap<usize, RunningWorker>, update: impl FnOnce(&mut SupervisorStatus)) {
        self.status.send_modify(|status| {
            status.live = slots.len();
            status.listening = slots.values().filter(|w| w.listening).count();
            update(status);
        });
    }

    fn banner(&self) {
        match self.port {
            Some(port) => {
                info!("🚀 Server ready at http://localhost:{}/graphql", port);
                info!("📊 GraphiQL at http://localhost:{}/graphiql", port);
            }
            None => info!("🚀 All {} workers are listening", self.workers),
        }
    }

    fn give_up(&self, restarts_in_window: usize) -> TerritoryError {
        error!(
            "Workers restarted {} times within {:?}; giving up",
            restarts_in_window, self.policy.window
        );
        TerritoryError::Internal(format!(
            "worker restart limit reached ({} restarts within {:?})",
            restarts_in_window, self.policy.window
        ))
    }
}

fn delayed(slot: usize, delay: Duration) -> BoxFuture<'static, usize> {
    Box::pin(async move {
        tokio::time::sleep(delay).await;
        slot
    })
}
