//! Readiness gate.
//!
//! A cycle starts on trigger and waits for three inputs: a push registration
//! result, a location (or a decision not to wait for one), and remote params.
//! Once all three are in, the gate hands a [`UserState`] snapshot to the
//! [`StateSynchronizer`] exactly once and stays busy until the sync finishes.
//!
//! All cycle state is owned by one actor task. Work runs on separate tasks
//! that report back with the cycle id they were started for, so results from
//! an abandoned cycle are ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backend_client::{PushBackend, RemoteParams, RetryPolicy};
use notification_store::NotificationStore;
use push_core::{DeviceInfo, Location, LocationProvider, PushRegistrar, RegistrationOutcome};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SdkConfig;
use crate::error::SessionError;
use crate::state::{allowed_packages, keys, merge_subscribable_status, UserState};
use crate::synchronizer::StateSynchronizer;

/// Where the gate is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    /// Waiting for inputs; each flag is set once that input arrived.
    Waiting { push: bool, location: bool, config: bool },
    /// The synchronizer is running.
    Syncing,
}

/// Snapshot returned by [`GateHandle::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateStatus {
    pub phase: GatePhase,
    /// Id of the latest cycle (0 before the first trigger).
    pub cycle: u64,
    /// Number of cycles whose sync ran to completion.
    pub completed_syncs: u64,
    pub subscribable_status: i32,
    pub push_token: Option<String>,
    pub params_fetched: bool,
}

/// Gate settings derived from [`SdkConfig`].
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub app_id: String,
    pub sender_id: Option<String>,
    pub share_location: bool,
    pub prompt_location: bool,
    pub retry: RetryPolicy,
    pub cycle_timeout: Option<Duration>,
    pub device: DeviceInfo,
}

impl GateConfig {
    pub fn from_sdk(config: &SdkConfig) -> Self {
        Self {
            app_id: config.app_id.clone(),
            sender_id: config.sender_id.clone(),
            share_location: config.share_location,
            prompt_location: config.prompt_location,
            retry: config.retry.clone(),
            cycle_timeout: config.cycle_timeout,
            device: config.device.clone(),
        }
    }
}

/// Collaborators used by the gate.
#[derive(Clone)]
pub struct GateDeps {
    pub registrar: Arc<dyn PushRegistrar>,
    pub location: Arc<dyn LocationProvider>,
    pub synchronizer: StateSynchronizer,
    pub store: NotificationStore,
    /// The user's subscription preference, read when building the snapshot.
    pub subscription_enabled: Arc<AtomicBool>,
}

/// State carried over from a previous run.
#[derive(Debug, Clone, Default)]
pub struct GateSeed {
    /// Last push token that was synced.
    pub push_token: Option<String>,
    /// Sender id from the last remote params.
    pub cached_sender_id: Option<String>,
}

#[derive(Debug)]
enum Command {
    Trigger { new_session: bool },
    Status(oneshot::Sender<GateStatus>),
    SetLocationShared(bool),
    PushDone { cycle: u64, outcome: RegistrationOutcome },
    LocationDone { cycle: u64, location: Option<Location> },
    ConfigDone { cycle: u64, params: RemoteParams },
    ConfigAbandoned { cycle: u64 },
    CycleTimeout { cycle: u64 },
    SyncFinished { cycle: u64 },
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running readiness gate.
#[derive(Debug, Clone)]
pub struct GateHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl GateHandle {
    /// Start a readiness cycle. Ignored while a cycle is in flight.
    pub fn trigger(&self, new_session: bool) -> Result<(), SessionError> {
        self.send(Command::Trigger { new_session })
    }

    pub async fn status(&self) -> Result<GateStatus, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status(reply))?;
        rx.await.map_err(|_| SessionError::ShutDown)
    }

    /// Change whether later cycles wait for a location.
    pub fn set_location_shared(&self, shared: bool) -> Result<(), SessionError> {
        self.send(Command::SetLocationShared(shared))
    }

    /// Stop the gate and abort its in-flight work.
    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(ack)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.tx.send(command).map_err(|_| SessionError::ShutDown)
    }
}

/// Spawns the gate actor.
pub struct ReadinessGate;

impl ReadinessGate {
    pub fn spawn(config: GateConfig, deps: GateDeps, seed: GateSeed) -> (GateHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = GateActor {
            config,
            deps,
            tx: tx.downgrade(),
            phase: Phase::Idle,
            flags: Flags::default(),
            cycle: 0,
            new_session: false,
            completed_syncs: 0,
            subscribable_status: 1,
            push_token: seed.push_token,
            sender_id: seed.cached_sender_id,
            params: None,
            location: None,
            location_fired: false,
            prompted: false,
            tasks: Vec::new(),
        };

        let handle = tokio::spawn(actor.run(rx).instrument(info_span!("readiness_gate")));
        (GateHandle { tx }, handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Waiting,
    Syncing,
}

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    push: bool,
    location: bool,
    config: bool,
}

impl Flags {
    fn all(self) -> bool {
        self.push && self.location && self.config
    }
}

struct GateActor {
    config: GateConfig,
    deps: GateDeps,
    tx: mpsc::WeakUnboundedSender<Command>,
    phase: Phase,
    flags: Flags,
    cycle: u64,
    new_session: bool,
    completed_syncs: u64,
    subscribable_status: i32,
    push_token: Option<String>,
    sender_id: Option<String>,
    params: Option<RemoteParams>,
    location: Option<Location>,
    location_fired: bool,
    prompted: bool,
    tasks: Vec<AbortHandle>,
}

impl GateActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Trigger { new_session } => self.start_cycle(new_session),
                Command::Status(reply) => {
                    let _ = reply.send(self.status());
                }
                Command::SetLocationShared(shared) => self.config.share_location = shared,
                Command::PushDone { cycle, outcome } => self.on_push(cycle, outcome),
                Command::LocationDone { cycle, location } => self.on_location(cycle, location),
                Command::ConfigDone { cycle, params } => self.on_config(cycle, params),
                Command::ConfigAbandoned { cycle } => {
                    if !self.is_stale(cycle) {
                        warn!(cycle, "Remote params unavailable; abandoning cycle");
                        self.abandon();
                    }
                }
                Command::CycleTimeout { cycle } => {
                    if !self.is_stale(cycle) {
                        warn!(cycle, "Readiness cycle timed out");
                        self.abandon();
                    }
                }
                Command::SyncFinished { cycle } => self.on_sync_finished(cycle),
                Command::Shutdown(ack) => {
                    rx.close();
                    self.abort_tasks();
                    let _ = ack.send(());
                    break;
                }
            }
        }

        self.abort_tasks();
        debug!("Readiness gate stopped");
    }

    fn status(&self) -> GateStatus {
        let phase = match self.phase {
            Phase::Idle => GatePhase::Idle,
            Phase::Waiting => GatePhase::Waiting {
                push: self.flags.push,
                location: self.flags.location,
                config: self.flags.config,
            },
            Phase::Syncing => GatePhase::Syncing,
        };

        GateStatus {
            phase,
            cycle: self.cycle,
            completed_syncs: self.completed_syncs,
            subscribable_status: self.subscribable_status,
            push_token: self.push_token.clone(),
            params_fetched: self.params.is_some(),
        }
    }

    fn start_cycle(&mut self, new_session: bool) {
        if self.phase != Phase::Idle {
            debug!(cycle = self.cycle, "Cycle in flight; trigger ignored");
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        self.abort_tasks();
        self.cycle += 1;
        self.new_session = new_session;
        self.phase = Phase::Waiting;
        self.flags = Flags {
            push: false,
            location: !new_session && self.location_fired,
            config: self.params.is_some(),
        };

        let cycle = self.cycle;
        info!(cycle, new_session, "Starting readiness cycle");

        self.spawn_push(cycle, tx.clone());

        if !self.flags.location {
            if self.config.share_location {
                self.spawn_location(cycle, tx.clone());
            } else {
                self.flags.location = true;
            }
        }

        if !self.flags.config {
            self.spawn_config(cycle, tx.clone());
        }

        if let Some(timeout) = self.config.cycle_timeout {
            let task = tokio::spawn(async move {
                sleep(timeout).await;
                let _ = tx.send(Command::CycleTimeout { cycle });
            });
            self.tasks.push(task.abort_handle());
        }

        self.maybe_sync();
    }

    fn spawn_push(&mut self, cycle: u64, tx: mpsc::UnboundedSender<Command>) {
        let registrar = self.deps.registrar.clone();
        let sender_id = self.config.sender_id.clone().or_else(|| self.sender_id.clone());

        let task = tokio::spawn(
            async move {
                debug!(registrar = registrar.name(), "Registering for push");
                let outcome = registrar.register(sender_id.as_deref()).await;
                let _ = tx.send(Command::PushDone { cycle, outcome });
            }
            .instrument(info_span!("push_registration", cycle)),
        );
        self.tasks.push(task.abort_handle());
    }

    fn spawn_location(&mut self, cycle: u64, tx: mpsc::UnboundedSender<Command>) {
        let provider = self.deps.location.clone();
        let prompt = self.config.prompt_location && !self.prompted;
        self.prompted |= prompt;

        let task = tokio::spawn(
            async move {
                let location = provider.location(prompt).await;
                let _ = tx.send(Command::LocationDone { cycle, location });
            }
            .instrument(info_span!("location", cycle, prompt)),
        );
        self.tasks.push(task.abort_handle());
    }

    fn spawn_config(&mut self, cycle: u64, tx: mpsc::UnboundedSender<Command>) {
        let synchronizer = self.deps.synchronizer.clone();
        let store = self.deps.store.clone();
        let retry = self.config.retry.clone();

        let task = tokio::spawn(
            async move {
                let player_id = synchronizer.user_id().await;
                let backend = synchronizer.backend();
                let command = match fetch_params_with_retry(backend.as_ref(), player_id.as_deref(), &retry).await {
                    Some(params) => {
                        if let Some(sender_id) = &params.android_sender_id {
                            if let Err(e) = store.set_setting(keys::SENDER_ID, sender_id).await {
                                warn!("Failed to cache sender id: {}", e);
                            }
                        }
                        Command::ConfigDone { cycle, params }
                    }
                    None => Command::ConfigAbandoned { cycle },
                };
                let _ = tx.send(command);
            }
            .instrument(info_span!("remote_params", cycle)),
        );
        self.tasks.push(task.abort_handle());
    }

    fn is_stale(&self, cycle: u64) -> bool {
        cycle != self.cycle || self.phase != Phase::Waiting
    }

    fn on_push(&mut self, cycle: u64, outcome: RegistrationOutcome) {
        if self.is_stale(cycle) {
            debug!(cycle, "Dropping stale push result");
            return;
        }

        let has_token = self.push_token.is_some();
        self.subscribable_status = merge_subscribable_status(self.subscribable_status, outcome.status, has_token);

        match outcome.token {
            Some(token) => {
                debug!(cycle, "Push token received");
                self.push_token = Some(token);
            }
            None => warn!(cycle, status = outcome.status, "Push registration failed"),
        }

        self.flags.push = true;
        self.maybe_sync();
    }

    fn on_location(&mut self, cycle: u64, location: Option<Location>) {
        if self.is_stale(cycle) {
            debug!(cycle, "Dropping stale location result");
            return;
        }

        self.location_fired = true;
        if location.is_some() {
            self.location = location;
        }
        self.flags.location = true;
        self.maybe_sync();
    }

    fn on_config(&mut self, cycle: u64, params: RemoteParams) {
        if self.is_stale(cycle) {
            debug!(cycle, "Dropping stale remote params");
            return;
        }

        if let Some(sender_id) = &params.android_sender_id {
            self.sender_id = Some(sender_id.clone());
        }
        self.params = Some(params);
        self.flags.config = true;
        self.maybe_sync();
    }

    fn maybe_sync(&mut self) {
        if self.phase != Phase::Waiting || !self.flags.all() {
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        self.phase = Phase::Syncing;
        let cycle = self.cycle;
        debug!(cycle, "All inputs ready; syncing user state");

        let sync = self.deps.synchronizer.flush(self.user_state(), self.new_session);
        self.tasks.push(sync.abort_handle());

        let watcher = tokio::spawn(async move {
            if let Err(e) = sync.await {
                if !e.is_cancelled() {
                    error!(cycle, "State sync task failed: {}", e);
                }
            }
            let _ = tx.send(Command::SyncFinished { cycle });
        });
        self.tasks.push(watcher.abort_handle());
    }

    fn on_sync_finished(&mut self, cycle: u64) {
        if cycle != self.cycle || self.phase != Phase::Syncing {
            return;
        }
        self.completed_syncs += 1;
        self.phase = Phase::Idle;
        debug!(cycle, "Readiness cycle complete");
    }

    fn user_state(&self) -> UserState {
        let mut state = UserState::new(self.config.app_id.clone(), self.config.device.clone());
        state.push_token = self.push_token.clone();
        state.subscribable_status = self.subscribable_status;
        state.subscription_enabled = self.deps.subscription_enabled.load(Ordering::SeqCst);
        if self.config.share_location {
            state.location = self.location;
        }
        if let Some(params) = &self.params {
            state.packages = allowed_packages(&self.config.device.installed_packages, &params.awl_list);
        }
        state
    }

    fn abandon(&mut self) {
        self.abort_tasks();
        self.phase = Phase::Idle;
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Fetch remote params, retrying with the policy's backoff.
///
/// Returns `None` once the policy gives up.
pub async fn fetch_params_with_retry(
    backend: &dyn PushBackend,
    player_id: Option<&str>,
    retry: &RetryPolicy,
) -> Option<RemoteParams> {
    let mut retries = 0;
    loop {
        match backend.fetch_remote_params(player_id).await {
            Ok(params) => return Some(params),
            Err(e) => {
                if !retry.should_retry(retries) {
                    warn!(retries, "Giving up on remote params: {}", e);
                    return None;
                }
                let delay = retry.delay_for_attempt(retries);
                warn!(retries, delay_ms = delay.as_millis() as u64, "Remote params failed: {}", e);
                sleep(delay).await;
                retries += 1;
            }
        }
    }
}
