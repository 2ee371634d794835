//! The controller loop: the detached supervisor of exactly one service.
//!
//! Lifecycle of one run:
//! 1. wait for the launcher's gate;
//! 2. record `cntrlpid`, `cntrlpgid` and `bootid`;
//! 3. load the stored definition and spawn the gated shim for it;
//! 4. write `status=up`, then `svcpid`, then release the shim (on failure the
//!    shim is killed while still held);
//! 5. translate incoming signals until the service exits;
//! 6. record the outcome (`complete,pass` / `complete,fail` + `rc`) unless a
//!    stop was requested, in which case `down` owns the final status.
mod shim;
pub use shim::run_shim;

mod signals;

use std::{
    fmt,
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::ExitStatus,
};

use tokio::{process::Child, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use warden_exec::{
    ExecPlan, Signal, SignalAction, boot_id, kill_group, process_group_of, send_signal,
    signal_action, spawn_gated,
};
use warden_model::{
    ControllerStatus, KEY_BOOTID, KEY_CNTRLPGID, KEY_CNTRLPID, KEY_RC, KEY_SVCPID,
    ServiceDefinition,
};
use warden_store::{Gate, KvStore, await_gate};

use crate::{
    error::{CoreError, CoreResult},
    paths::StateDir,
    transition::set_status,
};

const SIGNAL_QUEUE: usize = 64;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Starting,
    Spawning,
    Running,
    /// The service is to be started again. Never entered: restarts are not supported yet.
    RestartPending,
    Stopping,
    Exited,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::RestartPending => "restart-pending",
            Self::Stopping => "stopping",
            Self::Exited => "exited",
        };
        f.write_str(s)
    }
}

/// How a loop run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExit {
    pub svcpid: i32,
    /// Exit code, `128 + signo` for a signal death.
    pub rc: i32,
    /// The exit followed a stop request.
    pub stopped: bool,
}

/// Exit code in shell convention.
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => 1,
    }
}

pub struct ControllerLoop {
    state: StateDir,
    store: KvStore,
    program: PathBuf,
    phase: LoopPhase,
    stop_requested: Option<Signal>,
    tx: mpsc::Sender<Signal>,
    rx: mpsc::Receiver<Signal>,
}

impl ControllerLoop {
    /// `program` is the warden executable, re-entered as `program shim`.
    pub fn new(state: StateDir, program: PathBuf) -> CoreResult<Self> {
        let store = state.init_store()?;
        let (tx, rx) = mpsc::channel(SIGNAL_QUEUE);
        Ok(Self {
            state,
            store,
            program,
            phase: LoopPhase::Starting,
            stop_requested: None,
            tx,
            rx,
        })
    }

    /// Sender feeding the loop's signal channel, alongside real deliveries.
    pub fn signals(&self) -> mpsc::Sender<Signal> {
        self.tx.clone()
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    fn enter(&mut self, phase: LoopPhase) {
        debug!(from = %self.phase, to = %phase, "loop phase");
        self.phase = phase;
    }

    /// Run the loop to completion.
    ///
    /// With `listen_signals`, real signal deliveries feed the same channel as
    /// [`ControllerLoop::signals`].
    #[instrument(level = "debug", skip_all, fields(state = %self.state.root().display()))]
    pub async fn run(mut self, gate: Option<&Path>, listen_signals: bool) -> CoreResult<LoopExit> {
        if let Some(gate) = gate {
            await_gate(gate).await?;
        }
        self.record_identity()?;

        let definition = match self.load_definition() {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "cannot load service definition");
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        if listen_signals {
            signals::install(self.tx.clone(), cancel.clone());
        }

        self.enter(LoopPhase::Spawning);
        let plan = ExecPlan::from_definition(&definition);
        plan.validate()?;

        let gate = Gate::open(self.state.gate_path("svc"))?;
        let args = vec![
            "shim".to_string(),
            "--gate".to_string(),
            gate.path().display().to_string(),
        ];
        let mut child = spawn_gated(&self.program, &args, &plan).await?;
        let svcpid = child
            .id()
            .ok_or_else(|| CoreError::Runtime("spawned shim has no pid".into()))?
            as i32;

        // The shim must never get past a gate that was dropped on an error path.
        let released = match self.record_spawn(svcpid) {
            Ok(()) => gate.release().map_err(CoreError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = released {
            error!(error = %e, svcpid, "cannot publish service, killing gated shim");
            abort_spawn(&mut child, svcpid).await;
            return Err(e);
        }
        self.enter(LoopPhase::Running);
        info!(svcpid, "service spawned");

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                Some(sig) = self.rx.recv() => self.on_signal(sig, svcpid),
            }
        };

        let rc = exit_code(status);
        self.enter(LoopPhase::Exited);
        let stopped = self.stop_requested.is_some();
        self.record_exit(rc, stopped)?;
        Ok(LoopExit {
            svcpid,
            rc,
            stopped,
        })
    }

    fn record_identity(&self) -> CoreResult<()> {
        let pid = std::process::id() as i32;
        let pgid = process_group_of(pid).unwrap_or(pid);
        let bootid = boot_id()?;

        self.store.set(KEY_CNTRLPID, &pid.to_string())?;
        self.store.set(KEY_CNTRLPGID, &pgid.to_string())?;
        self.store.set(KEY_BOOTID, &bootid)?;
        debug!(pid, pgid, bootid = %bootid, "controller identity recorded");
        Ok(())
    }

    fn record_spawn(&self, svcpid: i32) -> CoreResult<()> {
        set_status(&self.store, ControllerStatus::Up)?;
        self.store.set(KEY_SVCPID, &svcpid.to_string())?;
        Ok(())
    }

    fn load_definition(&self) -> CoreResult<ServiceDefinition> {
        let raw = std::fs::read_to_string(self.state.definition())?;
        Ok(ServiceDefinition::from_json(&raw)?)
    }

    fn on_signal(&mut self, sig: Signal, svcpid: i32) {
        match signal_action(sig) {
            SignalAction::Inspect => trace!(signal = %sig, "child state inspected"),
            SignalAction::Ignore => trace!(signal = %sig, "signal ignored"),
            SignalAction::Restart => {
                error!(signal = %sig, "restart requested: not implemented");
            }
            SignalAction::Stop(to) => {
                info!(signal = %sig, sent = %to, svcpid, "stop requested");
                self.stop_requested = Some(sig);
                self.enter(LoopPhase::Stopping);
                if let Err(e) = kill_group(svcpid, to) {
                    warn!(error = %e, svcpid, "cannot signal service group");
                }
            }
            SignalAction::Forward(to) => {
                debug!(signal = %to, svcpid, "forwarding signal");
                if let Err(e) = send_signal(svcpid, to) {
                    warn!(error = %e, svcpid, "cannot forward signal");
                }
            }
        }
    }

    fn record_exit(&self, rc: i32, stopped: bool) -> CoreResult<()> {
        if stopped {
            info!(rc, "service stopped on request");
            return Ok(());
        }
        if rc == 0 {
            set_status(&self.store, ControllerStatus::CompletePass)?;
            info!("service completed");
        } else {
            self.store.set(KEY_RC, &rc.to_string())?;
            set_status(&self.store, ControllerStatus::CompleteFail)?;
            warn!(rc, "service failed");
        }
        Ok(())
    }
}

/// Kill and reap a shim that is still held at its gate.
async fn abort_spawn(child: &mut Child, svcpid: i32) {
    if let Err(e) = kill_group(svcpid, Signal::SIGKILL) {
        warn!(error = %e, svcpid, "cannot kill gated shim");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, svcpid, "cannot reap gated shim");
    }
}
