use std::{future::Future, path::Path};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use warden_exec::{ExecPlan, Signal, kill_group, spawn_detached, wait_for_exit};
use warden_model::{
    ControllerStatus, KEY_BOOTID, KEY_ERROR, KEY_NAME, KEY_STATUS, KEY_SVCPID, ModelError,
    MonitorEvent, RUNTIME_KEYS, ServiceDefinition, Subject,
};
use warden_store::{Gate, KvStore};

use super::Controller;
use crate::{
    error::{CoreError, CoreResult},
    monitor::Monitor,
    transition::set_status,
};

/// Successful result of [`Controller::up`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpOutcome {
    /// A controller loop was spawned and reported the service PID.
    Started { svcpid: i32 },
    /// The controller was already up on this boot; nothing was done.
    AlreadyUp { svcpid: Option<i32> },
}

/// What `up` does given the recorded status.
#[derive(Debug, PartialEq)]
enum Dispatch {
    FirstInit,
    Respawn,
    AlreadyUp,
}

/// How `up` reacts to one monitor event.
#[derive(Debug, PartialEq)]
enum Verdict {
    Spawned(i32),
    Failed(String),
    TimedOut(u64),
    Died,
    Ignore,
    Unexpected(String),
}

impl Controller {
    /// Bring the controller up.
    ///
    /// `definition` is the raw JSON document and is only accepted on first
    /// creation. `interrupt` resolving aborts the wait (and fails the controller).
    #[instrument(level = "debug", skip_all, fields(state = %self.state.root().display()))]
    pub async fn up<F>(
        &self,
        definition: Option<&str>,
        name: Option<&str>,
        interrupt: F,
    ) -> CoreResult<UpOutcome>
    where
        F: Future<Output = ()>,
    {
        let store = self.state.init_store()?;
        let name = resolve_name(&store, name)?;
        let current_boot = self.current_boot()?;
        let recorded_boot = store.get_opt(KEY_BOOTID)?;

        let status = self.current_status()?;
        let plan = match dispatch(status, definition.is_some(), recorded_boot.as_deref(), &current_boot) {
            Err(CoreError::Refused(reason)) if status == Some(ControllerStatus::Error) => {
                let cause = store.get_or(KEY_ERROR, "unknown")?;
                return Err(CoreError::Refused(format!("{reason}: {}", cause.trim())));
            }
            other => other?,
        };
        match plan {
            Dispatch::AlreadyUp => {
                let svcpid = self.record()?.svcpid;
                info!(%name, ?svcpid, "controller already up");
                return Ok(UpOutcome::AlreadyUp { svcpid });
            }
            Dispatch::FirstInit => match definition {
                Some(raw) => self.record_definition(raw)?,
                None if self.state.definition().is_file() => {
                    debug!("reusing recorded definition");
                }
                None => return Err(ModelError::MissingField("definition").into()),
            },
            Dispatch::Respawn => debug!(?status, "respawning controller loop"),
        }

        for key in RUNTIME_KEYS {
            store.clear(key)?;
        }

        let mut monitor = Monitor::start(store.clone(), self.config.up_wait_secs)?;
        let result = match self.spawn_loop(&mut monitor).await {
            Ok(cntrlpid) => {
                let watched = self.watch(&store, &mut monitor, interrupt).await;
                if watched.is_err() {
                    self.abort_loop(&store, cntrlpid).await;
                }
                watched
            }
            Err(e) => Err(e),
        };
        monitor.shutdown().await;

        match result {
            Ok(svcpid) => {
                info!(%name, svcpid, "controller up");
                Ok(UpOutcome::Started { svcpid })
            }
            Err(e) => {
                warn!(%name, error = %e, "controller failed to come up");
                store.set(KEY_ERROR, &e.to_string())?;
                set_status(&store, ControllerStatus::Error)?;
                Err(e)
            }
        }
    }

    fn record_definition(&self, raw: &str) -> CoreResult<()> {
        let definition = ServiceDefinition::from_json(raw)?;
        ExecPlan::from_definition(&definition).validate()?;
        std::fs::write(self.state.definition(), definition.to_json())?;
        debug!(path = %self.state.definition().display(), "definition recorded");
        Ok(())
    }

    /// Spawn the detached controller loop once the monitor is live.
    async fn spawn_loop(&self, monitor: &mut Monitor) -> CoreResult<i32> {
        match monitor.next().await? {
            MonitorEvent::Init => {}
            other => {
                return Err(CoreError::Runtime(format!(
                    "monitor started with {}",
                    other.kind()
                )));
            }
        }

        let gate = Gate::open(self.state.gate_path("cntrl"))?;
        let args = self.loop_args(gate.path());
        let pid = spawn_detached(&self.config.program()?, &args, &self.state.log())? as i32;
        if let Err(e) = gate.release() {
            if let Err(kill) = kill_group(pid, Signal::SIGKILL) {
                warn!(error = %kill, pid, "cannot kill gated controller loop");
            }
            return Err(e.into());
        }
        debug!(pid, "controller loop spawned");
        Ok(pid)
    }

    /// Wait for the loop to report the service PID.
    async fn watch<F>(&self, store: &KvStore, monitor: &mut Monitor, interrupt: F) -> CoreResult<i32>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        loop {
            let event = tokio::select! {
                _ = &mut interrupt => {
                    return Err(CoreError::Interrupted("caller signal".into()));
                }
                event = monitor.next() => event?,
            };
            debug!(event = %self.config.delimiters.encode(&event), "up observed");

            match classify(&event) {
                Verdict::Spawned(svcpid) => return Ok(svcpid),
                // The service spawned and the loop finished before we saw the svcpid write.
                Verdict::Died if store.contains(KEY_SVCPID) => {
                    let raw = store.get(KEY_SVCPID)?;
                    return raw
                        .trim()
                        .parse()
                        .map_err(|_| CoreError::Runtime(format!("bad svcpid {raw:?}")));
                }
                Verdict::Died => {
                    return Err(CoreError::Dead("exited before spawning the service".into()));
                }
                Verdict::Failed(status) => {
                    return Err(CoreError::Runtime(format!("controller reported {status}")));
                }
                Verdict::TimedOut(secs) => return Err(CoreError::Timeout(secs)),
                Verdict::Unexpected(what) => {
                    return Err(CoreError::Runtime(format!("unexpected monitor event {what}")));
                }
                Verdict::Ignore => {}
            }
        }
    }

    /// Kill a loop that failed to come up, and any service it started.
    ///
    /// The loop is gone once this returns, so it cannot overwrite the
    /// `error` status written afterwards.
    async fn abort_loop(&self, store: &KvStore, cntrlpid: i32) {
        // spawn_detached makes the loop a session leader: its pgid is its pid.
        if let Err(e) = kill_group(cntrlpid, Signal::SIGKILL) {
            warn!(error = %e, cntrlpid, "cannot kill controller loop");
        }
        match tokio::time::timeout(self.config.kill_grace(), wait_for_exit(cntrlpid)).await {
            Ok(Ok(())) => debug!(cntrlpid, "controller loop reaped"),
            Ok(Err(e)) => warn!(error = %e, cntrlpid, "cannot wait for controller loop"),
            Err(_) => warn!(cntrlpid, "controller loop survived SIGKILL"),
        }
        let svcpid = store
            .get_opt(KEY_SVCPID)
            .ok()
            .flatten()
            .and_then(|raw| raw.trim().parse::<i32>().ok());
        if let Some(svcpid) = svcpid {
            warn!(svcpid, "killing service of the failed controller");
            if let Err(e) = kill_group(svcpid, Signal::SIGKILL) {
                warn!(error = %e, svcpid, "cannot kill service group");
            }
        }
    }

    fn loop_args(&self, gate: &Path) -> Vec<String> {
        let logger = &self.config.logger;
        vec![
            "--log-level".into(),
            logger.level.as_str().into(),
            "--log-format".into(),
            logger.format.to_string(),
            "loop".into(),
            "--state".into(),
            self.state.root().display().to_string(),
            "--gate".into(),
            gate.display().to_string(),
        ]
    }
}

fn resolve_name(store: &KvStore, requested: Option<&str>) -> CoreResult<String> {
    if let Some(existing) = store.get_opt(KEY_NAME)? {
        if requested.is_some_and(|r| r != existing.trim()) {
            warn!(existing = %existing.trim(), "controller already named; ignoring new name");
        }
        return Ok(existing.trim().to_string());
    }
    let name = requested
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    store.set(KEY_NAME, &name)?;
    Ok(name)
}

fn dispatch(
    status: Option<ControllerStatus>,
    has_definition: bool,
    recorded_boot: Option<&str>,
    current_boot: &str,
) -> CoreResult<Dispatch> {
    let refuse = |why: &str| Err(CoreError::Refused(why.to_string()));
    let Some(status) = status else {
        return Ok(Dispatch::FirstInit);
    };
    match status {
        ControllerStatus::Error => return refuse("controller is in error state"),
        s if s.is_complete() => return refuse("controller has completed; bring it down first"),
        ControllerStatus::Undefined => {
            return refuse("controller state is undefined; manual intervention required");
        }
        ControllerStatus::Restarting => return refuse("controller is restarting"),
        _ => {}
    }
    if has_definition {
        return Err(ModelError::InvalidDefinition(
            "controller already has a definition; it cannot be replaced".into(),
        )
        .into());
    }
    match status {
        ControllerStatus::Up if recorded_boot.map(str::trim) == Some(current_boot) => {
            Ok(Dispatch::AlreadyUp)
        }
        ControllerStatus::Up | ControllerStatus::Down => Ok(Dispatch::Respawn),
        other => refuse(&format!("cannot bring up from {other}")),
    }
}

fn classify(event: &MonitorEvent) -> Verdict {
    match event {
        MonitorEvent::Create { key, value } if key == KEY_SVCPID => match value.trim().parse() {
            Ok(pid) => Verdict::Spawned(pid),
            Err(_) => Verdict::Unexpected(format!("svcpid={value}")),
        },
        MonitorEvent::Update { key, value } | MonitorEvent::Create { key, value }
            if key == KEY_STATUS
                && matches!(value.trim(), "error" | "undefined") =>
        {
            Verdict::Failed(value.trim().to_string())
        }
        MonitorEvent::Dead(Subject::Cntrl) => Verdict::Died,
        MonitorEvent::Timeout(secs) => Verdict::TimedOut(*secs),
        MonitorEvent::Dead(Subject::Svc)
        | MonitorEvent::Delete { .. }
        | MonitorEvent::Create { .. }
        | MonitorEvent::Update { .. } => Verdict::Ignore,
        MonitorEvent::Init | MonitorEvent::Exit => Verdict::Unexpected(event.kind().to_string()),
    }
}
