use std::fmt;

use serde::Serialize;

use warden_exec::is_alive;
use warden_model::{ControllerRecord, ControllerStatus};

use super::Controller;
use crate::error::CoreResult;

/// Interpretation of a record together with process liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    /// Controller alive with a spawned service.
    Running,
    /// Controller died after recording itself but before spawning the service.
    SpawnFailed,
    /// Status says `up` but the controller is gone.
    ControllerLost,
    /// Status says `up` but was recorded during another boot.
    Stale,
    Stopped,
    Finished,
    Failed,
    Unknown,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::SpawnFailed => "spawn-failed",
            Self::ControllerLost => "controller-lost",
            Self::Stale => "stale",
            Self::Stopped => "stopped",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Derive a condition. Liveness flags are ignored for stale records.
    pub fn derive(record: &ControllerRecord, cntrl_alive: bool, stale: bool) -> Self {
        use ControllerStatus::*;
        match record.status {
            Some(Up) if stale => return Self::Stale,
            Some(Error | CompleteFail) => return Self::Failed,
            Some(CompletePass) => return Self::Finished,
            _ => {}
        }
        if !stale && record.cntrlpid.is_some() && !cntrl_alive && record.svcpid.is_none() {
            return Self::SpawnFailed;
        }
        match record.status {
            Some(Up) if cntrl_alive && record.svcpid.is_some() => Self::Running,
            Some(Up) if !cntrl_alive => Self::ControllerLost,
            Some(Down) => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view returned by [`Controller::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub record: ControllerRecord,
    pub cntrl_alive: bool,
    pub svc_alive: bool,
    /// The record was written during another boot; its PIDs mean nothing now.
    pub stale: bool,
    pub condition: Condition,
}

impl Controller {
    pub fn status(&self) -> CoreResult<StatusReport> {
        let record = self.record()?;
        let current = self.current_boot()?;
        let stale = record
            .bootid
            .as_deref()
            .is_some_and(|b| b.trim() != current);

        let alive = |pid: Option<i32>| !stale && pid.is_some_and(is_alive);
        let cntrl_alive = alive(record.cntrlpid);
        let svc_alive = alive(record.svcpid);
        let condition = Condition::derive(&record, cntrl_alive, stale);

        Ok(StatusReport {
            record,
            cntrl_alive,
            svc_alive,
            stale,
            condition,
        })
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "-".to_string(), T::to_string)
        }
        let r = &self.record;
        writeln!(f, "name:      {}", opt(&r.name))?;
        writeln!(f, "status:    {}", opt(&r.status))?;
        writeln!(f, "condition: {}", self.condition)?;
        writeln!(f, "cntrlpid:  {} (alive: {})", opt(&r.cntrlpid), self.cntrl_alive)?;
        writeln!(f, "svcpid:    {} (alive: {})", opt(&r.svcpid), self.svc_alive)?;
        writeln!(f, "bootid:    {}{}", opt(&r.bootid), if self.stale { " (stale)" } else { "" })?;
        if let Some(rc) = r.rc {
            writeln!(f, "rc:        {rc}")?;
        }
        if let Some(error) = &r.error {
            writeln!(f, "error:     {}", error.trim())?;
        }
        Ok(())
    }
}
