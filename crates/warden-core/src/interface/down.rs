use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use warden_exec::{Signal, kill_group, send_signal, wait_for_exit};
use warden_model::ControllerStatus;

use super::Controller;
use crate::{
    error::{CoreError, CoreResult},
    transition::set_status,
};

/// How the controller was brought down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownOutcome {
    /// The controller stopped after the graceful request (`INT`).
    Graceful,
    /// The controller stopped after the forceful request (`TERM`).
    Forceful,
    /// The controller ignored both; its process group was killed and the
    /// state is now `undefined`.
    Abandoned,
}

impl DownOutcome {
    /// `true` when the controller ended in `down`.
    pub fn is_clean(&self) -> bool {
        !matches!(self, Self::Abandoned)
    }
}

impl Controller {
    /// Stop the controller and its service.
    ///
    /// `timeout` bounds the wait after the graceful request; the forceful
    /// request gets the configured kill grace.
    #[instrument(level = "debug", skip(self), fields(state = %self.state.root().display()))]
    pub async fn down(&self, timeout: Duration) -> CoreResult<DownOutcome> {
        let record = self.record()?;
        match record.status {
            Some(ControllerStatus::Up) => {}
            other => {
                let from = other.map_or("absent", |s| s.as_str());
                return Err(CoreError::NotImplemented(format!("down from status {from}")));
            }
        }

        let current = self.current_boot()?;
        let recorded = record.bootid.as_deref().map(str::trim).unwrap_or_default();
        if recorded != current {
            return Err(CoreError::StaleState {
                recorded: recorded.to_string(),
                current,
            });
        }

        let cntrlpid = record
            .cntrlpid
            .ok_or_else(|| CoreError::Runtime("no controller pid recorded".into()))?;
        let store = self.store();

        send_signal(cntrlpid, Signal::SIGINT)?;
        if exited_within(cntrlpid, timeout).await? {
            stop_service(record.svcpid)?;
            set_status(&store, ControllerStatus::Down)?;
            info!(cntrlpid, "controller stopped gracefully");
            return Ok(DownOutcome::Graceful);
        }

        warn!(cntrlpid, ?timeout, "controller ignored graceful stop");
        send_signal(cntrlpid, Signal::SIGTERM)?;
        if exited_within(cntrlpid, self.config.kill_grace()).await? {
            stop_service(record.svcpid)?;
            set_status(&store, ControllerStatus::Down)?;
            info!(cntrlpid, "controller stopped forcefully");
            return Ok(DownOutcome::Forceful);
        }

        let pgid = record.cntrlpgid.unwrap_or(cntrlpid);
        warn!(cntrlpid, pgid, "controller unresponsive, killing its process group");
        kill_group(pgid, Signal::SIGKILL)?;
        stop_service(record.svcpid)?;
        set_status(&store, ControllerStatus::Undefined)?;
        Ok(DownOutcome::Abandoned)
    }
}

/// The service leads its own group and must not outlive its controller,
/// including one that was already dead when `down` ran.
fn stop_service(svcpid: Option<i32>) -> CoreResult<()> {
    if let Some(svcpid) = svcpid {
        debug!(svcpid, "killing service group");
        kill_group(svcpid, Signal::SIGKILL)?;
    }
    Ok(())
}

async fn exited_within(pid: i32, limit: Duration) -> CoreResult<bool> {
    match tokio::time::timeout(limit, wait_for_exit(pid)).await {
        Ok(res) => {
            res?;
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::WardenConfig, paths::StateDir};
    use std::os::unix::process::ExitStatusExt;

    use warden_model::{KEY_BOOTID, KEY_CNTRLPID, KEY_STATUS, KEY_SVCPID};

    fn controller(tmp: &tempfile::TempDir) -> Controller {
        Controller::new(StateDir::new(tmp.path()), WardenConfig::default())
    }

    #[tokio::test]
    async fn requires_up_status() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cntrl = controller(&tmp);
        let res = cntrl.down(Duration::from_secs(1)).await;
        assert!(matches!(res, Err(CoreError::NotImplemented(_))));

        let kv = cntrl.state().init_store().unwrap();
        kv.set(KEY_STATUS, "complete,pass").unwrap();
        let res = cntrl.down(Duration::from_secs(1)).await;
        assert!(matches!(res, Err(CoreError::NotImplemented(_))));
    }

    #[tokio::test]
    async fn refuses_state_from_another_boot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cntrl = controller(&tmp);
        let kv = cntrl.state().init_store().unwrap();
        kv.set(KEY_STATUS, "up").unwrap();
        kv.set(KEY_BOOTID, "0000000000000000").unwrap();
        kv.set(KEY_CNTRLPID, "999999").unwrap();

        let res = cntrl.down(Duration::from_secs(1)).await;
        assert!(matches!(res, Err(CoreError::StaleState { .. })));
        assert_eq!(kv.get(KEY_STATUS).unwrap(), "up");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn graceful_stop_marks_down() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cntrl = controller(&tmp);
        let kv = cntrl.state().init_store().unwrap();

        // Stand-in controller: dies on SIGINT like the real loop does.
        let mut child = tokio::process::Command::new("/bin/sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap() as i32;
        let reaper = tokio::spawn(async move { child.wait().await });

        kv.set(KEY_STATUS, "up").unwrap();
        kv.set(KEY_BOOTID, &warden_exec::boot_id().unwrap()).unwrap();
        kv.set(KEY_CNTRLPID, &pid.to_string()).unwrap();

        let outcome = cntrl.down(Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, DownOutcome::Graceful);
        assert!(outcome.is_clean());
        assert_eq!(kv.get(KEY_STATUS).unwrap(), "down");
        let _ = reaper.await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dead_controller_still_takes_its_service_down() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cntrl = controller(&tmp);
        let kv = cntrl.state().init_store().unwrap();

        let mut gone = tokio::process::Command::new("/bin/true").spawn().unwrap();
        let cntrlpid = gone.id().unwrap() as i32;
        gone.wait().await.unwrap();

        // Orphaned service in its own group, as the shim leaves it.
        let mut svc = tokio::process::Command::new("/bin/sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        let svcpid = svc.id().unwrap() as i32;

        kv.set(KEY_STATUS, "up").unwrap();
        kv.set(KEY_BOOTID, &warden_exec::boot_id().unwrap()).unwrap();
        kv.set(KEY_CNTRLPID, &cntrlpid.to_string()).unwrap();
        kv.set(KEY_SVCPID, &svcpid.to_string()).unwrap();

        let outcome = cntrl.down(Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, DownOutcome::Graceful);
        assert_eq!(kv.get(KEY_STATUS).unwrap(), "down");

        let status = tokio::time::timeout(Duration::from_secs(5), svc.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGKILL as i32));
    }
}
