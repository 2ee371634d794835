use std::{fs, io, path::Path};

use tracing::{info, instrument};

use warden_exec::is_alive;
use warden_model::ControllerStatus;

use super::Controller;
use crate::error::{CoreError, CoreResult};

impl Controller {
    /// Forget a stopped controller: empty its KV store and remove the stored
    /// definition and log.
    #[instrument(level = "debug", skip(self), fields(state = %self.state.root().display()))]
    pub fn purge(&self) -> CoreResult<()> {
        match self.current_status()? {
            Some(ControllerStatus::Down) => {}
            // Nothing reached the spawn step, unless a loop is still on its way there.
            None => {
                if let Some(cntrlpid) = self.record()?.cntrlpid.filter(|pid| is_alive(*pid)) {
                    return Err(CoreError::Refused(format!(
                        "controller loop {cntrlpid} is still starting"
                    )));
                }
            }
            Some(other) => {
                return Err(CoreError::Refused(format!(
                    "purge requires status down, found {other}"
                )));
            }
        }

        self.store().flush()?;
        remove_if_present(&self.state.definition())?;
        remove_if_present(&self.state.log())?;
        match fs::remove_dir_all(self.state.run_dir()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        info!("controller purged");
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
