use std::{
    fs::{self, OpenOptions},
    io,
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    pin::pin,
};

use futures_util::StreamExt;
use inotify::{EventMask, Inotify, WatchMask};
use tracing::{debug, trace};

use crate::{StoreError, StoreResult};

/// One-shot barrier between a launcher and a process it spawns.
///
/// The launcher opens the gate before spawning, does its bookkeeping (typically
/// recording the child's PID, which the child cannot know in advance), then
/// releases it. The child calls [`await_gate`] before doing anything observable.
///
/// A gate dropped without [`Gate::release`] still removes its sentinel so a
/// waiter can never block forever.
#[derive(Debug)]
pub struct Gate {
    path: PathBuf,
    released: bool,
}

impl Gate {
    /// Create the sentinel file at `path` (mode `0600`).
    ///
    /// Fails if the sentinel already exists: gates are never reused.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)?;
        trace!(gate = %path.display(), "gate opened");
        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlink the sentinel, unblocking every waiter.
    pub fn release(mut self) -> StoreResult<()> {
        self.released = true;
        remove_sentinel(&self.path)?;
        debug!(gate = %self.path.display(), "gate released");
        Ok(())
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        if !self.released {
            let _ = remove_sentinel(&self.path);
        }
    }
}

fn remove_sentinel(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Block until the gate sentinel at `path` is removed.
///
/// Uses a deletion notification on that exact path. A sentinel that is already
/// gone when the watch is armed counts as released.
pub async fn await_gate(path: &Path) -> StoreResult<()> {
    let inotify = Inotify::init()?;
    match inotify
        .watches()
        .add(path, WatchMask::DELETE_SELF | WatchMask::ATTRIB)
    {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    if !path.exists() {
        return Ok(());
    }

    let mut events = pin!(inotify.into_event_stream([0u8; 256])?);
    while let Some(event) = events.next().await {
        let event = event?;
        if event
            .mask
            .intersects(EventMask::DELETE_SELF | EventMask::IGNORED)
            || !path.exists()
        {
            trace!(gate = %path.display(), "gate passed");
            return Ok(());
        }
    }
    Err(StoreError::WatchClosed(path.display().to_string()))
}
