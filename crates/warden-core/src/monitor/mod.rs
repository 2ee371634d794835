//! Controller monitor: one ordered event stream over a controller's state.
//!
//! Four sources run concurrently and feed a single channel:
//! - a one-shot timeout (`TIMEOUT:<secs>`);
//! - controller death, once `cntrlpid` is recorded (`DEAD:cntrl`);
//! - service death, once `svcpid` is recorded (`DEAD:svc`);
//! - KV mutations (`CREATE` / `UPDATE` / `DELETE`).
//!
//! Every run starts with `init`, emitted once the KV watch is armed, and ends
//! with `exit`. A raw change the store never produces terminates the monitor
//! with a runtime error.
mod sources;
use sources::Raw;

use std::{
    collections::{BTreeSet, VecDeque},
    future::Future,
};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use warden_model::{Delimiters, MonitorEvent, Subject};
use warden_store::{KvChange, KvStore, KvWatch};

use crate::error::{CoreError, CoreResult};

pub struct Monitor {
    store: KvStore,
    rx: mpsc::UnboundedReceiver<Raw>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    known: BTreeSet<String>,
    pending: VecDeque<MonitorEvent>,
    closed: bool,
}

impl Monitor {
    /// Arm every source over `store`. `timeout_secs == 0` disables the timeout.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(store: KvStore, timeout_secs: u64) -> CoreResult<Self> {
        let watch = KvWatch::new(&store)?;
        // Keys present before the watch are updates, not creations.
        let known: BTreeSet<String> = store.keys()?.into_iter().collect();

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        tasks.spawn(sources::kv(watch, tx.clone(), cancel.clone()));
        for subject in [Subject::Cntrl, Subject::Svc] {
            tasks.spawn(sources::death(
                subject,
                store.clone(),
                tx.clone(),
                cancel.clone(),
            ));
        }
        if timeout_secs > 0 {
            tasks.spawn(sources::timeout(timeout_secs, tx, cancel.clone()));
        }
        debug!(dir = %store.dir().display(), timeout_secs, "monitor started");

        Ok(Self {
            store,
            rx,
            cancel,
            tasks,
            known,
            pending: VecDeque::from([MonitorEvent::Init]),
            closed: false,
        })
    }

    /// Next normalized event.
    ///
    /// Returns [`MonitorEvent::Exit`] once every source is done or after
    /// [`Monitor::shutdown`]; a source failure shuts the monitor down and is
    /// returned as [`CoreError::Runtime`].
    pub async fn next(&mut self) -> CoreResult<MonitorEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        loop {
            if self.closed {
                return Ok(MonitorEvent::Exit);
            }
            let Some(raw) = self.rx.recv().await else {
                self.shutdown().await;
                return Ok(MonitorEvent::Exit);
            };
            trace!(?raw, "raw monitor record");
            match self.normalize(raw) {
                Ok(Some(event)) => return Ok(event),
                Ok(None) => continue,
                Err(e) => {
                    self.shutdown().await;
                    return Err(e);
                }
            }
        }
    }

    /// Cancel and join every source. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
        debug!("monitor stopped");
    }

    fn normalize(&mut self, raw: Raw) -> CoreResult<Option<MonitorEvent>> {
        let event = match raw {
            Raw::Timeout(secs) => MonitorEvent::Timeout(secs),
            Raw::Dead(subject) => MonitorEvent::Dead(subject),
            Raw::Kv(KvChange::Written(key)) => {
                // Removed again before we got to it: the DELETE follows.
                let Some(value) = self.store.get_opt(&key)? else {
                    return Ok(None);
                };
                let value = value.trim_end().to_string();
                if self.known.insert(key.clone()) {
                    MonitorEvent::Create { key, value }
                } else {
                    MonitorEvent::Update { key, value }
                }
            }
            Raw::Kv(KvChange::Removed(key)) => {
                self.known.remove(&key);
                MonitorEvent::Delete { key }
            }
            Raw::Kv(KvChange::Unrecognized(what)) => {
                return Err(CoreError::Runtime(format!("unrecognized kv change: {what}")));
            }
            Raw::Failed(reason) => return Err(CoreError::Runtime(reason)),
        };
        Ok(Some(event))
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drive `monitor` until `stop` resolves, a `TIMEOUT` is seen, or it ends,
/// writing one record per line to `sink`.
///
/// `exit` is always the last record written.
pub async fn run_to_sink<W, F>(
    mut monitor: Monitor,
    delimiters: Delimiters,
    mut sink: W,
    stop: F,
) -> CoreResult<()>
where
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    tokio::pin!(stop);
    let result = loop {
        let event = tokio::select! {
            _ = &mut stop => break Ok(()),
            event = monitor.next() => event,
        };
        match event {
            Ok(MonitorEvent::Exit) => break Ok(()),
            Ok(event) => {
                if let Err(e) = write_record(&mut sink, &delimiters, &event).await {
                    break Err(e);
                }
                if matches!(event, MonitorEvent::Timeout(_)) {
                    break Ok(());
                }
            }
            Err(e) => break Err(e),
        }
    };

    monitor.shutdown().await;
    write_record(&mut sink, &delimiters, &MonitorEvent::Exit).await?;
    result
}

async fn write_record<W>(sink: &mut W, delimiters: &Delimiters, event: &MonitorEvent) -> CoreResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = delimiters.encode(event);
    line.push('\n');
    sink.write_all(line.as_bytes()).await?;
    sink.flush().await?;
    Ok(())
}
