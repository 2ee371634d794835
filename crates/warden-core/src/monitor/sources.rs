//! Raw event producers of a [`Monitor`](super::Monitor).
//!
//! Each source runs as its own task, stops without emitting when cancelled,
//! and reports through the shared channel.
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use warden_exec::wait_for_exit;
use warden_model::Subject;
use warden_store::{KvChange, KvStore, KvWatch};

/// Unnormalized record as produced by a source.
#[derive(Debug)]
pub(crate) enum Raw {
    Timeout(u64),
    Dead(Subject),
    Kv(KvChange),
    Failed(String),
}

pub(crate) async fn timeout(secs: u64, tx: mpsc::UnboundedSender<Raw>, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(Duration::from_secs(secs)) => {
            trace!(secs, "monitor timeout elapsed");
            let _ = tx.send(Raw::Timeout(secs));
        }
    }
}

/// Wait for the subject's PID to be recorded, then for that process to exit.
pub(crate) async fn death(
    subject: Subject,
    store: KvStore,
    tx: mpsc::UnboundedSender<Raw>,
    cancel: CancellationToken,
) {
    let watch = async {
        let raw = store
            .wait_for_key(subject.pid_key())
            .await
            .map_err(|e| e.to_string())?;
        let pid: i32 = raw
            .trim()
            .parse()
            .map_err(|_| format!("{}: not a pid: {raw:?}", subject.pid_key()))?;
        debug!(%subject, pid, "watching process");
        wait_for_exit(pid).await.map_err(|e| e.to_string())
    };

    tokio::select! {
        _ = cancel.cancelled() => {}
        res = watch => {
            let raw = match res {
                Ok(()) => Raw::Dead(subject),
                Err(reason) => Raw::Failed(format!("{subject} watch: {reason}")),
            };
            let _ = tx.send(raw);
        }
    }
}

/// Forward every KV change until cancelled or the watch breaks.
pub(crate) async fn kv(mut watch: KvWatch, tx: mpsc::UnboundedSender<Raw>, cancel: CancellationToken) {
    loop {
        let raw = tokio::select! {
            _ = cancel.cancelled() => return,
            change = watch.next() => match change {
                Ok(change) => Raw::Kv(change),
                Err(e) => Raw::Failed(format!("kv watch: {e}")),
            },
        };
        let last = matches!(raw, Raw::Failed(_));
        if tx.send(raw).is_err() || last {
            return;
        }
    }
}
