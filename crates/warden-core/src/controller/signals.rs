use tokio::{
    signal::unix::{SignalKind, signal},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use warden_exec::{SUPERVISED_SIGNALS, Signal};

/// Install a listener for every supervised signal, forwarding deliveries to `tx`.
///
/// Listeners stop when `cancel` fires or the receiver is dropped.
pub(crate) fn install(tx: mpsc::Sender<Signal>, cancel: CancellationToken) {
    for sig in SUPERVISED_SIGNALS {
        let mut stream = match signal(SignalKind::from_raw(sig as i32)) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(signal = %sig, error = %e, "cannot listen for signal");
                continue;
            }
        };
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    got = stream.recv() => {
                        if got.is_none() {
                            break;
                        }
                        trace!(signal = %sig, "signal delivered");
                        if tx.send(sig).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
}
