use std::{ffi::OsString, pin::Pin};

use futures_util::StreamExt;
use inotify::{EventMask, EventStream, Inotify, WatchMask};

use crate::{KvStore, StoreError, StoreResult};

type Events = EventStream<[u8; 4096]>;

/// One raw mutation observed in a KV directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvChange {
    /// A key's file was (re)written.
    Written(String),
    /// A key's file was removed.
    Removed(String),
    /// Something the store never produces: queue overflow, the directory
    /// itself going away, a subdirectory, ...
    Unrecognized(String),
}

/// Continuous watch over the directory of a [`KvStore`].
///
/// The watch is armed when [`KvWatch::new`] returns; every later mutation is reported.
pub struct KvWatch {
    events: Pin<Box<Events>>,
}

impl KvWatch {
    pub fn new(store: &KvStore) -> StoreResult<Self> {
        let inotify = Inotify::init()?;
        inotify.watches().add(
            store.dir(),
            WatchMask::CLOSE_WRITE
                | WatchMask::MOVED_TO
                | WatchMask::MOVED_FROM
                | WatchMask::DELETE
                | WatchMask::DELETE_SELF
                | WatchMask::MOVE_SELF,
        )?;
        let events = inotify.into_event_stream([0u8; 4096])?;
        Ok(Self {
            events: Box::pin(events),
        })
    }

    /// Next visible mutation. Temporary files of in-flight writes are skipped.
    pub async fn next(&mut self) -> StoreResult<KvChange> {
        loop {
            let Some(event) = self.events.next().await else {
                return Err(StoreError::WatchClosed("kv watch".into()));
            };
            let event = event?;
            if let Some(change) = classify(event.mask, event.name) {
                return Ok(change);
            }
        }
    }
}

fn classify(mask: EventMask, name: Option<OsString>) -> Option<KvChange> {
    let name = name.map(|n| n.to_string_lossy().into_owned());
    if let Some(n) = &name {
        if n.starts_with('.') {
            return None;
        }
    }

    match name {
        Some(key) if !mask.contains(EventMask::ISDIR) => {
            if mask.intersects(EventMask::MOVED_TO | EventMask::CLOSE_WRITE) {
                Some(KvChange::Written(key))
            } else if mask.intersects(EventMask::DELETE | EventMask::MOVED_FROM) {
                Some(KvChange::Removed(key))
            } else {
                Some(KvChange::Unrecognized(format!("{mask:?}:{key}")))
            }
        }
        Some(key) => Some(KvChange::Unrecognized(format!("{mask:?}:{key}"))),
        None => Some(KvChange::Unrecognized(format!("{mask:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn classifies_store_operations() {
        assert_eq!(
            classify(EventMask::MOVED_TO, Some("status".into())),
            Some(KvChange::Written("status".into()))
        );
        assert_eq!(
            classify(EventMask::CLOSE_WRITE, Some("svcpid".into())),
            Some(KvChange::Written("svcpid".into()))
        );
        assert_eq!(
            classify(EventMask::DELETE, Some("rc".into())),
            Some(KvChange::Removed("rc".into()))
        );
    }

    #[test]
    fn skips_temporary_files() {
        assert_eq!(classify(EventMask::CLOSE_WRITE, Some(".status.1.tmp".into())), None);
        assert_eq!(classify(EventMask::MOVED_FROM, Some(".status.1.tmp".into())), None);
    }

    #[test]
    fn directory_level_events_are_unrecognized() {
        assert!(matches!(
            classify(EventMask::DELETE_SELF, None),
            Some(KvChange::Unrecognized(_))
        ));
        assert!(matches!(
            classify(EventMask::Q_OVERFLOW, None),
            Some(KvChange::Unrecognized(_))
        ));
        assert!(matches!(
            classify(EventMask::MOVED_TO | EventMask::ISDIR, Some("sub".into())),
            Some(KvChange::Unrecognized(_))
        ));
    }

    #[tokio::test]
    async fn reports_writes_and_removals_in_order() {
        let tmp = TempDir::new().unwrap();
        let kv = KvStore::init(tmp.path().join("kv")).unwrap();
        let mut watch = KvWatch::new(&kv).unwrap();

        kv.set("status", "up").unwrap();
        kv.clear("status").unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), watch.next())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), watch.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, KvChange::Written("status".into()));
        assert_eq!(second, KvChange::Removed("status".into()));
    }
}
