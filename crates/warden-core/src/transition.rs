use tracing::{debug, warn};

use warden_model::{ControllerStatus, KEY_STATUS};
use warden_store::KvStore;

use crate::error::CoreResult;

/// Record `next` as the controller status.
///
/// Writers are never blocked: an edge the state machine does not know is
/// logged and written anyway, since `status` must reflect what happened.
pub(crate) fn set_status(store: &KvStore, next: ControllerStatus) -> CoreResult<()> {
    let current = store
        .get_opt(KEY_STATUS)?
        .and_then(|s| s.parse::<ControllerStatus>().ok());
    match current {
        Some(from) if !from.can_transition_to(next) => {
            warn!(%from, to = %next, "unexpected status transition");
        }
        Some(from) => debug!(%from, to = %next, "status transition"),
        None => debug!(to = %next, "status recorded"),
    }
    store.set(KEY_STATUS, next.as_str())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_even_unexpected_transitions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let kv = KvStore::init(tmp.path()).unwrap();

        set_status(&kv, ControllerStatus::Up).unwrap();
        set_status(&kv, ControllerStatus::CompletePass).unwrap();
        set_status(&kv, ControllerStatus::Restarting).unwrap();
        assert_eq!(kv.get(KEY_STATUS).unwrap(), "restarting");
    }
}
