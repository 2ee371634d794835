use serde::Serialize;

use crate::{
    ControllerStatus, KEY_BOOTID, KEY_CNTRLPGID, KEY_CNTRLPID, KEY_ERROR, KEY_NAME, KEY_RC,
    KEY_STATUS, KEY_SVCPID, ModelResult,
};

/// Typed view over the KV contents of one controller.
///
/// `status` is authoritative; every other field is context for the current or
/// most recent status and may be stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerRecord {
    pub name: Option<String>,
    pub status: Option<ControllerStatus>,
    pub bootid: Option<String>,
    pub cntrlpid: Option<i32>,
    pub cntrlpgid: Option<i32>,
    pub svcpid: Option<i32>,
    pub error: Option<String>,
    pub rc: Option<i32>,
}

impl ControllerRecord {
    /// Build a record from raw key/value pairs.
    ///
    /// Unknown keys are ignored; a PID or exit code that does not parse is treated as absent,
    /// while an unparsable `status` is an error since nothing can be decided without it.
    pub fn from_entries<'a, I>(entries: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut rec = Self::default();
        for (key, value) in entries {
            let value = value.trim();
            match key {
                KEY_NAME => rec.name = Some(value.to_string()),
                KEY_STATUS => rec.status = Some(value.parse()?),
                KEY_BOOTID => rec.bootid = Some(value.to_string()),
                KEY_CNTRLPID => rec.cntrlpid = value.parse().ok(),
                KEY_CNTRLPGID => rec.cntrlpgid = value.parse().ok(),
                KEY_SVCPID => rec.svcpid = value.parse().ok(),
                KEY_ERROR => rec.error = Some(value.to_string()),
                KEY_RC => rec.rc = value.parse().ok(),
                _ => {}
            }
        }
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys() {
        let rec = ControllerRecord::from_entries([
            ("name", "web"),
            ("status", "complete,fail\n"),
            ("cntrlpid", "100"),
            ("cntrlpgid", "100"),
            ("svcpid", "101"),
            ("rc", "3"),
            ("unrelated", "x"),
        ])
        .unwrap();

        assert_eq!(rec.name.as_deref(), Some("web"));
        assert_eq!(rec.status, Some(ControllerStatus::CompleteFail));
        assert_eq!(rec.cntrlpid, Some(100));
        assert_eq!(rec.svcpid, Some(101));
        assert_eq!(rec.rc, Some(3));
        assert!(rec.error.is_none());
    }

    #[test]
    fn garbage_pid_is_absent() {
        let rec = ControllerRecord::from_entries([("svcpid", "abc")]).unwrap();
        assert!(rec.svcpid.is_none());
    }

    #[test]
    fn garbage_status_is_an_error() {
        assert!(ControllerRecord::from_entries([("status", "sideways")]).is_err());
    }
}
