//! Normalized monitor events and their line-oriented text form.
//!
//! Records are `KIND[<outer>PAYLOAD]`, multi-field payloads are joined by `<inner>`:
//!
//! ```text
//! init
//! CREATE:svcpid,4242
//! UPDATE:status,complete,pass
//! DELETE:svcpid
//! DEAD:cntrl
//! TIMEOUT:10
//! exit
//! ```
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ModelError, ModelResult, TimeoutSecs};

/// Process whose death a monitor source watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// The controller loop (`cntrlpid`).
    Cntrl,
    /// The managed service (`svcpid`).
    Svc,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cntrl => "cntrl",
            Self::Svc => "svc",
        }
    }

    /// KV key holding the PID of this subject.
    pub fn pid_key(&self) -> &'static str {
        match self {
            Self::Cntrl => crate::KEY_CNTRLPID,
            Self::Svc => crate::KEY_SVCPID,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event published by a controller monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Every watch is armed; always the first event of a run.
    Init,
    /// The monitor is shutting down; always the last event of a run.
    Exit,
    /// The configured wait elapsed.
    Timeout(TimeoutSecs),
    /// A watched process exited.
    Dead(Subject),
    /// A key appeared in the KV store.
    Create { key: String, value: String },
    /// An existing key was rewritten.
    Update { key: String, value: String },
    /// A key was removed.
    Delete { key: String },
}

impl MonitorEvent {
    /// Record kind as written on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Exit => "exit",
            Self::Timeout(_) => "TIMEOUT",
            Self::Dead(_) => "DEAD",
            Self::Create { .. } => "CREATE",
            Self::Update { .. } => "UPDATE",
            Self::Delete { .. } => "DELETE",
        }
    }
}

/// Outer/inner delimiter pair of the monitor sink format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delimiters {
    /// Separates the kind from its payload.
    pub outer: char,
    /// Separates payload fields.
    pub inner: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            outer: ':',
            inner: ',',
        }
    }
}

impl Delimiters {
    /// Render an event as a single record (without trailing newline).
    pub fn encode(&self, event: &MonitorEvent) -> String {
        let (o, i) = (self.outer, self.inner);
        match event {
            MonitorEvent::Init | MonitorEvent::Exit => event.kind().to_string(),
            MonitorEvent::Timeout(secs) => format!("TIMEOUT{o}{secs}"),
            MonitorEvent::Dead(subject) => format!("DEAD{o}{subject}"),
            MonitorEvent::Create { key, value } => format!("CREATE{o}{key}{i}{value}"),
            MonitorEvent::Update { key, value } => format!("UPDATE{o}{key}{i}{value}"),
            MonitorEvent::Delete { key } => format!("DELETE{o}{key}"),
        }
    }

    /// Parse a single record.
    ///
    /// Values may themselves contain the inner delimiter (`status,complete,pass`);
    /// only the first one separates the key.
    pub fn decode(&self, line: &str) -> ModelResult<MonitorEvent> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (kind, payload) = match line.split_once(self.outer) {
            Some((k, p)) => (k, Some(p)),
            None => (line, None),
        };
        let unknown = || ModelError::UnknownEvent(line.to_string());

        match (kind, payload) {
            ("init", None) => Ok(MonitorEvent::Init),
            ("exit", None) => Ok(MonitorEvent::Exit),
            ("TIMEOUT", Some(p)) => p.parse().map(MonitorEvent::Timeout).map_err(|_| unknown()),
            ("DEAD", Some("cntrl")) => Ok(MonitorEvent::Dead(Subject::Cntrl)),
            ("DEAD", Some("svc")) => Ok(MonitorEvent::Dead(Subject::Svc)),
            ("CREATE", Some(p)) => {
                let (key, value) = p.split_once(self.inner).ok_or_else(unknown)?;
                Ok(MonitorEvent::Create {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            ("UPDATE", Some(p)) => {
                let (key, value) = p.split_once(self.inner).ok_or_else(unknown)?;
                Ok(MonitorEvent::Update {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            ("DELETE", Some(p)) if !p.is_empty() => Ok(MonitorEvent::Delete { key: p.to_string() }),
            _ => Err(unknown()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_default_delimiters() {
        let d = Delimiters::default();
        assert_eq!(d.encode(&MonitorEvent::Init), "init");
        assert_eq!(d.encode(&MonitorEvent::Timeout(10)), "TIMEOUT:10");
        assert_eq!(d.encode(&MonitorEvent::Dead(Subject::Svc)), "DEAD:svc");
        assert_eq!(
            d.encode(&MonitorEvent::Create {
                key: "svcpid".into(),
                value: "42".into()
            }),
            "CREATE:svcpid,42"
        );
        assert_eq!(
            d.encode(&MonitorEvent::Delete { key: "rc".into() }),
            "DELETE:rc"
        );
    }

    #[test]
    fn value_keeps_inner_delimiters() {
        let d = Delimiters::default();
        let ev = d.decode("UPDATE:status,complete,pass\n").unwrap();
        assert_eq!(
            ev,
            MonitorEvent::Update {
                key: "status".into(),
                value: "complete,pass".into()
            }
        );
    }

    #[test]
    fn custom_delimiters_roundtrip() {
        let d = Delimiters {
            outer: '|',
            inner: ';',
        };
        let ev = MonitorEvent::Update {
            key: "status".into(),
            value: "up".into(),
        };
        let line = d.encode(&ev);
        assert_eq!(line, "UPDATE|status;up");
        assert_eq!(d.decode(&line).unwrap(), ev);
    }

    #[test]
    fn rejects_unknown_records() {
        let d = Delimiters::default();
        for bad in ["", "INIT", "DEAD:vm", "MOVED:x", "CREATE:nokey", "DELETE:", "init:1"] {
            assert!(
                matches!(d.decode(bad), Err(ModelError::UnknownEvent(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn subject_maps_to_pid_key() {
        assert_eq!(Subject::Cntrl.pid_key(), "cntrlpid");
        assert_eq!(Subject::Svc.pid_key(), "svcpid");
    }
}
