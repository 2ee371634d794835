use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize, Serializer};

use crate::ModelError;

/// Lifecycle state of a controller, stored under the `status` key.
///
/// Transitions (see [`ControllerStatus::can_transition_to`]):
/// - `undefined` -> `up`
/// - `up` -> `up` (stale boot) | `down` | `error` | `complete,pass` | `complete,fail` | `restarting`
/// - `restarting` -> `up` | `error`
/// - `down` -> `up`
/// - `error`, `complete,*` are terminal until cleared by an administrative action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerStatus {
    /// State is unknown or unreliable (e.g. after a process-group kill).
    Undefined,
    /// Controller loop and service are running.
    Up,
    /// Controller was stopped cleanly.
    Down,
    /// Bringing the controller up failed; the `error` key holds the cause.
    Error,
    /// Service is between two runs.
    ///
    /// Representable and observable from outside, but the baseline loop never restarts.
    Restarting,
    /// Service exited with code 0.
    CompletePass,
    /// Service exited with a non-zero code; the `rc` key holds it.
    CompleteFail,
}

impl ControllerStatus {
    /// Text form stored in the KV store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Up => "up",
            Self::Down => "down",
            Self::Error => "error",
            Self::Restarting => "restarting",
            Self::CompletePass => "complete,pass",
            Self::CompleteFail => "complete,fail",
        }
    }

    /// Returns `true` for `complete,pass` and `complete,fail`.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::CompletePass | Self::CompleteFail)
    }

    /// Returns `true` if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ControllerStatus) -> bool {
        use ControllerStatus::*;
        match (self, next) {
            (Undefined, Up) => true,
            // A record left over from a previous boot is brought up again.
            (Up, Up) => true,
            (Up, Down | Error | CompletePass | CompleteFail | Restarting) => true,
            (Restarting, Up | Error) => true,
            (Down, Up) => true,
            // Administrative overrides: failure and loss of control are reachable from anywhere.
            (_, Error | Undefined) => true,
            // Bringing down a finished controller.
            (CompletePass | CompleteFail, Down) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControllerStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "undefined" => Ok(Self::Undefined),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "error" => Ok(Self::Error),
            "restarting" => Ok(Self::Restarting),
            "complete,pass" => Ok(Self::CompletePass),
            "complete,fail" => Ok(Self::CompleteFail),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

impl Serialize for ControllerStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ControllerStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
