use sha2::{Digest, Sha256};

use crate::{ExecError, ExecResult};

const PROC_STAT: &str = "/proc/stat";

/// Hex digits kept from the digest.
const BOOT_ID_LEN: usize = 16;

/// Identifier of the current host boot.
///
/// Derived from the kernel's boot time, so it is stable for the whole uptime
/// and changes on every reboot: PIDs recorded under a different boot id are stale.
pub fn boot_id() -> ExecResult<String> {
    let stat = std::fs::read_to_string(PROC_STAT)?;
    boot_id_from_stat(&stat)
        .ok_or_else(|| ExecError::BootId(format!("no btime line in {PROC_STAT}")))
}

/// Compute a boot id from the contents of `/proc/stat`.
pub fn boot_id_from_stat(stat: &str) -> Option<String> {
    let btime = stat
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))?;

    let digest = Sha256::digest(btime.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(BOOT_ID_LEN);
    Some(id)
}
