use std::{fs::OpenOptions, path::Path, process::Stdio};

use nix::unistd::setsid;
use tokio::{
    io::AsyncWriteExt,
    process::{Child, Command},
};
use tracing::debug;

use crate::{ExecError, ExecPlan, ExecResult};

/// Spawn `program` as a detached session leader.
///
/// The child gets `/dev/null` on stdin and appends stdout/stderr to `log`;
/// the caller keeps no handle to it, so it survives the caller's exit.
/// Returns the child PID.
pub fn spawn_detached(program: &Path, args: &[String], log: &Path) -> ExecResult<u32> {
    if let Some(parent) = log.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let out = OpenOptions::new().create(true).append(true).open(log)?;
    let err = out.try_clone()?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .stderr(Stdio::from(err))
        .kill_on_drop(false);

    unsafe {
        cmd.pre_exec(|| {
            if let Err(errno) = setsid() {
                report_pre_exec_failure(b"setsid", errno as i32);
                return Err(errno.into());
            }
            Ok(())
        });
    }

    let child = cmd
        .spawn()
        .map_err(|e| ExecError::SpawnFailed(format!("{}: {e}", program.display())))?;
    let pid = child
        .id()
        .ok_or_else(|| ExecError::SpawnFailed(format!("{}: no pid", program.display())))?;

    debug!(pid, program = %program.display(), "detached process spawned");
    Ok(pid)
}

/// Report a failed `pre_exec` step as `warden-exec: <what> failed, errno=<n>`.
///
/// Runs between `fork` and `exec`: no allocation, only `write(2)` on stderr.
fn report_pre_exec_failure(what: &[u8], errno: i32) {
    let mut digits = [0u8; 12];
    let mut at = digits.len();
    let mut n = errno.unsigned_abs();
    loop {
        at -= 1;
        digits[at] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    for part in [
        b"warden-exec: ".as_slice(),
        what,
        b" failed, errno=",
        &digits[at..],
        b"\n",
    ] {
        unsafe {
            libc::write(libc::STDERR_FILENO, part.as_ptr().cast(), part.len());
        }
    }
}

/// Spawn the gated launcher for `plan`.
///
/// `program args` is expected to read an [`ExecPlan`] as JSON from stdin,
/// wait for its gate and then replace itself with the plan. The launcher is
/// placed in a new process group led by itself, so the service PID equals
/// the launcher PID and the whole tree can be signalled as one group.
pub async fn spawn_gated(program: &Path, args: &[String], plan: &ExecPlan) -> ExecResult<Child> {
    let payload = plan.to_json()?;

    let mut child = Command::new(program)
        .args(args)
        .process_group(0)
        .stdin(Stdio::piped())
        .kill_on_drop(false)
        .spawn()
        .map_err(|e| ExecError::SpawnFailed(format!("{}: {e}", program.display())))?;

    let Some(mut stdin) = child.stdin.take() else {
        return Err(ExecError::SpawnFailed("launcher stdin unavailable".into()));
    };
    stdin.write_all(payload.as_bytes()).await?;
    stdin.shutdown().await?;
    drop(stdin);

    debug!(pid = ?child.id(), plan = %plan, "gated launcher spawned");
    Ok(child)
}
