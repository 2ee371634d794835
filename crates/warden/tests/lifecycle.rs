//! End-to-end tests driving the `warden` executable against scratch state directories.
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};

use tempfile::TempDir;

static DEFINITIONS: AtomicUsize = AtomicUsize::new(0);

struct Fixture {
    tmp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            tmp: TempDir::new().unwrap(),
        }
    }

    fn state(&self) -> PathBuf {
        self.tmp.path().join("state")
    }

    fn warden(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_warden"))
            .args(args)
            .output()
            .unwrap()
    }

    /// Run a subcommand against this fixture's state directory.
    fn run(&self, cmd: &str, extra: &[&str]) -> Output {
        let state = self.state();
        let mut args = vec![cmd, "--state", state.to_str().unwrap()];
        args.extend_from_slice(extra);
        self.warden(&args)
    }

    fn definition(&self, cmd: &str, argv: &[&str], timeout: u64) -> PathBuf {
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        let doc = serde_json::json!({
            "cmd": cmd,
            "argv": argv,
            "env": {},
            "cwd": self.tmp.path(),
            "stdin": "/dev/null",
            "stdout": self.tmp.path().join("svc.out"),
            "stderr": self.tmp.path().join("svc.err"),
            "uid": uid,
            "gid": gid,
            "timeout": timeout,
        });
        let n = DEFINITIONS.fetch_add(1, Ordering::Relaxed);
        let path = self.tmp.path().join(format!("def-{n}.json"));
        fs::write(&path, doc.to_string()).unwrap();
        path
    }

    fn up_with(&self, def: &Path) -> Output {
        self.run("up", &["--definition", def.to_str().unwrap()])
    }

    fn kv(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.state().join("kv").join(key))
            .ok()
            .map(|v| v.trim().to_string())
    }

    fn set_kv(&self, key: &str, value: &str) {
        fs::write(self.state().join("kv").join(key), value).unwrap();
    }

    fn pid(&self, key: &str) -> i32 {
        self.kv(key)
            .unwrap_or_else(|| panic!("{key} not recorded"))
            .parse()
            .unwrap()
    }

    fn wait_for_status(&self, want: &str, limit: Duration) {
        let ok = wait_until(limit, || self.kv("status").as_deref() == Some(want));
        assert!(ok, "status {:?} never became {want}; log:\n{}", self.kv("status"), self.log());
    }

    fn log(&self) -> String {
        fs::read_to_string(self.state().join("controller.log")).unwrap_or_default()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        // Never leave a service behind, whatever the test outcome.
        for key in ["svcpid", "cntrlpid"] {
            if let Some(pid) = self.kv(key).and_then(|v| v.parse::<i32>().ok()) {
                if pid > 1 {
                    unsafe {
                        if key == "svcpid" {
                            libc::killpg(pid, libc::SIGKILL);
                        } else {
                            libc::kill(pid, libc::SIGKILL);
                        }
                    }
                }
            }
        }
    }
}

fn wait_until(limit: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    pred()
}

/// Running and not a zombie awaiting its reaper.
fn alive(pid: i32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| !rest.trim_start().starts_with('Z')),
        Err(_) => false,
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn short_service_runs_to_complete_pass() {
    let fx = Fixture::new();
    let def = fx.definition("/bin/sleep", &["2"], 0);

    let out = fx.up_with(&def);
    assert!(out.status.success(), "up failed: {}", stderr(&out));
    assert!(stdout(&out).contains("svcpid"));
    assert!(fx.kv("svcpid").is_some());
    assert!(fx.kv("name").is_some_and(|n| !n.is_empty()));

    fx.wait_for_status("complete,pass", Duration::from_secs(10));
    assert!(fx.kv("rc").is_none());
    assert!(fx.state().join("service.json").is_file());
}

#[test]
fn failing_service_records_exit_code() {
    let fx = Fixture::new();
    let def = fx.definition("/bin/sh", &["-c", "sleep 0.5; exit 4"], 0);

    let out = fx.up_with(&def);
    assert!(out.status.success(), "up failed: {}", stderr(&out));

    fx.wait_for_status("complete,fail", Duration::from_secs(10));
    assert_eq!(fx.kv("rc").as_deref(), Some("4"));

    let out = fx.up_with(&def);
    assert!(!out.status.success(), "up on a completed controller must be refused");
    let out = fx.run("purge", &[]);
    assert!(!out.status.success(), "purge of a completed controller must be refused");
}

#[test]
fn service_gets_only_its_declared_environment() {
    let fx = Fixture::new();
    let def = fx.definition("/usr/bin/env", &[], 0);

    let out = fx.up_with(&def);
    assert!(out.status.success(), "up failed: {}", stderr(&out));
    fx.wait_for_status("complete,pass", Duration::from_secs(10));

    let env = fs::read_to_string(fx.tmp.path().join("svc.out")).unwrap();
    let names: Vec<&str> = env.lines().filter_map(|l| l.split('=').next()).collect();
    assert_eq!(names, vec!["PATH"], "unexpected environment:\n{env}");
}

#[test]
fn up_down_purge_cycle() {
    let fx = Fixture::new();
    let def = fx.definition("/bin/sleep", &["30"], 0);

    let out = fx.up_with(&def);
    assert!(out.status.success(), "up failed: {}", stderr(&out));
    let svcpid = fx.pid("svcpid");
    let cntrlpid = fx.pid("cntrlpid");
    assert!(alive(svcpid) && alive(cntrlpid));

    // Second up on the same boot is a no-op.
    let out = fx.run("up", &[]);
    assert!(out.status.success(), "idempotent up failed: {}", stderr(&out));
    assert!(stdout(&out).contains("already running"));
    assert_eq!(fx.pid("svcpid"), svcpid);

    // A new definition is never accepted once one is recorded.
    let other = fx.definition("/bin/true", &[], 0);
    let out = fx.up_with(&other);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("definition"), "{}", stderr(&out));
    assert_eq!(fx.kv("status").as_deref(), Some("up"));

    let out = fx.run("purge", &[]);
    assert!(!out.status.success(), "purge while up must be refused");

    let out = fx.run("down", &[]);
    assert!(out.status.success(), "down failed: {}", stderr(&out));
    assert_eq!(fx.kv("status").as_deref(), Some("down"));
    assert!(wait_until(Duration::from_secs(5), || !alive(svcpid)), "service leaked");
    assert!(wait_until(Duration::from_secs(5), || !alive(cntrlpid)), "controller leaked");

    let out = fx.run("purge", &[]);
    assert!(out.status.success(), "purge failed: {}", stderr(&out));
    let left: Vec<_> = fs::read_dir(fx.state().join("kv")).unwrap().collect();
    assert!(left.is_empty());
    assert!(!fx.state().join("service.json").exists());
}

#[test]
fn down_then_up_respawns() {
    let fx = Fixture::new();
    let def = fx.definition("/bin/sleep", &["30"], 0);

    assert!(fx.up_with(&def).status.success());
    let first = fx.pid("svcpid");
    assert!(fx.run("down", &[]).status.success());

    let out = fx.run("up", &[]);
    assert!(out.status.success(), "respawn failed: {}", stderr(&out));
    let second = fx.pid("svcpid");
    assert_ne!(first, second);
    assert_eq!(fx.kv("status").as_deref(), Some("up"));
    assert!(fx.run("down", &[]).status.success());
}

#[test]
fn record_from_another_boot_is_respawned() {
    let fx = Fixture::new();
    let def = fx.definition("/bin/sleep", &["30"], 0);

    assert!(fx.up_with(&def).status.success());
    let current_boot = fx.kv("bootid").unwrap();
    assert!(fx.run("down", &[]).status.success());

    // As if the host rebooted while the controller was up.
    fx.set_kv("status", "up");
    fx.set_kv("bootid", "0000000000000000");

    let status = fx.run("status", &["--json"]);
    let report: serde_json::Value = serde_json::from_slice(&status.stdout).unwrap();
    assert_eq!(report["stale"], true);
    assert_eq!(report["condition"], "stale");

    let out = fx.run("up", &[]);
    assert!(out.status.success(), "respawn failed: {}", stderr(&out));
    assert!(stdout(&out).contains("service spawned"));
    assert_eq!(fx.kv("bootid").as_deref(), Some(current_boot.as_str()));
    assert!(fx.run("down", &[]).status.success());
}

#[test]
fn unresponsive_controller_is_killed_and_left_undefined() {
    let fx = Fixture::new();
    let def = fx.definition("/bin/sleep", &["30"], 0);

    assert!(fx.up_with(&def).status.success());
    let cntrlpid = fx.pid("cntrlpid");
    let svcpid = fx.pid("svcpid");
    unsafe {
        libc::kill(cntrlpid, libc::SIGSTOP);
    }

    let out = fx.run("down", &["--timeout", "1"]);
    assert!(!out.status.success(), "abandoned down must be reported as failure");
    assert_eq!(fx.kv("status").as_deref(), Some("undefined"));
    assert!(wait_until(Duration::from_secs(5), || !alive(cntrlpid)));
    assert!(wait_until(Duration::from_secs(5), || !alive(svcpid)));

    let out = fx.run("up", &[]);
    assert!(!out.status.success(), "undefined needs manual intervention");
}

#[test]
fn term_ignoring_service_is_killed_by_the_forceful_stop() {
    let fx = Fixture::new();
    let ready = fx.tmp.path().join("trapped");
    let script = format!("trap '' TERM; touch '{}'; sleep 30", ready.display());
    let def = fx.definition("/bin/sh", &["-c", &script], 0);

    assert!(fx.up_with(&def).status.success());
    let cntrlpid = fx.pid("cntrlpid");
    let svcpid = fx.pid("svcpid");
    assert!(wait_until(Duration::from_secs(5), || ready.exists()));

    let started = Instant::now();
    let out = fx.run("down", &["--timeout", "1"]);
    assert!(out.status.success(), "down failed: {}", stderr(&out));
    assert!(stdout(&out).contains("stopped (forced)"), "{}", stdout(&out));
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(fx.kv("status").as_deref(), Some("down"));
    assert!(wait_until(Duration::from_secs(5), || !alive(svcpid)), "service leaked");
    assert!(wait_until(Duration::from_secs(5), || !alive(cntrlpid)), "controller leaked");
}

#[test]
fn status_reports_running_controller() {
    let fx = Fixture::new();
    let def = fx.definition("/bin/sleep", &["30"], 0);
    assert!(fx.up_with(&def).status.success());

    let out = fx.run("status", &["--json"]);
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["status"], "up");
    assert_eq!(report["condition"], "running");
    assert_eq!(report["cntrl_alive"], true);
    assert_eq!(report["svc_alive"], true);

    let text = stdout(&fx.run("status", &[]));
    assert!(text.contains("condition: running"), "{text}");
    assert!(fx.run("down", &[]).status.success());
}

#[test]
fn definition_problems_are_rejected_before_spawning() {
    let fx = Fixture::new();

    let out = fx.run("up", &[]);
    assert!(!out.status.success(), "first up without a definition must fail");

    let def = fx.definition("/bin/sleep", &["2"], 5);
    let out = fx.up_with(&def);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("unsupported"), "{}", stderr(&out));

    let def = fx.definition("sleep", &["2"], 0);
    let out = fx.up_with(&def);
    assert!(!out.status.success());
    assert!(fx.kv("status").is_none());
    assert!(fx.kv("cntrlpid").is_none());
}

#[test]
fn standalone_monitor_writes_records_to_sink() {
    let fx = Fixture::new();
    let sink = fx.tmp.path().join("events");

    let out = fx.run("monitor", &["--timeout", "1", "--sink", sink.to_str().unwrap()]);
    assert!(out.status.success(), "monitor failed: {}", stderr(&out));
    assert_eq!(fs::read_to_string(&sink).unwrap(), "init\nTIMEOUT:1\nexit\n");
}
