//! Runs the decompiler for one archive under a wall-clock deadline.
//!
//! Each call spawns the child process and hands it to a supervisor task that
//! waits for exit and drains stdout/stderr. The caller waits on that task for
//! at most the deadline. When the deadline elapses the supervisor is cancelled,
//! kills the child, and is then detached. Output readers still attached to
//! pipes held open by grandchildren are left behind along with whatever they
//! had buffered; at most one such supervisor exists per timed-out attempt.
//!
//! On unix the decompiler runs in its own process group and the kill goes to
//! the whole group, so wrapper scripts take their children down with them.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BatchError;
use crate::state_machine::{Item, TaskOutcome};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(180);

/// How long a timed-out call waits for the supervisor to issue the kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// How the decompiler is launched: program, fixed leading arguments, and the
/// flag that introduces the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: PathBuf,
    leading_args: Vec<OsString>,
    output_flag: String,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>, leading_args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            leading_args,
            output_flag: "-od".to_string(),
        }
    }

    /// A `.jar` tool runs as `java -jar <tool>`; anything else is executed directly.
    pub fn for_tool(tool: &Path, java: &Path) -> Self {
        let is_jar = tool
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jar"));
        if is_jar {
            Self::new(java, vec!["-jar".into(), tool.as_os_str().to_owned()])
        } else {
            Self::new(tool, Vec::new())
        }
    }

    pub fn with_output_flag(mut self, flag: impl Into<String>) -> Self {
        self.output_flag = flag.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Fails unless the program resolves to an executable file, either as a
    /// path or as a bare name found on `PATH`.
    pub fn check_launchable(&self) -> Result<(), BatchError> {
        let not_launchable = |reason: &str| BatchError::ToolNotLaunchable {
            program: self.program.clone(),
            reason: reason.to_string(),
        };
        let resolved = resolve_program(&self.program).ok_or_else(|| not_launchable("not found"))?;
        if !is_executable(&resolved) {
            return Err(not_launchable("not executable"));
        }
        debug!(program = %resolved.display(), "launcher resolved");
        Ok(())
    }

    /// `<leading args> <input> <output flag> <output dir>`
    pub fn args_for(&self, input: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.push(input.as_os_str().to_owned());
        args.push(OsString::from(&self.output_flag));
        args.push(output_dir.as_os_str().to_owned());
        args
    }
}

fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.is_absolute() || program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .flat_map(|dir| {
            let plain = dir.join(program);
            let exe = cfg!(windows).then(|| plain.with_extension("exe"));
            std::iter::once(plain).chain(exe)
        })
        .find(|candidate| candidate.is_file() && is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Executes one attempt for one item.
pub trait TaskRunner {
    /// Budget for a single attempt.
    fn deadline(&self) -> Duration;

    /// Checked once before the first item; a failure aborts the batch.
    fn check_launchable(&self) -> Result<(), BatchError> {
        Ok(())
    }

    fn run(&self, item: &Item) -> impl Future<Output = TaskOutcome>;
}

/// [`TaskRunner`] backed by an external decompiler process.
#[derive(Debug, Clone)]
pub struct DecompilerRunner {
    tool: ToolCommand,
    output_root: PathBuf,
    deadline: Duration,
}

impl DecompilerRunner {
    pub fn new(tool: ToolCommand, output_root: impl Into<PathBuf>, deadline: Duration) -> Self {
        Self {
            tool,
            output_root: output_root.into(),
            deadline,
        }
    }
}

impl TaskRunner for DecompilerRunner {
    fn deadline(&self) -> Duration {
        self.deadline
    }

    fn check_launchable(&self) -> Result<(), BatchError> {
        self.tool.check_launchable()
    }

    async fn run(&self, item: &Item) -> TaskOutcome {
        let output_dir = item.output_dir(&self.output_root);
        let input = std::path::absolute(&item.source).unwrap_or_else(|_| item.source.clone());

        let mut cmd = Command::new(self.tool.program());
        cmd.args(self.tool.args_for(&input, &output_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(
            item = %item.id,
            program = %self.tool.program().display(),
            output = %output_dir.display(),
            "spawning decompiler"
        );

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(item = %item.id, error = %err, "failed to launch decompiler");
                return TaskOutcome::Failed {
                    diagnostic: format!(
                        "failed to launch {}: {err}",
                        self.tool.program().display()
                    ),
                };
            }
        };

        let cancel = CancellationToken::new();
        let (killed_tx, killed_rx) = oneshot::channel();
        let mut supervisor = tokio::spawn(supervise(child, cancel.clone(), killed_tx));

        match timeout(self.deadline, &mut supervisor).await {
            Ok(Ok(Ok(finished))) => {
                debug!(
                    item = %item.id,
                    exit_code = ?finished.status.code(),
                    stdout_bytes = finished.stdout.len(),
                    "decompiler exited"
                );
                finished.into_outcome()
            }
            Ok(Ok(Err(err))) => TaskOutcome::Failed {
                diagnostic: format!("failed to wait for decompiler: {err}"),
            },
            Ok(Err(err)) => TaskOutcome::Failed {
                diagnostic: format!("decompiler supervisor aborted: {err}"),
            },
            Err(_) => {
                warn!(
                    item = %item.id,
                    deadline_secs = self.deadline.as_secs(),
                    "deadline elapsed; killing decompiler"
                );
                cancel.cancel();
                match timeout(KILL_GRACE, killed_rx).await {
                    Ok(Ok(Ok(()))) => debug!(item = %item.id, "kill issued"),
                    Ok(Ok(Err(err))) => {
                        warn!(item = %item.id, error = %err, "failed to kill decompiler")
                    }
                    Ok(Err(_)) | Err(_) => {
                        warn!(item = %item.id, "kill not confirmed within grace period")
                    }
                }
                // Detached, never joined.
                drop(supervisor);
                TaskOutcome::TimedOut
            }
        }
    }
}

/// What a process that exited on its own left behind.
struct Finished {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl Finished {
    fn into_outcome(self) -> TaskOutcome {
        if self.status.success() {
            return TaskOutcome::Succeeded;
        }
        let stderr = self.stderr.trim();
        let diagnostic = if stderr.is_empty() {
            format!("decompiler exited with {}", self.status)
        } else {
            stderr.to_string()
        };
        TaskOutcome::Failed { diagnostic }
    }
}

async fn supervise(
    mut child: Child,
    cancel: CancellationToken,
    killed: oneshot::Sender<io::Result<()>>,
) -> io::Result<Finished> {
    let mut group = GroupGuard(child.id());
    let stdout = child.stdout.take().map(|s| tokio::spawn(read_all(s)));
    let stderr = child.stderr.take().map(|s| tokio::spawn(read_all(s)));

    let status = tokio::select! {
        status = child.wait() => status?,
        () = cancel.cancelled() => {
            let by_group = kill_group(group.disarm());
            let direct = child.start_kill();
            let _ = killed.send(by_group.and(direct));
            let _ = child.wait().await;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "killed after deadline"));
        }
    };

    // The child is gone, but a grandchild may still hold the pipes open.
    let output = async move { (collect(stdout).await, collect(stderr).await) };
    tokio::select! {
        (stdout, stderr) = output => {
            group.disarm();
            Ok(Finished { status, stdout, stderr })
        }
        () = cancel.cancelled() => {
            let _ = killed.send(kill_group(group.disarm()));
            Err(io::Error::new(io::ErrorKind::TimedOut, "output capture abandoned after deadline"))
        }
    }
}

/// Kills the decompiler's process group if the supervisor is dropped while
/// the attempt is still live, e.g. when the runtime shuts down on Ctrl-C.
struct GroupGuard(Option<u32>);

impl GroupGuard {
    fn disarm(&mut self) -> Option<u32> {
        self.0.take()
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Err(err) = kill_group(self.0.take()) {
            warn!(error = %err, "failed to kill decompiler process group");
        }
    }
}

/// SIGKILL to the process group led by the decompiler. A group that no
/// longer exists counts as killed.
#[cfg(unix)]
fn kill_group(group: Option<u32>) -> io::Result<()> {
    let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return Ok(());
    };
    // SAFETY: plain syscall; the group was created for this child by `process_group(0)`.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) -> io::Result<()> {
    Ok(())
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn collect(reader: Option<JoinHandle<io::Result<Vec<u8>>>>) -> String {
    let Some(task) = reader else {
        return String::new();
    };
    match task.await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(Err(err)) => {
            warn!(error = %err, "output capture failed");
            String::new()
        }
        Err(err) => {
            warn!(error = %err, "output reader panicked");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jar_tools_run_through_java() {
        let cmd = ToolCommand::for_tool(Path::new("/opt/jd-cli.jar"), Path::new("java"));
        assert_eq!(cmd.program(), Path::new("java"));
        let args = cmd.args_for(Path::new("/lib/a.jar"), Path::new("out/a"));
        assert_eq!(
            args,
            vec!["-jar", "/opt/jd-cli.jar", "/lib/a.jar", "-od", "out/a"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn native_tools_run_directly() {
        let cmd = ToolCommand::for_tool(Path::new("/usr/bin/jd-cli"), Path::new("java"))
            .with_output_flag("--outputDir");
        assert_eq!(cmd.program(), Path::new("/usr/bin/jd-cli"));
        let args = cmd.args_for(Path::new("/lib/a.jar"), Path::new("out/a"));
        assert_eq!(
            args,
            vec!["/lib/a.jar", "--outputDir", "out/a"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn missing_java_is_not_launchable() {
        let cmd = ToolCommand::for_tool(Path::new("jd-cli.jar"), Path::new("/no/such/java"));
        match cmd.check_launchable() {
            Err(BatchError::ToolNotLaunchable { program, reason }) => {
                assert_eq!(program, PathBuf::from("/no/such/java"));
                assert_eq!(reason, "not found");
            }
            other => panic!("expected ToolNotLaunchable, got {other:?}"),
        }
    }

    #[test]
    fn unknown_bare_name_is_not_launchable() {
        let cmd = ToolCommand::new("jarsweep-no-such-launcher", Vec::new());
        assert!(matches!(
            cmd.check_launchable(),
            Err(BatchError::ToolNotLaunchable { .. })
        ));
    }

    #[cfg(unix)]
    mod process {
        use super::super::*;
        use std::fs;
        use std::time::Instant;
        use tempfile::TempDir;

        /// Runs `body` with `sh`; inside it `$1` is the input, `$2` the output
        /// flag and `$3` the output directory.
        fn sh_tool(dir: &Path, body: &str) -> ToolCommand {
            let script = dir.join("tool.sh");
            fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
            ToolCommand::new("sh", vec![script.into_os_string()])
        }

        #[test]
        fn bare_name_resolves_on_path() {
            assert!(ToolCommand::new("sh", Vec::new()).check_launchable().is_ok());
        }

        #[test]
        fn native_tool_needs_exec_bit() {
            use std::os::unix::fs::PermissionsExt;

            let tmp = TempDir::new().unwrap();
            let tool = tmp.path().join("jd-cli");
            fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
            fs::set_permissions(&tool, fs::Permissions::from_mode(0o644)).unwrap();
            let cmd = ToolCommand::for_tool(&tool, Path::new("java"));
            match cmd.check_launchable() {
                Err(BatchError::ToolNotLaunchable { reason, .. }) => assert_eq!(reason, "not executable"),
                other => panic!("expected ToolNotLaunchable, got {other:?}"),
            }

            fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
            assert!(cmd.check_launchable().is_ok());
        }

        fn item(dir: &Path) -> Item {
            Item::from_path(&dir.join("lib").join("a.jar")).unwrap()
        }

        #[tokio::test]
        async fn zero_exit_succeeds_and_writes_output() {
            let tmp = TempDir::new().unwrap();
            let tool = sh_tool(
                tmp.path(),
                r#"mkdir -p "$3" && echo 'class A {}' > "$3/A.java""#,
            );
            let out = tmp.path().join("out");
            let runner = DecompilerRunner::new(tool, &out, Duration::from_secs(10));

            assert_eq!(runner.run(&item(tmp.path())).await, TaskOutcome::Succeeded);
            assert!(out.join("a").join("A.java").is_file());
        }

        #[tokio::test]
        async fn input_is_passed_as_absolute_path() {
            let tmp = TempDir::new().unwrap();
            let record = tmp.path().join("args.txt");
            let tool = sh_tool(
                tmp.path(),
                &format!(r#"printf '%s\n' "$1" "$2" > "{}""#, record.display()),
            );
            let runner = DecompilerRunner::new(tool, tmp.path().join("out"), Duration::from_secs(10));
            let rel = Item::from_path(Path::new("lib/a.jar")).unwrap();

            assert_eq!(runner.run(&rel).await, TaskOutcome::Succeeded);
            let recorded = fs::read_to_string(&record).unwrap();
            let mut lines = recorded.lines();
            assert!(Path::new(lines.next().unwrap()).is_absolute());
            assert_eq!(lines.next(), Some("-od"));
        }

        #[tokio::test]
        async fn nonzero_exit_reports_stderr() {
            let tmp = TempDir::new().unwrap();
            let tool = sh_tool(tmp.path(), "echo 'java.util.zip.ZipException: bad header' >&2\nexit 3");
            let runner = DecompilerRunner::new(tool, tmp.path().join("out"), Duration::from_secs(10));

            match runner.run(&item(tmp.path())).await {
                TaskOutcome::Failed { diagnostic } => {
                    assert_eq!(diagnostic, "java.util.zip.ZipException: bad header");
                }
                other => panic!("expected Failed, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn silent_failure_reports_exit_status() {
            let tmp = TempDir::new().unwrap();
            let tool = sh_tool(tmp.path(), "exit 4");
            let runner = DecompilerRunner::new(tool, tmp.path().join("out"), Duration::from_secs(10));

            match runner.run(&item(tmp.path())).await {
                TaskOutcome::Failed { diagnostic } => assert!(diagnostic.contains('4'), "{diagnostic}"),
                other => panic!("expected Failed, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn crash_keeps_partial_stderr() {
            let tmp = TempDir::new().unwrap();
            let tool = sh_tool(tmp.path(), "echo 'decompiling org/example' >&2\nkill -9 $$");
            let runner = DecompilerRunner::new(tool, tmp.path().join("out"), Duration::from_secs(10));

            match runner.run(&item(tmp.path())).await {
                TaskOutcome::Failed { diagnostic } => {
                    assert_eq!(diagnostic, "decompiling org/example");
                }
                other => panic!("expected Failed, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn missing_program_fails_without_panicking() {
            let tmp = TempDir::new().unwrap();
            let tool = ToolCommand::new(tmp.path().join("no-such-decompiler"), Vec::new());
            let runner = DecompilerRunner::new(tool, tmp.path().join("out"), Duration::from_secs(10));

            match runner.run(&item(tmp.path())).await {
                TaskOutcome::Failed { diagnostic } => {
                    assert!(diagnostic.starts_with("failed to launch"), "{diagnostic}");
                }
                other => panic!("expected Failed, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn deadline_kills_the_process() {
            let tmp = TempDir::new().unwrap();
            let marker = tmp.path().join("finished");
            let tool = sh_tool(
                tmp.path(),
                &format!(r#"sleep 2; touch "{}""#, marker.display()),
            );
            let deadline = Duration::from_millis(300);
            let runner = DecompilerRunner::new(tool, tmp.path().join("out"), deadline);

            let started = Instant::now();
            let outcome = runner.run(&item(tmp.path())).await;
            let waited = started.elapsed();

            assert_eq!(outcome, TaskOutcome::TimedOut);
            assert!(waited >= deadline);
            assert!(waited < deadline + Duration::from_secs(5), "waited {waited:?}");

            // The shell was killed, so it never reaches the line after `sleep`.
            tokio::time::sleep(Duration::from_secs(3)).await;
            assert!(!marker.exists());
        }

        #[tokio::test]
        async fn deadline_kills_background_children_too() {
            let tmp = TempDir::new().unwrap();
            let marker = tmp.path().join("finished");
            let tool = sh_tool(
                tmp.path(),
                &format!("(sleep 2; touch \"{}\") &\nwait", marker.display()),
            );
            let runner = DecompilerRunner::new(tool, tmp.path().join("out"), Duration::from_millis(300));

            assert_eq!(runner.run(&item(tmp.path())).await, TaskOutcome::TimedOut);

            tokio::time::sleep(Duration::from_secs(3)).await;
            assert!(!marker.exists());
        }

        #[tokio::test]
        async fn runner_is_reusable_after_timeout() {
            let tmp = TempDir::new().unwrap();
            let seen = tmp.path().join("seen");
            let tool = sh_tool(
                tmp.path(),
                &format!(
                    r#"if [ -e "{0}" ]; then exit 0; fi
touch "{0}"
sleep 5"#,
                    seen.display()
                ),
            );
            let runner = DecompilerRunner::new(tool, tmp.path().join("out"), Duration::from_millis(500));

            assert_eq!(runner.run(&item(tmp.path())).await, TaskOutcome::TimedOut);
            assert_eq!(runner.run(&item(tmp.path())).await, TaskOutcome::Succeeded);
        }
    }
}
