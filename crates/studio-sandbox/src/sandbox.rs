// studio-sandbox/src/sandbox.rs
// ============================================================================
// Module: Studio Sandbox Runner
// Description: Subprocess execution with CWD/env/arg/stdin policy and timeout.
// Purpose: Implement the `Sandbox` trait's permission-gated `runCli` contract.
// Dependencies: tokio (process, time, io-util), studio-core
// ============================================================================

//! ## Overview
//! [`ProcessSandbox`] spawns subprocesses with no shell interpretation, closes
//! the child's stdin immediately so blocking-read tools terminate, truncates
//! captured output at a byte cap, and hard-kills on timeout. Every invocation
//! is preflighted against the [`PermissionManager`] for both the command and
//! the working directory before the child is spawned.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use studio_core::core::host::HostEnvironment;
use studio_core::interfaces::CliOutcome;
use studio_core::interfaces::CliRequest;
use studio_core::interfaces::PermissionManager;
use studio_core::interfaces::Sandbox;
use studio_core::interfaces::SandboxError;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// A permission-gated subprocess runner backed by `tokio::process`.
pub struct ProcessSandbox {
    permissions: Arc<dyn PermissionManager>,
    host: Arc<dyn HostEnvironment>,
    extra_path_dirs: Vec<String>,
}

impl ProcessSandbox {
    /// Builds a sandbox gated by `permissions`, consulting `host` only to
    /// check the desktop-only capability gate.
    #[must_use]
    pub fn new(permissions: Arc<dyn PermissionManager>, host: Arc<dyn HostEnvironment>) -> Self {
        Self {
            permissions,
            host,
            extra_path_dirs: common_tool_directories(),
        }
    }

    fn augmented_path(&self) -> String {
        let existing = std::env::var("PATH").unwrap_or_default();
        let mut parts: Vec<String> = self.extra_path_dirs.clone();
        parts.push(existing);
        parts.join(":")
    }
}

/// A fixed set of common tool directories appended to `PATH`, resolved for
/// the platform this runtime is built for.
fn common_tool_directories() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec![
            "/usr/local/bin".to_string(),
            "/opt/homebrew/bin".to_string(),
            "/usr/bin".to_string(),
        ]
    } else {
        vec!["/usr/local/bin".to_string(), "/usr/bin".to_string(), "/bin".to_string()]
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn run_cli(&self, request: CliRequest) -> Result<CliOutcome, SandboxError> {
        if !self.host.is_desktop() {
            return Err(SandboxError::UnsupportedEnvironment);
        }

        self.permissions.assert_cli_command(&request.command)?;
        self.permissions
            .assert_filesystem_path(&request.working_dir)?;

        let timeout_ms = request.timeout_ms.max(CliRequest::MIN_TIMEOUT_MS);
        let max_output_bytes = request.max_output_bytes.max(CliRequest::MIN_OUTPUT_BYTES);

        let mut env = overlay_env(&request.env);
        env.insert("PATH".to_string(), self.augmented_path());

        let mut command = Command::new(&request.command);
        command
            .args(&request.args)
            .current_dir(&request.working_dir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| SandboxError::Spawn(e.to_string()))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            SandboxError::Spawn("child stdout pipe unavailable".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            SandboxError::Spawn("child stderr pipe unavailable".to_string())
        })?;

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = tokio::spawn(drain_capped(stdout, max_output_bytes, stdout_buf.clone()));
        let stderr_task = tokio::spawn(drain_capped(stderr, max_output_bytes, stderr_buf.clone()));

        let wait_result = tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait()).await;

        match wait_result {
            Ok(Ok(status)) => {
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                Ok(CliOutcome {
                    exit_code: status.code().unwrap_or(1),
                    stdout: lock_or_recover(&stdout_buf).clone(),
                    stderr: lock_or_recover(&stderr_buf).clone(),
                    timed_out: false,
                })
            }
            Ok(Err(e)) => Err(SandboxError::Spawn(e.to_string())),
            Err(_elapsed) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                Ok(CliOutcome {
                    exit_code: 1,
                    stdout: lock_or_recover(&stdout_buf).clone(),
                    stderr: lock_or_recover(&stderr_buf).clone(),
                    timed_out: true,
                })
            }
        }
    }
}

/// Merges `overlay` on top of the current process environment: overlay keys
/// win on conflict, everything else from the current environment passes
/// through unchanged.
fn overlay_env(overlay: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = std::env::vars().collect();
    merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Reads `reader` to EOF, retaining only the first `cap` bytes in `sink` and
/// discarding the remainder so the child's pipe never fills and blocks it.
async fn drain_capped(
    mut reader: impl tokio::io::AsyncRead + Unpin,
    cap: usize,
    sink: Arc<Mutex<Vec<u8>>>,
) {
    let mut chunk = [0_u8; 8192];
    loop {
        let Ok(n) = reader.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        let mut buf = sink.lock().expect("lock");
        if buf.len() < cap {
            let take = (cap - buf.len()).min(n);
            buf.extend_from_slice(&chunk[..take]);
        }
    }
}

/// Locks `mutex`, recovering the inner value if a prior holder panicked
/// rather than propagating the poison (this buffer is diagnostic-only; a
/// poisoned writer must never take down the reader).
fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Resolves a relative path under the sandbox's host base path, for callers
/// that need an absolute working directory from a project-relative one.
#[must_use]
pub fn resolve_working_dir(host: &dyn HostEnvironment, relative: &std::path::Path) -> PathBuf {
    host.resolve_absolute(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_core::interfaces::PermissionError;

    struct AllowAll;
    impl PermissionManager for AllowAll {
        fn assert_filesystem_path(&self, _path: &std::path::Path) -> Result<(), PermissionError> {
            Ok(())
        }
        fn assert_cli_command(&self, _command: &str) -> Result<(), PermissionError> {
            Ok(())
        }
        fn assert_network_url(&self, _url: &str) -> Result<(), PermissionError> {
            Ok(())
        }
    }

    struct DenyAll;
    impl PermissionManager for DenyAll {
        fn assert_filesystem_path(&self, path: &std::path::Path) -> Result<(), PermissionError> {
            Err(PermissionError {
                capability: "filesystem",
                subject: path.display().to_string(),
            })
        }
        fn assert_cli_command(&self, command: &str) -> Result<(), PermissionError> {
            Err(PermissionError {
                capability: "cli",
                subject: command.to_string(),
            })
        }
        fn assert_network_url(&self, url: &str) -> Result<(), PermissionError> {
            Err(PermissionError {
                capability: "network",
                subject: url.to_string(),
            })
        }
    }

    struct FakeHost {
        desktop: bool,
        base: PathBuf,
    }

    impl HostEnvironment for FakeHost {
        fn read_binary(&self, _path: &std::path::Path) -> Result<Vec<u8>, studio_core::core::host::HostError> {
            unimplemented!("not exercised by sandbox tests")
        }
        fn write_binary(&self, _path: &std::path::Path, _bytes: &[u8]) -> Result<(), studio_core::core::host::HostError> {
            unimplemented!("not exercised by sandbox tests")
        }
        fn mkdir_all(&self, _path: &std::path::Path) -> Result<(), studio_core::core::host::HostError> {
            Ok(())
        }
        fn exists(&self, _path: &std::path::Path) -> bool {
            true
        }
        fn remove(&self, _path: &std::path::Path) -> Result<(), studio_core::core::host::HostError> {
            Ok(())
        }
        fn base_path(&self) -> &std::path::Path {
            &self.base
        }
        fn is_desktop(&self) -> bool {
            self.desktop
        }
    }

    fn request(command: &str, args: &[&str]) -> CliRequest {
        CliRequest {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir: std::env::temp_dir(),
            env: BTreeMap::new(),
            timeout_ms: CliRequest::DEFAULT_TIMEOUT_MS,
            max_output_bytes: CliRequest::DEFAULT_OUTPUT_BYTES,
        }
    }

    #[tokio::test]
    async fn denies_when_permission_manager_rejects() {
        let sandbox = ProcessSandbox::new(
            Arc::new(DenyAll),
            Arc::new(FakeHost {
                desktop: true,
                base: PathBuf::from("/"),
            }),
        );
        let err = sandbox.run_cli(request("echo", &["hi"])).await.unwrap_err();
        assert!(matches!(err, SandboxError::Permission(_)));
    }

    #[tokio::test]
    async fn fails_fast_on_non_desktop_hosts() {
        let sandbox = ProcessSandbox::new(
            Arc::new(AllowAll),
            Arc::new(FakeHost {
                desktop: false,
                base: PathBuf::from("/"),
            }),
        );
        let err = sandbox.run_cli(request("echo", &["hi"])).await.unwrap_err();
        assert!(matches!(err, SandboxError::UnsupportedEnvironment));
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let sandbox = ProcessSandbox::new(
            Arc::new(AllowAll),
            Arc::new(FakeHost {
                desktop: true,
                base: PathBuf::from("/"),
            }),
        );
        let outcome = sandbox
            .run_cli(request("printf", &["hello"]))
            .await
            .expect("run");
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, b"hello");
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn stdin_is_closed_so_blocking_reads_terminate() {
        let sandbox = ProcessSandbox::new(
            Arc::new(AllowAll),
            Arc::new(FakeHost {
                desktop: true,
                base: PathBuf::from("/"),
            }),
        );
        // `cat` with no args reads stdin to EOF; with stdin closed it exits
        // immediately instead of hanging for the full timeout.
        let mut req = request("cat", &[]);
        req.timeout_ms = 5_000;
        let outcome = sandbox.run_cli(req).await.expect("run");
        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn hard_kills_on_timeout() {
        let sandbox = ProcessSandbox::new(
            Arc::new(AllowAll),
            Arc::new(FakeHost {
                desktop: true,
                base: PathBuf::from("/"),
            }),
        );
        let mut req = request("sleep", &["5"]);
        req.timeout_ms = 200;
        let outcome = sandbox.run_cli(req).await.expect("run");
        assert!(outcome.timed_out);
    }

    #[tokio::test]
    async fn truncates_output_at_the_byte_cap() {
        let sandbox = ProcessSandbox::new(
            Arc::new(AllowAll),
            Arc::new(FakeHost {
                desktop: true,
                base: PathBuf::from("/"),
            }),
        );
        let mut req = request("yes", &[]);
        req.timeout_ms = 300;
        req.max_output_bytes = CliRequest::MIN_OUTPUT_BYTES;
        let outcome = sandbox.run_cli(req).await.expect("run");
        assert!(outcome.stdout.len() <= CliRequest::MIN_OUTPUT_BYTES);
    }
}
