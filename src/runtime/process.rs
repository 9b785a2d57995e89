//! External command execution with captured output and an optional deadline.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::RealRuntime;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// Exit code, `-1` when the process was killed or terminated by a signal
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    /// The deadline passed and the process was killed
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0 && !self.timed_out
    }
}

impl RealRuntime {
    #[tracing::instrument(skip(self, args))]
    pub(crate) fn run_command_impl(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        debug!("Running {:?} {}", program, args.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a kill also reaches whatever the child started
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start {:?}", program))?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let (status, timed_out) = match timeout {
            None => (Some(child.wait().context("Failed to wait for child process")?), false),
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    if let Some(status) = child.try_wait().context("Failed to poll child process")? {
                        break (Some(status), false);
                    }
                    if Instant::now() >= deadline {
                        warn!("{:?} exceeded {:?}, killing it", program, limit);
                        kill_tree(&mut child);
                        break (None, true);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let mut stderr = stderr_reader.join().unwrap_or_default();
        if timed_out
            && let Some(limit) = timeout
        {
            stderr.push_str(&format!("timed out after {:?}\n", limit));
        }

        Ok(CommandOutput {
            code: status.and_then(|s| s.code()).unwrap_or(-1),
            stdout,
            stderr,
            timed_out,
        })
    }
}

/// Kill the child together with its process group. Grandchildren hold the
/// output pipes open otherwise.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
            debug!("Failed to kill process group of {}: {}", child.id(), e);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}
