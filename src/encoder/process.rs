//! Encoder child process fed through its stdin
//!
//! Frames are written synchronously on the caller's thread. Closing the sink
//! sends end-of-input and waits for the encoder to finalize the container,
//! escalating to SIGTERM and then SIGKILL if it hangs.

use std::io::{self, Write};
use std::process::{Child, ChildStdin, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::command::{EncoderCommand, EncoderSettings};
use super::FrameSink;
use crate::capture::Frame;
use crate::error::{RecorderError, WriteError};
use crate::session::Session;

/// Grace period between SIGTERM and SIGKILL
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Poll interval while waiting for the encoder to exit
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Shared handle to a running encoder process
///
/// Lets another thread stop an encoder whose stdin writer is blocked. The
/// child is only ever waited on through this mutex, so a signal is never sent
/// to a PID that has already been reaped.
#[derive(Clone)]
pub struct EncoderHandle {
    child: Arc<Mutex<Child>>,
}

impl EncoderHandle {
    fn new(child: Child) -> Self {
        Self {
            child: Arc::new(Mutex::new(child)),
        }
    }

    /// Whether the encoder has not exited yet
    pub fn is_running(&self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// SIGTERM, then SIGKILL if the encoder ignores it. Reaps the child.
    pub fn terminate(&self) -> io::Result<ExitStatus> {
        #[cfg(unix)]
        {
            {
                let mut child = self.lock()?;
                if let Some(status) = child.try_wait()? {
                    return Ok(status);
                }
                let pid = child.id() as libc::pid_t;
                unsafe {
                    libc::kill(pid, libc::SIGTERM);
                }
            }
            if let Some(status) = self.wait_timeout(TERMINATE_GRACE)? {
                return Ok(status);
            }
            warn!("Encoder ignored SIGTERM, killing");
        }

        let mut child = self.lock()?;
        child.kill()?;
        child.wait()
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Child>> {
        self.child
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "encoder handle poisoned"))
    }

    fn try_wait(&self) -> io::Result<Option<ExitStatus>> {
        self.lock()?.try_wait()
    }

    fn id(&self) -> Option<u32> {
        self.lock().ok().map(|child| child.id())
    }

    /// Wait up to `timeout` for the child to exit
    fn wait_timeout(&self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(WAIT_POLL);
        }
    }
}

/// Encoder process consuming raw frames on stdin
///
/// On unix, spawning switches SIGPIPE from its default action to ignored
/// (unless the host installed its own handler), so a write into an exited
/// encoder fails with `EPIPE` instead of terminating the host process.
pub struct ProcessSink {
    handle: Option<EncoderHandle>,
    stdin: Option<ChildStdin>,
    program: String,
    frame_len: usize,
    frames_written: u64,
    close_timeout: Duration,
}

impl ProcessSink {
    /// Spawn the ffmpeg encoder for a session
    pub fn open(session: &Session, settings: &EncoderSettings) -> Result<Self, RecorderError> {
        let command = EncoderCommand::ffmpeg(settings, session);
        Self::spawn(
            &command,
            session.frame_len(),
            Duration::from_secs(settings.close_timeout_secs),
        )
    }

    /// Spawn `command` and take ownership of its stdin
    pub fn spawn(
        command: &EncoderCommand,
        frame_len: usize,
        close_timeout: Duration,
    ) -> Result<Self, RecorderError> {
        info!("Launching encoder: {}", command);

        let spawn_error = |reason: String| RecorderError::ProcessSpawn {
            program: command.program().to_string(),
            reason,
        };

        #[cfg(unix)]
        ignore_sigpipe();

        let mut child = command
            .to_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_error("stdin was not captured".to_string()));
        };

        // An encoder that rejects its arguments usually dies right away
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(spawn_error(format!("exited immediately with {}", status)));
            }
            Ok(None) => {}
            Err(e) => warn!("Could not poll encoder status: {}", e),
        }

        debug!("Encoder started with PID {}", child.id());

        Ok(Self {
            handle: Some(EncoderHandle::new(child)),
            stdin: Some(stdin),
            program: command.program().to_string(),
            frame_len,
            frames_written: 0,
            close_timeout,
        })
    }

    /// PID of the running encoder
    pub fn id(&self) -> Option<u32> {
        self.handle.as_ref().and_then(EncoderHandle::id)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

impl FrameSink for ProcessSink {
    fn write_frame(&mut self, frame: Frame) -> Result<(), WriteError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(WriteError::Closed);
        };

        if frame.len() != self.frame_len {
            return Err(WriteError::FrameSize {
                expected: self.frame_len,
                actual: frame.len(),
            });
        }

        stdin.write_all(frame.data())?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), RecorderError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        // Dropping stdin is the end-of-input signal
        drop(self.stdin.take());

        let status = match handle.wait_timeout(self.close_timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(
                    "Encoder {} did not finish within {:?}, terminating",
                    self.program, self.close_timeout
                );
                handle.terminate().map_err(|e| RecorderError::EncoderExit {
                    status: format!("could not be reaped: {}", e),
                })?
            }
            Err(e) => {
                error!("Failed waiting for encoder: {}", e);
                let _ = handle.terminate();
                return Err(RecorderError::EncoderExit {
                    status: format!("unknown ({})", e),
                });
            }
        };

        info!(
            "Encoder {} exited with {} after {} frames",
            self.program, status, self.frames_written
        );

        if status.success() {
            Ok(())
        } else {
            Err(RecorderError::EncoderExit {
                status: status.to_string(),
            })
        }
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn encoder_handle(&self) -> Option<EncoderHandle> {
        self.handle.clone()
    }
}

impl Drop for ProcessSink {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.close() {
                warn!("Encoder close on drop failed: {}", e);
            }
        }
    }
}

/// Make SIGPIPE non-fatal if it still has its default action
#[cfg(unix)]
fn ignore_sigpipe() {
    unsafe {
        let mut current: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(libc::SIGPIPE, std::ptr::null(), &mut current) == 0
            && current.sa_sigaction == libc::SIG_DFL
        {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
    }
}
