//! The CLI- and [`crate::sync_aware_store::SyncAwareStore`]-facing handle onto
//! a (possibly absent) daemon: notify it, query its status, or stop it, all
//! falling back gracefully when nothing is listening.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::daemon::ipc::{self, Request, Response, ResponseStatus};
use crate::error::{Error, Result};

/// How long to wait for the daemon to exit on its own after each escalation
/// step before trying the next one.
const STOP_GRACE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct DaemonClient {
    pid_path: PathBuf,
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(pid_path: PathBuf, socket_path: PathBuf) -> Self {
        Self {
            pid_path,
            socket_path,
        }
    }

    /// True only if the PID file names a live process *and* a `status`
    /// round trip over the socket succeeds.
    pub async fn is_running(&self) -> bool {
        if !pid_file_is_live(&self.pid_path) {
            return false;
        }
        self.status().await.is_ok()
    }

    pub async fn notify(&self) -> Result<Response> {
        self.roundtrip(Request::Notify).await
    }

    pub async fn status(&self) -> Result<Response> {
        self.roundtrip(Request::Status).await
    }

    /// Ask the daemon to shut down, escalating from a polite IPC request to
    /// `SIGTERM` and finally `SIGKILL` if it doesn't exit on its own.
    pub async fn stop(&self) -> Result<Response> {
        let response = self.roundtrip(Request::Stop).await?;
        tokio::time::sleep(STOP_GRACE).await;
        if let Some(pid) = self.live_pid() {
            log::warn!("daemon still alive after stop request, sending SIGTERM");
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
            tokio::time::sleep(STOP_GRACE).await;
        }
        if let Some(pid) = self.live_pid() {
            log::warn!("daemon still alive after SIGTERM, sending SIGKILL");
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL);
        }
        Ok(response)
    }

    fn live_pid(&self) -> Option<nix::unistd::Pid> {
        let contents = std::fs::read_to_string(&self.pid_path).ok()?;
        let pid = contents.trim().parse::<i32>().ok()?;
        let pid = nix::unistd::Pid::from_raw(pid);
        nix::sys::signal::kill(pid, None).ok()?;
        Some(pid)
    }

    async fn roundtrip(&self, request: Request) -> Result<Response> {
        let mut stream = ipc::connect(&self.socket_path).await?;
        ipc::write_request(&mut stream, &request).await?;
        let response = ipc::read_response(&mut stream).await?;
        match response.status {
            ResponseStatus::Ok => Ok(response),
            ResponseStatus::Error => Err(Error::Transport(response.message)),
        }
    }
}

fn pid_file_is_live(pid_path: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(pid_path) else {
        return false;
    };
    let Ok(pid) = contents.trim().parse::<i32>() else {
        return false;
    };
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}
