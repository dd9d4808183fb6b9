//! Small shared utilities: XDG path resolution and cooperative cancellation.

pub mod cancel;

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::{Error, Result};

pub use cancel::Cancellation;

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "task-fridge")
        .ok_or_else(|| Error::Fatal("could not determine home directory".into()))
}

/// `$XDG_DATA_HOME/task-fridge/tasks.db` (or platform equivalent).
pub fn data_db_path() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    let dir = dirs.data_dir();
    std::fs::create_dir_all(dir).map_err(|source| Error::StorageIo {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(dir.join("tasks.db"))
}

/// `$XDG_CACHE_HOME/task-fridge/lists.json` (or platform equivalent).
pub fn cache_lists_path() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    let dir = dirs.cache_dir();
    std::fs::create_dir_all(dir).map_err(|source| Error::StorageIo {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(dir.join("lists.json"))
}

/// Per-user runtime directory for the daemon's PID file and socket.
/// Falls back to the cache directory on platforms without a runtime dir
/// (`directories` only populates this on Linux/BSD via `$XDG_RUNTIME_DIR`).
pub fn runtime_dir() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new()
        .ok_or_else(|| Error::Fatal("could not determine home directory".into()))?;
    let dir = match dirs.runtime_dir() {
        Some(dir) => dir.join("task-fridge"),
        None => project_dirs()?.cache_dir().join("run"),
    };
    std::fs::create_dir_all(&dir).map_err(|source| Error::StorageIo {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

pub fn daemon_pid_path() -> Result<PathBuf> {
    Ok(runtime_dir()?.join("daemon.pid"))
}

pub fn daemon_socket_path() -> Result<PathBuf> {
    Ok(runtime_dir()?.join("daemon.sock"))
}

pub fn daemon_log_path() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    let dir = dirs.data_dir();
    std::fs::create_dir_all(dir).map_err(|source| Error::StorageIo {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(dir.join("daemon.log"))
}
