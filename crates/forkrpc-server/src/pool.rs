//! Worker process bookkeeping.
//!
//! A [`WorkerPool`] tracks the pids of the worker processes a supervisor
//! spawned. A pid stays in the pool until its exit has been collected with
//! `waitpid`, so the set may briefly name a process that already died.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use forkrpc_common::{ForkrpcError, Result};

use crate::role::{LISTEN_FD_ENV, WORKER_INDEX_ENV};

/// Interval between exit checks while waiting for workers to stop
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Grace given to workers stopped because a later spawn failed
const SPAWN_ROLLBACK_GRACE: Duration = Duration::from_secs(1);

/// How to start one worker process.
///
/// [`WorkerCommand::current_exe`] re-executes the running binary with its own
/// arguments; the pool adds the listening descriptor and worker index to the
/// environment of each child.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The running executable with the arguments it was started with.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| ForkrpcError::SpawnFailed(format!("cannot locate current executable: {}", e)))?;
        Ok(Self::new(program).args(std::env::args_os().skip(1)))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn build(&self, listen_fd: Option<RawFd>, index: usize) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(WORKER_INDEX_ENV, index.to_string())
            .stdin(Stdio::null());
        if let Some(fd) = listen_fd {
            command.env(LISTEN_FD_ENV, fd.to_string());
        }
        command
    }
}

/// Live worker processes of one supervisor.
#[derive(Debug, Default)]
pub struct WorkerPool {
    workers: BTreeSet<Pid>,
}

impl WorkerPool {
    /// Spawns `count` workers.
    ///
    /// # Errors
    ///
    /// Returns [`ForkrpcError::SpawnFailed`] if any worker fails to start.
    /// Workers that did start are stopped before the error is returned.
    pub fn spawn(command: &WorkerCommand, count: usize, listen_fd: Option<RawFd>) -> Result<Self> {
        let mut pool = Self::default();

        for index in 0..count {
            match command.build(listen_fd, index).spawn() {
                Ok(child) => {
                    let pid = Pid::from_raw(child.id() as i32);
                    debug!(pid = %pid, index, "Spawned worker");
                    pool.workers.insert(pid);
                }
                Err(e) => {
                    warn!(index, error = %e, "Worker spawn failed, stopping spawned workers");
                    if let Err(stop_err) = pool.shutdown(SPAWN_ROLLBACK_GRACE) {
                        warn!(error = %stop_err, "Failed to stop spawned workers");
                    }
                    return Err(ForkrpcError::SpawnFailed(format!(
                        "{}: {}",
                        command.program.display(),
                        e
                    )));
                }
            }
        }

        info!(workers = count, "Worker pool spawned");
        Ok(pool)
    }

    /// Pids not yet confirmed dead.
    pub fn pids(&self) -> Vec<Pid> {
        self.workers.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Collects every worker that has exited, without blocking.
    ///
    /// Returns the pids removed from the pool with their exit status. A
    /// worker whose exit was already collected elsewhere is removed with no
    /// status. Calling this when nothing exited is a no-op.
    pub fn reap(&mut self) -> Vec<(Pid, Option<WaitStatus>)> {
        let mut reaped = Vec::new();

        for pid in self.pids() {
            match try_wait(pid) {
                Ok(None) => {}
                Ok(Some(status)) => {
                    debug!(pid = %pid, status = ?status, "Reaped worker");
                    self.workers.remove(&pid);
                    reaped.push((pid, Some(status)));
                }
                Err(Errno::ECHILD) => {
                    debug!(pid = %pid, "Worker already reaped");
                    self.workers.remove(&pid);
                    reaped.push((pid, None));
                }
                Err(errno) => {
                    warn!(pid = %pid, error = %errno, "waitpid failed");
                }
            }
        }

        reaped
    }

    /// Stops every worker: SIGTERM, wait up to `grace`, then SIGKILL.
    ///
    /// Blocks until every worker has been reaped. A worker that is already
    /// gone when signalled is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ForkrpcError::Signal`] if a signal cannot be delivered for
    /// any reason other than the process no longer existing.
    pub fn shutdown(&mut self, grace: Duration) -> Result<()> {
        let mut pending = Vec::new();
        for pid in self.pids() {
            match send_signal(pid, Signal::SIGTERM) {
                Ok(()) => pending.push(pid),
                Err(ForkrpcError::ReapRace(_)) => {
                    warn!(pid = %pid, "Worker exited before SIGTERM");
                    // Collect the zombie if it is ours; ECHILD means it already was.
                    let _ = try_wait(pid);
                    self.workers.remove(&pid);
                }
                Err(e) => return Err(e),
            }
        }

        let deadline = Instant::now() + grace;
        while !pending.is_empty() {
            pending.retain(|pid| match try_wait(*pid) {
                Ok(None) => true,
                Ok(Some(status)) => {
                    debug!(pid = %pid, status = ?status, "Worker stopped");
                    false
                }
                Err(_) => false,
            });
            for pid in self.pids() {
                if !pending.contains(&pid) {
                    self.workers.remove(&pid);
                }
            }

            if pending.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                for pid in pending.drain(..) {
                    warn!(pid = %pid, "Worker ignored SIGTERM, killing");
                    match send_signal(pid, Signal::SIGKILL) {
                        Ok(()) | Err(ForkrpcError::ReapRace(_)) => {}
                        Err(e) => return Err(e),
                    }
                    wait_blocking(pid);
                    self.workers.remove(&pid);
                }
                break;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }

        info!("All workers stopped");
        Ok(())
    }
}

fn send_signal(pid: Pid, signal: Signal) -> Result<()> {
    match kill(pid, signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(ForkrpcError::ReapRace(pid.as_raw())),
        Err(errno) => Err(ForkrpcError::Signal(format!("{} to {}: {}", signal, pid, errno))),
    }
}

/// `Ok(None)` while `pid` is still running.
fn try_wait(pid: Pid) -> std::result::Result<Option<WaitStatus>, Errno> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return Ok(None),
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => return Ok(Some(status)),
            Ok(_) => return Ok(None),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno),
        }
    }
}

fn wait_blocking(pid: Pid) {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) | Err(Errno::ECHILD) => return,
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(errno) => {
                warn!(pid = %pid, error = %errno, "waitpid failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn sleeper() -> WorkerCommand {
        WorkerCommand::new("sleep").arg("30")
    }

    fn is_gone(pid: Pid) -> bool {
        matches!(kill(pid, None::<Signal>), Err(Errno::ESRCH))
    }

    #[test]
    fn test_spawn_tracks_every_worker() {
        let mut pool = WorkerPool::spawn(&sleeper(), 3, None).unwrap();
        assert_eq!(pool.len(), 3);

        pool.shutdown(Duration::from_secs(5)).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_shutdown_leaves_no_processes() {
        let mut pool = WorkerPool::spawn(&sleeper(), 4, None).unwrap();
        let pids = pool.pids();

        pool.shutdown(Duration::from_secs(5)).unwrap();

        assert!(pool.is_empty());
        for pid in pids {
            assert!(is_gone(pid), "worker {} still exists", pid);
        }
    }

    #[test]
    fn test_shutdown_kills_stragglers_after_grace() {
        // `sh` ignoring TERM stands in for a hung worker.
        let stubborn = WorkerCommand::new("sh").arg("-c").arg("trap '' TERM; exec sleep 30");
        let mut pool = WorkerPool::spawn(&stubborn, 2, None).unwrap();
        let pids = pool.pids();
        thread::sleep(Duration::from_millis(200));

        let started = Instant::now();
        pool.shutdown(Duration::from_millis(300)).unwrap();

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(pool.is_empty());
        for pid in pids {
            assert!(is_gone(pid));
        }
    }

    #[test]
    fn test_reap_collects_exited_workers() {
        let mut pool = WorkerPool::spawn(&WorkerCommand::new("true"), 3, None).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !pool.is_empty() && Instant::now() < deadline {
            pool.reap();
            thread::sleep(Duration::from_millis(20));
        }
        assert!(pool.is_empty());

        // Nothing left to collect.
        assert!(pool.reap().is_empty());
    }

    #[test]
    fn test_reap_keeps_running_workers() {
        let mut pool = WorkerPool::spawn(&sleeper(), 2, None).unwrap();
        assert!(pool.reap().is_empty());
        assert_eq!(pool.len(), 2);
        pool.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_shutdown_tolerates_already_dead_workers() {
        let mut pool = WorkerPool::spawn(&WorkerCommand::new("true"), 2, None).unwrap();
        thread::sleep(Duration::from_millis(300));

        pool.shutdown(Duration::from_secs(1)).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_spawn_failure_is_fatal() {
        let missing = WorkerCommand::new("/nonexistent/forkrpc-worker");
        let result = WorkerPool::spawn(&missing, 2, None);
        assert!(matches!(result, Err(ForkrpcError::SpawnFailed(_))));
    }

    #[test]
    fn test_worker_environment() {
        let command = WorkerCommand::new("env").build(Some(5), 3);
        let envs: Vec<_> = command.get_envs().collect();
        assert!(envs.contains(&(OsStr::new(LISTEN_FD_ENV), Some(OsStr::new("5")))));
        assert!(envs.contains(&(OsStr::new(WORKER_INDEX_ENV), Some(OsStr::new("3")))));
    }
}
