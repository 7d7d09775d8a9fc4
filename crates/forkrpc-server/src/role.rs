//! Process role and listening-socket handoff.
//!
//! The supervisor binds the listening socket, clears its close-on-exec flag and
//! re-executes the current binary once per worker. Each worker finds the
//! inherited descriptor number in `FORKRPC_LISTEN_FD` and its index in
//! `FORKRPC_WORKER_INDEX`. The role is read from the environment once at
//! startup; nothing else decides whether a process serves or supervises.

use std::env;
use std::net::TcpListener;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};

use forkrpc_common::{ForkrpcError, Result};

/// Environment variable carrying the inherited listening descriptor
pub const LISTEN_FD_ENV: &str = "FORKRPC_LISTEN_FD";

/// Environment variable carrying the worker's index in its pool
pub const WORKER_INDEX_ENV: &str = "FORKRPC_WORKER_INDEX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the listening socket, the registry session and the worker pool.
    Supervisor,
    /// Serves requests on an inherited listening socket.
    Worker { listen_fd: RawFd, index: usize },
}

impl Role {
    /// Reads the role of this process from its environment.
    pub fn detect() -> Result<Self> {
        Self::from_vars(env::var(LISTEN_FD_ENV).ok(), env::var(WORKER_INDEX_ENV).ok())
    }

    fn from_vars(listen_fd: Option<String>, index: Option<String>) -> Result<Self> {
        let Some(listen_fd) = listen_fd else {
            return Ok(Role::Supervisor);
        };

        let listen_fd: RawFd = listen_fd
            .parse()
            .ok()
            .filter(|fd| *fd >= 0)
            .ok_or_else(|| {
                ForkrpcError::InvalidRequest(format!("{} is not a descriptor: '{}'", LISTEN_FD_ENV, listen_fd))
            })?;

        let index = match index {
            Some(index) => index.parse().map_err(|_| {
                ForkrpcError::InvalidRequest(format!("{} is not an index: '{}'", WORKER_INDEX_ENV, index))
            })?,
            None => 0,
        };

        Ok(Role::Worker { listen_fd, index })
    }

    pub fn is_worker(&self) -> bool {
        matches!(self, Role::Worker { .. })
    }
}

/// Makes `listener` survive `exec` and returns its descriptor number.
pub fn share_listener(listener: &TcpListener) -> Result<RawFd> {
    let fd = listener.as_raw_fd();
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))
        .map_err(|errno| ForkrpcError::Io(errno.into()))?;
    Ok(fd)
}

/// Takes ownership of the listening socket inherited from the supervisor.
///
/// # Errors
///
/// Fails if `fd` does not refer to a bound socket.
pub fn adopt_listener(fd: RawFd) -> Result<TcpListener> {
    // SAFETY: the supervisor handed this descriptor to exactly this process
    // through the environment and nothing else in the process claims it.
    let listener = unsafe { TcpListener::from_raw_fd(fd) };
    listener.local_addr()?;
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fd_means_supervisor() {
        assert_eq!(Role::from_vars(None, None).unwrap(), Role::Supervisor);
        assert_eq!(Role::from_vars(None, Some("3".into())).unwrap(), Role::Supervisor);
    }

    #[test]
    fn test_worker_role() {
        let role = Role::from_vars(Some("7".into()), Some("4".into())).unwrap();
        assert_eq!(role, Role::Worker { listen_fd: 7, index: 4 });
        assert!(role.is_worker());

        let role = Role::from_vars(Some("7".into()), None).unwrap();
        assert_eq!(role, Role::Worker { listen_fd: 7, index: 0 });
    }

    #[test]
    fn test_invalid_worker_vars() {
        assert!(Role::from_vars(Some("seven".into()), None).is_err());
        assert!(Role::from_vars(Some("-1".into()), None).is_err());
        assert!(Role::from_vars(Some("7".into()), Some("x".into())).is_err());
    }

    #[test]
    fn test_share_then_adopt_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let fd = share_listener(&listener).unwrap();

        let flags = FdFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFD).unwrap());
        assert!(!flags.contains(FdFlag::FD_CLOEXEC));

        std::mem::forget(listener);
        let adopted = adopt_listener(fd).unwrap();
        assert_eq!(adopted.local_addr().unwrap(), addr);
    }
}
