//! System Call Interface
//!
//! Decodes user-mode traps into typed operations and enforces the
//! access-control contract at the user/kernel boundary.
//!
//! # Security Model
//! - Every user-supplied address is validated before the kernel touches it
//! - Invalid addresses and descriptor misuse terminate the offending
//!   process with exit status -1; they are never reported as recoverable
//!   errors
//! - Operation failures (missing file, failed create) are sentinel values
//!   in the result word and leave the process running
//! - Unknown selectors are ignored: no handler runs, no result is written
//!
//! # Current Syscalls
//! - 0: halt() - power down the system
//! - 1: exit(status) - terminate the current process
//! - 2: exec(cmdline) - start a new process
//! - 3: wait(pid) - wait for a child process
//! - 4: create(path, size) - create a file
//! - 5: remove(path) - delete a file
//! - 6: open(path) - open a file, returning a descriptor
//! - 7: filesize(fd) - length of an open file
//! - 8: read(fd, buf, len) - read from a descriptor or the console
//! - 9: write(fd, buf, len) - write to a descriptor or the console
//! - 10: seek(fd, pos) - reposition an open file
//! - 11: tell(fd) - current position of an open file
//! - 12: close(fd) - release a descriptor
//! - 13: null(x) - diagnostic no-op, returns x + 1

pub(crate) mod handler;
pub mod validate;

pub use validate::{ArgStream, UserAddr, USER_TOP};

/// System call numbers.
///
/// The selector is the first word of the user argument vector.
pub mod numbers {
    /// Power down the system.
    pub const SYS_HALT: usize = 0;
    /// Terminate the current process.
    pub const SYS_EXIT: usize = 1;
    /// Start a new process from a command line.
    pub const SYS_EXEC: usize = 2;
    /// Wait for a child process to exit.
    pub const SYS_WAIT: usize = 3;
    /// Create a file.
    pub const SYS_CREATE: usize = 4;
    /// Delete a file.
    pub const SYS_REMOVE: usize = 5;
    /// Open a file.
    pub const SYS_OPEN: usize = 6;
    /// Length of an open file.
    pub const SYS_FILESIZE: usize = 7;
    /// Read from a descriptor.
    pub const SYS_READ: usize = 8;
    /// Write to a descriptor.
    pub const SYS_WRITE: usize = 9;
    /// Reposition an open file.
    pub const SYS_SEEK: usize = 10;
    /// Current position of an open file.
    pub const SYS_TELL: usize = 11;
    /// Release a descriptor.
    pub const SYS_CLOSE: usize = 12;
    /// Diagnostic no-op: returns its argument plus one.
    pub const SYS_NULL: usize = 13;
}

/// Fail-fast termination of the current process.
///
/// Validation failures at the boundary have no recovery path: the offending
/// process is terminated. Instead of unwinding, handlers propagate this
/// variant with `?` so every partial side effect (a lock guard, a borrowed
/// table entry) is released on the way out, and the dispatcher routes the
/// process through the exit coordinator exactly once.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Terminate {
    code: i32,
}

impl Terminate {
    /// Termination with the boundary-violation exit status.
    pub const FAULT: Self = Self { code: -1 };

    /// Exit status handed to the exit coordinator.
    #[inline]
    pub const fn code(self) -> i32 {
        self.code
    }
}

impl core::fmt::Display for Terminate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "terminate process with exit status {}", self.code)
    }
}

/// Result of a boundary operation: a value, or process termination.
pub type SysResult<T> = Result<T, Terminate>;
