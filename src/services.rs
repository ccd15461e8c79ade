//! External Collaborator Contracts
//!
//! The syscall boundary does not implement memory translation, the
//! filesystem, the console device, or process lifecycle management. It
//! consumes them through the traits defined here, which makes the core
//! testable against in-memory doubles (see [`crate::testing`]).
//!
//! # Trust Model
//! Everything behind these traits is trusted kernel code. Everything that
//! arrives through a [`crate::TrapFrame`] is untrusted and must pass the
//! validation in [`crate::syscall::validate`] first.

use alloc::boxed::Box;
use core::ptr::NonNull;

use crate::syscall::validate::UserAddr;

/// Process identifier assigned by the process manager.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct Pid(usize);

impl Pid {
    /// Create a pid from a raw value.
    #[inline]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Get the raw pid value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page-table lookup for one process's address space.
///
/// This is the single primitive the validator consumes: map a user virtual
/// address to a kernel-usable pointer, or report the page unmapped.
pub trait AddressSpace {
    /// Translate a user virtual address to a kernel-usable pointer.
    ///
    /// Returns `None` if no page is present at `addr`.
    ///
    /// # Contract
    /// A returned pointer must stay valid for the lifetime of the address
    /// space, and the mapping must be contiguous in kernel space for every
    /// mapped byte following `addr`: the boundary validates only the base
    /// address of a multi-byte access before touching the rest of it.
    fn translate(&self, addr: UserAddr) -> Option<NonNull<u8>>;
}

/// An open-file object, opaque to the syscall boundary.
///
/// One object is owned by exactly one descriptor entry; the boundary never
/// aliases it across processes. All methods are invoked under the
/// system-wide filesystem lock held by the caller.
pub trait File {
    /// Read up to `buf.len()` bytes at the current position.
    ///
    /// Returns the number of bytes actually transferred.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write up to `buf.len()` bytes at the current position.
    ///
    /// Returns the number of bytes actually transferred.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Move the current position to `pos` bytes from the start.
    fn seek(&mut self, pos: usize);

    /// Current position in bytes from the start.
    fn tell(&self) -> usize;

    /// Length of the file in bytes.
    fn len(&self) -> usize;

    /// Whether the file is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the underlying filesystem resources.
    ///
    /// Called exactly once, before the object is dropped.
    fn close(&mut self);
}

/// Boxed open-file object as stored in a descriptor entry.
pub type FileObject = Box<dyn File + Send>;

/// The filesystem, invoked as opaque operations.
///
/// Callers serialize every invocation through the kernel's single
/// filesystem lock; implementations need no internal locking.
pub trait FileSystem {
    /// Create a file of `size` bytes. Returns `true` on success.
    fn create(&mut self, path: &str, size: usize) -> bool;

    /// Remove a file. Returns `true` on success.
    fn remove(&mut self, path: &str) -> bool;

    /// Open a file, or `None` if it does not exist.
    fn open(&mut self, path: &str) -> Option<FileObject>;
}

/// Byte-level console device.
pub trait Console {
    /// Write `bytes` to the console as one unit.
    ///
    /// The kernel additionally holds its console lock across this call, so
    /// concurrent writers never interleave their output.
    fn write(&mut self, bytes: &[u8]);

    /// Read one byte of console input, blocking until available.
    fn read_byte(&mut self) -> u8;
}

/// Process creation and waiting, consumed by `exec` and `wait`.
pub trait ProcessManager {
    /// Start a new process from a command line.
    ///
    /// Returns `None` on failure. The caller holds the filesystem lock
    /// across this call, because loading the executable reads the disk.
    fn spawn(&mut self, cmdline: &str) -> Option<Pid>;

    /// Wait for `pid` to terminate and return its exit code.
    ///
    /// Returns `-1` if `pid` is not a child of the caller or was already
    /// waited for.
    fn wait(&mut self, pid: Pid) -> i64;
}
