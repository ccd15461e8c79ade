//! trapgate - User/Kernel System-Call Boundary
//!
//! The boundary between untrusted user-mode programs and a kernel's
//! trusted services: it validates every user-supplied address before
//! dereferencing it, decodes a fixed-width syscall invocation into a typed
//! operation, and manages per-process tables of open-file descriptors with
//! the locking discipline that keeps filesystem state consistent across
//! concurrently running processes.
//!
//! # Security Model
//! - A user pointer is dereferenced only after it is known to be non-null,
//!   below the user/kernel boundary, and mapped in the calling process
//! - Boundary violations terminate the offending process with exit
//!   status -1; they are never surfaced as recoverable errors
//! - Descriptor handles are unique system-wide and resolve only against
//!   the calling process's own table
//! - Every descriptor a process holds is released when it terminates, on
//!   both the normal and the fatal path
//!
//! # Architecture
//! The scheduler, virtual memory, the filesystem, the console device, and
//! process lifecycle are external collaborators consumed through the
//! traits in [`services`]. The interrupt subsystem calls
//! [`Kernel::handle_trap`] once per user-mode trap and acts on the
//! returned [`TrapOutcome`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod fd;
pub mod kernel;
pub mod process;
pub mod services;
pub mod syscall;
pub mod testing;

pub use fd::{DescriptorTable, FdError, Handle, HandleAllocator};
pub use kernel::{Kernel, TrapFrame, TrapOutcome};
pub use process::Process;
pub use syscall::{SysResult, Terminate, UserAddr, USER_TOP};
