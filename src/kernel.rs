//! Trap Entry Point and Shared Kernel State
//!
//! One [`Kernel`] exists per system. It owns the state every process
//! shares at the syscall boundary: the serializing filesystem lock, the
//! console lock, the process manager, and the system-wide handle
//! allocator. [`Kernel::handle_trap`] is the single entry point the
//! interrupt subsystem invokes per user-mode trap.
//!
//! # Locking
//! - `fs` serializes every filesystem-affecting operation system-wide;
//!   at most one such operation is in flight at a time
//! - `console` makes each console write one atomic unit
//! - the handle counter's lock (inside [`HandleAllocator`]) is held only
//!   around the increment and is never taken while holding `fs`
//! - `fs` may be held while taking `procs` (exec loads the executable
//!   from disk); no other nesting exists

use alloc::boxed::Box;

use spin::Mutex;

use crate::fd::HandleAllocator;
use crate::process::{self, Process};
use crate::services::{Console, FileSystem, ProcessManager};
use crate::syscall::handler::{self, Flow};
use crate::syscall::validate::UserAddr;

/// Saved user register state of one trap, as handed over by the
/// interrupt subsystem.
pub struct TrapFrame {
    /// Saved user stack pointer, addressing the argument vector.
    pub sp: UserAddr,
    /// Result slot (return-value register). The dispatcher fills this in
    /// before returning; operations without a result leave it untouched.
    pub result: i64,
}

impl TrapFrame {
    /// Frame for an argument vector at `sp`, with a zeroed result slot.
    pub const fn new(sp: UserAddr) -> Self {
        Self { sp, result: 0 }
    }
}

/// What the trap stub must do after the dispatcher returns.
///
/// Termination and power-off cannot "not return" in library code; the
/// caller must honor the outcome and never resume the user thread after
/// [`TrapOutcome::Exited`] or [`TrapOutcome::Shutdown`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrapOutcome {
    /// Resume the process; the result slot holds the syscall result.
    Completed,
    /// The process terminated with the given exit code. Its descriptor
    /// table has been drained; the scheduler reaps the rest.
    Exited(i32),
    /// Power down the system.
    Shutdown,
}

/// Shared kernel state at the syscall boundary.
pub struct Kernel {
    pub(crate) fs: Mutex<Box<dyn FileSystem + Send>>,
    pub(crate) console: Mutex<Box<dyn Console + Send>>,
    pub(crate) procs: Mutex<Box<dyn ProcessManager + Send>>,
    pub(crate) handles: HandleAllocator,
}

impl Kernel {
    /// Assemble the boundary over its external collaborators.
    pub fn new(
        fs: Box<dyn FileSystem + Send>,
        console: Box<dyn Console + Send>,
        procs: Box<dyn ProcessManager + Send>,
    ) -> Self {
        Self {
            fs: Mutex::new(fs),
            console: Mutex::new(console),
            procs: Mutex::new(procs),
            handles: HandleAllocator::new(),
        }
    }

    /// Handle one user-mode trap.
    ///
    /// Decodes the argument vector addressed by the frame's stack pointer,
    /// dispatches to the operation's handler, and fills in the frame's
    /// result slot. A fatal boundary violation terminates `process` with
    /// exit status -1 via the exit coordinator.
    pub fn handle_trap(&self, process: &mut Process, frame: &mut TrapFrame) -> TrapOutcome {
        let flow = {
            let (aspace, descriptors) = process.boundary_parts();
            handler::dispatch(self, aspace, descriptors, frame.sp)
        };

        match flow {
            Ok(Flow::Return(value)) => {
                frame.result = value;
                TrapOutcome::Completed
            }
            Ok(Flow::Void) => TrapOutcome::Completed,
            Ok(Flow::Halt) => {
                log::debug!("halt requested by {}", process.name);
                TrapOutcome::Shutdown
            }
            Ok(Flow::Exit(code)) => {
                frame.result = i64::from(code);
                process::exit_process(self, process, code)
            }
            Err(terminate) => process::exit_process(self, process, terminate.code()),
        }
    }
}
