//! Process Context and the Exit Coordinator
//!
//! The scheduler owns process lifecycle; this module holds only the state
//! the syscall boundary extends it with (the descriptor table and the exit
//! code) and the one piece of termination logic the boundary is
//! responsible for: releasing every descriptor the process still holds.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;

use crate::fd::DescriptorTable;
use crate::kernel::{Kernel, TrapOutcome};
use crate::services::AddressSpace;

/// Per-process state at the syscall boundary.
pub struct Process {
    /// Process name, used in the termination notice.
    pub name: String,
    /// The process's address space, queried for page presence.
    pub aspace: Box<dyn AddressSpace + Send>,
    /// Open descriptors, owned exclusively by this process.
    pub descriptors: DescriptorTable,
    exit_code: Option<i32>,
}

impl Process {
    /// Create a process context with no open descriptors.
    pub fn new(name: &str, aspace: Box<dyn AddressSpace + Send>) -> Self {
        Self {
            name: String::from(name),
            aspace,
            descriptors: DescriptorTable::new(),
            exit_code: None,
        }
    }

    /// Exit code recorded at termination, if the process has terminated.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Split borrow for the dispatcher: the marshaler reads the address
    /// space while handlers mutate the descriptor table.
    pub(crate) fn boundary_parts(&mut self) -> (&dyn AddressSpace, &mut DescriptorTable) {
        (self.aspace.as_ref(), &mut self.descriptors)
    }

    /// Record the exit code.
    ///
    /// The code is written exactly once; later calls keep the first value.
    pub(crate) fn set_exit_code(&mut self, code: i32) {
        if self.exit_code.is_none() {
            self.exit_code = Some(code);
        }
    }
}

/// Terminate a process, releasing every descriptor it still holds.
///
/// Handles both normal termination (the `exit` syscall) and the fatal
/// path taken on a boundary violation. In order:
/// 1. the exit code is recorded in the process context,
/// 2. the termination notice is written to the console as one unit,
/// 3. the first remaining descriptor is removed and its file closed under
///    the filesystem lock, until the table is empty.
///
/// No descriptor ever outlives its owning process.
pub(crate) fn exit_process(kernel: &Kernel, process: &mut Process, code: i32) -> TrapOutcome {
    log::debug!("{}: exit({code})", process.name);
    process.set_exit_code(code);

    let notice = format!("{}: exit({})\n", process.name, code);
    kernel.console.lock().write(notice.as_bytes());

    while let Some(entry) = process.descriptors.take_first() {
        let mut file = entry.file;
        let _fs = kernel.fs.lock();
        file.close();
    }

    TrapOutcome::Exited(code)
}
