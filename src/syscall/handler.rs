//! System Call Handler
//!
//! Dispatches system calls and implements individual syscall handlers.
//!
//! # Security Considerations
//! - The argument vector lives in user memory: every slot an operation
//!   reads is validated before any slot value is interpreted
//! - Pointer arguments are translated to kernel space, terminating the
//!   process on an unmapped target
//! - Descriptor arguments resolve only against the calling process's own
//!   table; misuse of a reserved or unknown handle is fatal
//! - Unknown selectors are ignored as a pass-through: no handler runs and
//!   the result slot is left untouched

use core::ptr::NonNull;

use super::numbers::*;
use super::validate::{ArgStream, UserAddr};
use super::{SysResult, Terminate};
use crate::fd::{DescriptorTable, Handle};
use crate::kernel::Kernel;
use crate::services::{AddressSpace, FileObject, Pid};

/// What the dispatcher tells the trap entry to do with the frame.
pub(crate) enum Flow {
    /// Store the value in the result slot and resume the process.
    Return(i64),
    /// Resume the process without writing the result slot.
    Void,
    /// The process called `exit` with this code.
    Exit(i32),
    /// Power down the system.
    Halt,
}

/// Decode the argument vector at `sp` and run the selected handler.
///
/// One trap, one decode, one handler invocation; the only persistent
/// state is the descriptor table and the handle counter.
///
/// # Errors
/// A [`Terminate`] error means a fatal boundary violation; the caller
/// routes the process through the exit coordinator.
pub(crate) fn dispatch(
    kernel: &Kernel,
    aspace: &dyn AddressSpace,
    descriptors: &mut DescriptorTable,
    sp: UserAddr,
) -> SysResult<Flow> {
    let args = ArgStream::new(aspace, sp)?;
    let selector = args.selector()?;
    log::trace!("syscall {selector}");

    match selector {
        SYS_HALT => Ok(Flow::Halt),
        SYS_EXIT => {
            args.expect(1)?;
            Ok(Flow::Exit(args.word(1)? as i32))
        }
        SYS_EXEC => {
            args.expect(1)?;
            Ok(Flow::Return(sys_exec(kernel, args.cstr(1)?)))
        }
        SYS_WAIT => {
            args.expect(1)?;
            Ok(Flow::Return(sys_wait(kernel, Pid::new(args.word(1)?))))
        }
        SYS_CREATE => {
            args.expect(2)?;
            Ok(Flow::Return(sys_create(kernel, args.cstr(1)?, args.word(2)?)))
        }
        SYS_REMOVE => {
            args.expect(1)?;
            Ok(Flow::Return(sys_remove(kernel, args.cstr(1)?)))
        }
        SYS_OPEN => {
            args.expect(1)?;
            Ok(Flow::Return(sys_open(kernel, descriptors, args.cstr(1)?)))
        }
        SYS_FILESIZE => {
            args.expect(1)?;
            let fd = Handle::from_raw(args.word(1)?);
            sys_filesize(kernel, descriptors, fd).map(Flow::Return)
        }
        SYS_READ => {
            args.expect(3)?;
            let fd = Handle::from_raw(args.word(1)?);
            let buf = args.pointer(2)?;
            let len = args.word(3)?;
            sys_read(kernel, descriptors, fd, buf, len).map(Flow::Return)
        }
        SYS_WRITE => {
            args.expect(3)?;
            let fd = Handle::from_raw(args.word(1)?);
            let buf = args.pointer(2)?;
            let len = args.word(3)?;
            sys_write(kernel, descriptors, fd, buf, len).map(Flow::Return)
        }
        SYS_SEEK => {
            args.expect(2)?;
            let fd = Handle::from_raw(args.word(1)?);
            sys_seek(kernel, descriptors, fd, args.word(2)?)?;
            Ok(Flow::Void)
        }
        SYS_TELL => {
            args.expect(1)?;
            let fd = Handle::from_raw(args.word(1)?);
            sys_tell(kernel, descriptors, fd).map(Flow::Return)
        }
        SYS_CLOSE => {
            args.expect(1)?;
            let fd = Handle::from_raw(args.word(1)?);
            sys_close(kernel, descriptors, fd)?;
            Ok(Flow::Void)
        }
        SYS_NULL => {
            args.expect(1)?;
            Ok(Flow::Return(args.word(1)?.wrapping_add(1) as i64))
        }
        unknown => {
            // Pass-through, not an error: no handler runs, no result is
            // set, the process keeps running.
            log::debug!("ignoring unknown syscall selector {unknown}");
            Ok(Flow::Void)
        }
    }
}

/// Resolve a descriptor against the calling process's table.
///
/// Reserved sentinels and handles this process never received resolve to
/// a fatal violation.
fn lookup_or_fault<'t>(
    descriptors: &'t mut DescriptorTable,
    fd: Handle,
) -> SysResult<&'t mut FileObject> {
    descriptors.lookup(fd).map_err(|err| {
        log::warn!("{fd}: {err}");
        Terminate::FAULT
    })
}

/// Start a new process from a command line.
///
/// Holds the filesystem lock across process creation, because loading the
/// executable reads the disk. Returns the new pid, or -1 on failure
/// (including a command line that is not valid UTF-8).
fn sys_exec(kernel: &Kernel, cmdline: &[u8]) -> i64 {
    let Ok(cmdline) = core::str::from_utf8(cmdline) else {
        return -1;
    };
    let fs = kernel.fs.lock();
    let pid = kernel.procs.lock().spawn(cmdline);
    drop(fs);
    pid.map_or(-1, |pid| pid.as_usize() as i64)
}

/// Wait for a child process; forwards the process manager's result
/// unchanged.
fn sys_wait(kernel: &Kernel, pid: Pid) -> i64 {
    kernel.procs.lock().wait(pid)
}

/// Create a file of `size` bytes. Returns 1 on success, 0 on failure.
fn sys_create(kernel: &Kernel, path: &[u8], size: usize) -> i64 {
    let Ok(path) = core::str::from_utf8(path) else {
        return 0;
    };
    let created = kernel.fs.lock().create(path, size);
    i64::from(created)
}

/// Remove a file. Returns 1 on success, 0 on failure.
fn sys_remove(kernel: &Kernel, path: &[u8]) -> i64 {
    let Ok(path) = core::str::from_utf8(path) else {
        return 0;
    };
    let removed = kernel.fs.lock().remove(path);
    i64::from(removed)
}

/// Open a file and allocate a descriptor for it.
///
/// Returns the new handle, or -1 if the underlying open fails. The
/// filesystem lock is dropped before the handle counter's lock is taken.
fn sys_open(kernel: &Kernel, descriptors: &mut DescriptorTable, path: &[u8]) -> i64 {
    let Ok(path) = core::str::from_utf8(path) else {
        return -1;
    };
    let file = kernel.fs.lock().open(path);
    let Some(file) = file else {
        return -1;
    };
    let handle = kernel.handles.allocate();
    descriptors.insert(handle, file);
    handle.as_usize() as i64
}

/// Length of an open file, under the filesystem lock.
fn sys_filesize(kernel: &Kernel, descriptors: &mut DescriptorTable, fd: Handle) -> SysResult<i64> {
    let file = lookup_or_fault(descriptors, fd)?;
    let _fs = kernel.fs.lock();
    Ok(file.len() as i64)
}

/// Read from a descriptor or the console.
///
/// Standard input reads `len` bytes one at a time from the console.
/// Standard output cannot be read and yields -1. Anything else resolves
/// through the descriptor table (fatal on failure) and reads under the
/// filesystem lock.
fn sys_read(
    kernel: &Kernel,
    descriptors: &mut DescriptorTable,
    fd: Handle,
    buf: NonNull<u8>,
    len: usize,
) -> SysResult<i64> {
    if fd == Handle::STDOUT {
        return Ok(-1);
    }

    // SAFETY: `buf` was translated from a validated user pointer and the
    // AddressSpace contract guarantees a contiguous mapping for the bytes
    // the user program asked to transfer.
    let buf = unsafe { core::slice::from_raw_parts_mut(buf.as_ptr(), len) };

    if fd == Handle::STDIN {
        let mut console = kernel.console.lock();
        for byte in buf.iter_mut() {
            *byte = console.read_byte();
        }
        return Ok(len as i64);
    }

    let file = lookup_or_fault(descriptors, fd)?;
    let _fs = kernel.fs.lock();
    Ok(file.read(buf) as i64)
}

/// Write to a descriptor or the console.
///
/// Standard output writes all `len` bytes to the console as one atomic
/// unit. Writing to standard input is a fatal violation. Anything else
/// resolves through the descriptor table (fatal on failure) and writes
/// under the filesystem lock.
fn sys_write(
    kernel: &Kernel,
    descriptors: &mut DescriptorTable,
    fd: Handle,
    buf: NonNull<u8>,
    len: usize,
) -> SysResult<i64> {
    if fd == Handle::STDIN {
        log::warn!("write to standard input");
        return Err(Terminate::FAULT);
    }

    // SAFETY: `buf` was translated from a validated user pointer and the
    // AddressSpace contract guarantees a contiguous mapping for the bytes
    // the user program asked to transfer.
    let buf = unsafe { core::slice::from_raw_parts(buf.as_ptr(), len) };

    if fd == Handle::STDOUT {
        kernel.console.lock().write(buf);
        return Ok(len as i64);
    }

    let file = lookup_or_fault(descriptors, fd)?;
    let _fs = kernel.fs.lock();
    Ok(file.write(buf) as i64)
}

/// Reposition an open file, under the filesystem lock.
fn sys_seek(
    kernel: &Kernel,
    descriptors: &mut DescriptorTable,
    fd: Handle,
    pos: usize,
) -> SysResult<()> {
    let file = lookup_or_fault(descriptors, fd)?;
    let _fs = kernel.fs.lock();
    file.seek(pos);
    Ok(())
}

/// Current position of an open file, under the filesystem lock.
fn sys_tell(kernel: &Kernel, descriptors: &mut DescriptorTable, fd: Handle) -> SysResult<i64> {
    let file = lookup_or_fault(descriptors, fd)?;
    let _fs = kernel.fs.lock();
    Ok(file.tell() as i64)
}

/// Release a descriptor and close its file under the filesystem lock.
///
/// Closing a reserved sentinel or a handle this process does not hold is
/// a fatal violation.
fn sys_close(kernel: &Kernel, descriptors: &mut DescriptorTable, fd: Handle) -> SysResult<()> {
    let mut file = descriptors.release(fd).map_err(|err| {
        log::warn!("close {fd}: {err}");
        Terminate::FAULT
    })?;
    let _fs = kernel.fs.lock();
    file.close();
    Ok(())
}
