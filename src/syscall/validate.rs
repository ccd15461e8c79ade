//! System Call Input Validation
//!
//! Validates every user-supplied address before the kernel dereferences it,
//! and marshals the raw argument vector of a trap into typed values.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-fast: an invalid address terminates the process, there is no
//!   recovery path at this boundary
//! - Prevent common vulnerabilities:
//!   - Kernel-memory disclosure (user/kernel boundary check)
//!   - Null pointer dereference (explicit check)
//!   - Wild pointers (page-table presence check)
//!   - Address arithmetic overflow (checked slot offsets)
//!
//! # Validation Order
//! Reading an argument slot to decide whether more validation is needed is
//! itself an unvalidated memory access, so [`ArgStream::expect`] validates
//! every word slot from the selector through the last expected argument
//! before any slot's value is interpreted.

use core::fmt;
use core::ptr::NonNull;

use super::{SysResult, Terminate};
use crate::services::AddressSpace;

/// First address above user space.
///
/// User pointers must lie strictly below this boundary; everything at or
/// above it belongs to the kernel.
pub const USER_TOP: usize = 0xC000_0000;

/// Size of one argument-vector word in bytes.
pub const WORD: usize = core::mem::size_of::<usize>();

/// A user virtual address.
///
/// This is a newtype wrapper so raw integers cannot be passed where a
/// user address is expected. Holding a `UserAddr` implies nothing about
/// validity; every dereference goes through [`check_user`] or
/// [`user_to_kernel`] first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct UserAddr(usize);

impl UserAddr {
    /// Create a user address from a raw value.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check for the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check that the address lies below the user/kernel boundary.
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 < USER_TOP
    }

    /// Offset the address by `bytes`, failing on arithmetic overflow.
    #[inline]
    pub fn offset(self, bytes: usize) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl fmt::Debug for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserAddr({:#010x})", self.0)
    }
}

impl fmt::Display for UserAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Validate a user-supplied address.
///
/// An address is valid iff it is non-null, lies below [`USER_TOP`], and is
/// mapped to a present page in `aspace`.
///
/// # Errors
/// Returns [`Terminate::FAULT`]: the calling process is terminated with
/// exit status -1. An invalid pointer is never reported back to the user
/// program as a recoverable error.
pub fn check_user(aspace: &dyn AddressSpace, addr: UserAddr) -> SysResult<()> {
    if addr.is_null() || !addr.is_user() || aspace.translate(addr).is_none() {
        log::warn!("invalid user address {addr}");
        return Err(Terminate::FAULT);
    }
    Ok(())
}

/// Translate a validated user address into its kernel-space equivalent.
///
/// Re-validates `addr`, then maps it through the process page table. The
/// translation itself can still fail for an address whose raw value passed
/// the range check; that too is a fatal boundary violation.
///
/// # Errors
/// Returns [`Terminate::FAULT`] if `addr` fails validation or has no
/// present page.
pub fn user_to_kernel(aspace: &dyn AddressSpace, addr: UserAddr) -> SysResult<NonNull<u8>> {
    check_user(aspace, addr)?;
    aspace.translate(addr).ok_or_else(|| {
        log::warn!("unmapped user address {addr}");
        Terminate::FAULT
    })
}

/// The raw argument vector of one trap.
///
/// The vector lives in user memory, addressed by the saved user stack
/// pointer: word 0 is the operation selector, words 1.. are the arguments.
/// Construction validates the selector slot; [`ArgStream::expect`] must be
/// called with the operation's argument count before any argument slot is
/// read.
pub struct ArgStream<'a> {
    aspace: &'a dyn AddressSpace,
    base: UserAddr,
}

impl<'a> ArgStream<'a> {
    /// Capture the argument vector at the saved user stack pointer.
    ///
    /// # Errors
    /// Terminates the process if the selector slot is invalid.
    pub fn new(aspace: &'a dyn AddressSpace, sp: UserAddr) -> SysResult<Self> {
        check_user(aspace, sp)?;
        Ok(Self { aspace, base: sp })
    }

    /// User address of word slot `index`.
    fn slot(&self, index: usize) -> SysResult<UserAddr> {
        let offset = index.checked_mul(WORD).ok_or(Terminate::FAULT)?;
        self.base.offset(offset).ok_or(Terminate::FAULT)
    }

    /// Validate every slot the operation will read.
    ///
    /// Checks `argc + 1` consecutive word slots starting at the selector.
    ///
    /// # Errors
    /// Terminates the process if any slot address is invalid.
    pub fn expect(&self, argc: usize) -> SysResult<()> {
        for index in 0..=argc {
            check_user(self.aspace, self.slot(index)?)?;
        }
        Ok(())
    }

    /// The operation selector (word 0).
    pub fn selector(&self) -> SysResult<usize> {
        self.word(0)
    }

    /// Read word slot `index` as a raw value.
    ///
    /// The slot must have been covered by [`ArgStream::expect`] (slot 0 is
    /// covered by construction).
    pub fn word(&self, index: usize) -> SysResult<usize> {
        let kernel = user_to_kernel(self.aspace, self.slot(index)?)?;
        // SAFETY: the slot base was translated to a present page and the
        // AddressSpace contract guarantees the mapping is contiguous for
        // the bytes of the word. User stacks give no alignment guarantee,
        // hence the unaligned read.
        Ok(unsafe { kernel.cast::<usize>().as_ptr().read_unaligned() })
    }

    /// Interpret word slot `index` as a user pointer and translate it.
    ///
    /// # Errors
    /// Terminates the process if the pointed-to address is null, out of
    /// range, or unmapped.
    pub fn pointer(&self, index: usize) -> SysResult<NonNull<u8>> {
        user_to_kernel(self.aspace, UserAddr::new(self.word(index)?))
    }

    /// Interpret word slot `index` as a pointer to a NUL-terminated string.
    ///
    /// Returns the string bytes without the terminator, viewed through the
    /// kernel mapping.
    pub fn cstr(&self, index: usize) -> SysResult<&'a [u8]> {
        let kernel = self.pointer(index)?;
        let start = kernel.as_ptr();
        let mut len = 0usize;
        // SAFETY: the base address was translated to a present page; the
        // AddressSpace contract guarantees the mapping stays contiguous
        // through the terminator the user program supplied.
        unsafe {
            while start.add(len).read() != 0 {
                len += 1;
            }
            Ok(core::slice::from_raw_parts(start, len))
        }
    }
}
