//! File Descriptors
//!
//! Per-process bookkeeping for open files: integer handles, the table that
//! maps a handle to its open-file object, and the system-wide handle
//! allocator.
//!
//! # Design
//! - Handles 0 and 1 are reserved sentinels for standard input and output;
//!   they never appear in any table
//! - File handles are drawn from a single monotonic counter shared by all
//!   processes, so two live descriptors never share a handle anywhere in
//!   the system
//! - Each table is owned exclusively by one process; lookups never cross
//!   process boundaries

mod table;

pub use table::{DescriptorEntry, DescriptorTable, HandleAllocator};

/// A descriptor handle.
///
/// This is a newtype to prevent using arbitrary integers as handles.
/// A handle says nothing about validity; resolution happens against the
/// owning process's [`DescriptorTable`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct Handle(usize);

impl Handle {
    /// Reserved sentinel for standard input.
    pub const STDIN: Self = Self(0);

    /// Reserved sentinel for standard output.
    pub const STDOUT: Self = Self(1);

    /// First handle value the allocator hands out.
    pub const FIRST_FILE: Self = Self(2);

    /// Create a handle from a raw argument word.
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Get the raw handle value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check whether this is one of the reserved console sentinels.
    #[inline]
    pub const fn is_reserved(self) -> bool {
        matches!(self, Self::STDIN | Self::STDOUT)
    }
}

impl core::fmt::Display for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

/// Error type for descriptor-table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// The handle is a reserved console sentinel.
    Reserved,
    /// No live descriptor with this handle in the table.
    NotOpen,
}

impl core::fmt::Display for FdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Reserved => write!(f, "reserved console handle"),
            Self::NotOpen => write!(f, "descriptor not open"),
        }
    }
}
