//! Descriptor Table and Handle Allocator
//!
//! The table is an ordered list of descriptor entries owned by exactly one
//! process; no cross-process locking is needed to read it. The allocator
//! is the only shared state: a single monotonic counter behind a mutex,
//! exposed through [`HandleAllocator::allocate`] and nothing else.

use alloc::vec::Vec;

use spin::Mutex;

use super::{FdError, Handle};
use crate::services::FileObject;

/// One open file held by a process.
///
/// The entry owns its file object exclusively. It is created by a
/// successful `open` and destroyed by `close` or by the exit coordinator.
pub struct DescriptorEntry {
    /// Handle the process uses to refer to the file.
    pub handle: Handle,
    /// The underlying open-file object.
    pub file: FileObject,
}

/// Ordered collection of a process's open descriptors.
pub struct DescriptorTable {
    entries: Vec<DescriptorEntry>,
}

impl DescriptorTable {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an entry for a freshly allocated handle.
    pub fn insert(&mut self, handle: Handle, file: FileObject) {
        self.entries.push(DescriptorEntry { handle, file });
    }

    /// Resolve a handle to its open-file object.
    ///
    /// Scans only this table, so a handle allocated to another process is
    /// `NotOpen` here even though it is live elsewhere.
    pub fn lookup(&mut self, handle: Handle) -> Result<&mut FileObject, FdError> {
        if handle.is_reserved() {
            return Err(FdError::Reserved);
        }
        self.entries
            .iter_mut()
            .find(|entry| entry.handle == handle)
            .map(|entry| &mut entry.file)
            .ok_or(FdError::NotOpen)
    }

    /// Remove the entry for `handle`, returning the owned file object.
    ///
    /// The caller is responsible for closing the file under the filesystem
    /// lock. Reserved sentinels are never present and are rejected.
    pub fn release(&mut self, handle: Handle) -> Result<FileObject, FdError> {
        if handle.is_reserved() {
            return Err(FdError::Reserved);
        }
        let index = self
            .entries
            .iter()
            .position(|entry| entry.handle == handle)
            .ok_or(FdError::NotOpen)?;
        Ok(self.entries.remove(index).file)
    }

    /// Remove and return the first remaining entry.
    ///
    /// Used by the exit coordinator to drain the table.
    pub fn take_first(&mut self) -> Option<DescriptorEntry> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Number of live descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the live handles, in insertion order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.entries.iter().map(|entry| entry.handle)
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// System-wide handle allocator.
///
/// One instance exists per kernel. The counter starts at
/// [`Handle::FIRST_FILE`], is shared by every process, and never resets,
/// so a retired handle is never reissued. Only the allocation operation is
/// exposed; the raw counter is not.
pub struct HandleAllocator {
    next: Mutex<usize>,
}

impl HandleAllocator {
    /// Create an allocator with the counter at [`Handle::FIRST_FILE`].
    pub const fn new() -> Self {
        Self {
            next: Mutex::new(Handle::FIRST_FILE.as_usize()),
        }
    }

    /// Assign the next handle, under mutual exclusion on the counter.
    ///
    /// The lock is held only around the increment and is never nested
    /// inside the filesystem lock.
    pub fn allocate(&self) -> Handle {
        let mut next = self.next.lock();
        let handle = Handle::from_raw(*next);
        *next += 1;
        handle
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFs;
    use crate::services::FileSystem;

    fn open_file(fs: &mut MemoryFs, path: &str) -> FileObject {
        fs.create(path, 0);
        fs.open(path).unwrap()
    }

    #[test]
    fn allocation_is_monotonic_from_two() {
        let alloc = HandleAllocator::new();
        assert_eq!(alloc.allocate(), Handle::FIRST_FILE);
        assert_eq!(alloc.allocate(), Handle::from_raw(3));
        assert_eq!(alloc.allocate(), Handle::from_raw(4));
    }

    #[test]
    fn lookup_finds_only_inserted_handles() {
        let mut fs = MemoryFs::new();
        let mut table = DescriptorTable::new();
        table.insert(Handle::from_raw(2), open_file(&mut fs, "a"));
        assert!(table.lookup(Handle::from_raw(2)).is_ok());
        assert!(matches!(
            table.lookup(Handle::from_raw(3)),
            Err(FdError::NotOpen)
        ));
    }

    #[test]
    fn reserved_handles_are_rejected() {
        let mut table = DescriptorTable::new();
        assert!(matches!(table.lookup(Handle::STDIN), Err(FdError::Reserved)));
        assert!(matches!(table.lookup(Handle::STDOUT), Err(FdError::Reserved)));
        assert!(matches!(
            table.release(Handle::STDOUT),
            Err(FdError::Reserved)
        ));
    }

    #[test]
    fn release_removes_the_entry() {
        let mut fs = MemoryFs::new();
        let mut table = DescriptorTable::new();
        let handle = Handle::from_raw(2);
        table.insert(handle, open_file(&mut fs, "a"));
        assert!(table.release(handle).is_ok());
        assert!(matches!(table.lookup(handle), Err(FdError::NotOpen)));
        assert!(matches!(table.release(handle), Err(FdError::NotOpen)));
    }

    #[test]
    fn take_first_drains_in_insertion_order() {
        let mut fs = MemoryFs::new();
        let mut table = DescriptorTable::new();
        table.insert(Handle::from_raw(2), open_file(&mut fs, "a"));
        table.insert(Handle::from_raw(3), open_file(&mut fs, "b"));
        assert_eq!(table.take_first().unwrap().handle, Handle::from_raw(2));
        assert_eq!(table.take_first().unwrap().handle, Handle::from_raw(3));
        assert!(table.take_first().is_none());
        assert!(table.is_empty());
    }
}
