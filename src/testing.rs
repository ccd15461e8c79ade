//! In-memory collaborator implementations for testing.
//!
//! Provides test doubles for every external interface the boundary
//! consumes: a flat-mapped address space with staging helpers, a
//! BTreeMap-backed filesystem with an observable close counter, a
//! recording console, and a stub process manager. Nothing here persists
//! data.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::services::{AddressSpace, Console, File, FileObject, FileSystem, Pid, ProcessManager};
use crate::syscall::validate::UserAddr;

/// An address space with one contiguous mapped window.
///
/// Addresses in `[base, base + len)` translate into a private backing
/// buffer; everything else reports unmapped. Cloning shares the backing
/// buffer, so a test can keep a handle for staging argument vectors after
/// moving a clone into a [`crate::Process`].
#[derive(Clone)]
pub struct FlatAddressSpace {
    inner: Arc<FlatInner>,
}

struct FlatInner {
    base: usize,
    mem: UnsafeCell<Box<[u8]>>,
}

// SAFETY: tests serialize access to the backing buffer through the
// kernel's locks and their own sequencing; the mock hands out raw
// pointers exactly like a real page table would.
unsafe impl Send for FlatInner {}
unsafe impl Sync for FlatInner {}

impl FlatAddressSpace {
    /// Map a zero-filled window of `len` bytes at user address `base`.
    pub fn new(base: usize, len: usize) -> Self {
        Self {
            inner: Arc::new(FlatInner {
                base,
                mem: UnsafeCell::new(vec![0u8; len].into_boxed_slice()),
            }),
        }
    }

    fn window_len(&self) -> usize {
        // SAFETY: the length of the boxed slice never changes.
        unsafe { (&(*self.inner.mem.get())).len() }
    }

    fn offset_of(&self, addr: UserAddr) -> Option<usize> {
        let addr = addr.as_usize();
        if addr >= self.inner.base && addr < self.inner.base + self.window_len() {
            Some(addr - self.inner.base)
        } else {
            None
        }
    }

    /// Write raw bytes into the window.
    ///
    /// # Panics
    /// Panics if the range is outside the mapped window.
    pub fn write_bytes(&self, addr: UserAddr, bytes: &[u8]) {
        let offset = self.offset_of(addr).expect("address outside mapped window");
        assert!(offset + bytes.len() <= self.window_len());
        // SAFETY: range checked above; tests do not write concurrently
        // with kernel access to the same bytes.
        unsafe {
            let dst = (*self.inner.mem.get()).as_mut_ptr().add(offset);
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        }
    }

    /// Write one argument-vector word into the window.
    pub fn write_word(&self, addr: UserAddr, value: usize) {
        self.write_bytes(addr, &value.to_ne_bytes());
    }

    /// Write consecutive words starting at `sp`: a staged argument vector.
    pub fn stage(&self, sp: UserAddr, words: &[usize]) {
        for (index, &word) in words.iter().enumerate() {
            let slot = sp.offset(index * core::mem::size_of::<usize>()).unwrap();
            self.write_word(slot, word);
        }
    }

    /// Write a NUL-terminated string into the window.
    pub fn write_cstr(&self, addr: UserAddr, s: &str) {
        self.write_bytes(addr, s.as_bytes());
        self.write_bytes(addr.offset(s.len()).unwrap(), &[0]);
    }

    /// Copy `len` bytes out of the window.
    pub fn read_bytes(&self, addr: UserAddr, len: usize) -> Vec<u8> {
        let offset = self.offset_of(addr).expect("address outside mapped window");
        assert!(offset + len <= self.window_len());
        let mut out = vec![0u8; len];
        // SAFETY: range checked above.
        unsafe {
            let src = (*self.inner.mem.get()).as_ptr().add(offset);
            core::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), len);
        }
        out
    }
}

impl AddressSpace for FlatAddressSpace {
    fn translate(&self, addr: UserAddr) -> Option<NonNull<u8>> {
        let offset = self.offset_of(addr)?;
        // SAFETY: offset is inside the backing buffer; the buffer lives as
        // long as any clone of this address space.
        NonNull::new(unsafe { (*self.inner.mem.get()).as_mut_ptr().add(offset) })
    }
}

/// Shared observable state of a [`MemoryFs`].
pub struct FsState {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    closes: AtomicUsize,
}

impl FsState {
    /// Number of file objects closed so far.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Current contents of a file, if it exists.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }
}

/// In-memory filesystem for testing.
///
/// Files are byte vectors in a map. Writes grow the file as needed; a
/// close is counted on the shared [`FsState`] so tests can observe
/// descriptor draining.
pub struct MemoryFs {
    state: Arc<FsState>,
}

impl MemoryFs {
    /// Create an empty in-memory filesystem.
    pub fn new() -> Self {
        Self {
            state: Arc::new(FsState {
                files: Mutex::new(BTreeMap::new()),
                closes: AtomicUsize::new(0),
            }),
        }
    }

    /// Handle to the shared state, for inspection after the filesystem
    /// has been moved into a kernel.
    pub fn state(&self) -> Arc<FsState> {
        self.state.clone()
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemoryFs {
    fn create(&mut self, path: &str, size: usize) -> bool {
        let mut files = self.state.files.lock();
        if files.contains_key(path) {
            return false;
        }
        files.insert(String::from(path), vec![0u8; size]);
        true
    }

    fn remove(&mut self, path: &str) -> bool {
        self.state.files.lock().remove(path).is_some()
    }

    fn open(&mut self, path: &str) -> Option<FileObject> {
        if !self.state.files.lock().contains_key(path) {
            return None;
        }
        Some(Box::new(MemFile {
            state: self.state.clone(),
            path: String::from(path),
            pos: 0,
        }))
    }
}

struct MemFile {
    state: Arc<FsState>,
    path: String,
    pos: usize,
}

impl File for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let files = self.state.files.lock();
        let Some(data) = files.get(&self.path) else {
            return 0;
        };
        let available = data.len().saturating_sub(self.pos);
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let mut files = self.state.files.lock();
        let Some(data) = files.get_mut(&self.path) else {
            return 0;
        };
        let end = self.pos + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        buf.len()
    }

    fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn tell(&self) -> usize {
        self.pos
    }

    fn len(&self) -> usize {
        self.state
            .files
            .lock()
            .get(&self.path)
            .map_or(0, Vec::len)
    }

    fn close(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Shared observable state of a [`RecordingConsole`].
pub struct ConsoleState {
    output: Mutex<Vec<u8>>,
    input: Mutex<VecDeque<u8>>,
}

impl ConsoleState {
    /// Everything written to the console so far.
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }

    /// Queue bytes for `read_byte` to return.
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }
}

/// Console double that records output and replays queued input.
pub struct RecordingConsole {
    state: Arc<ConsoleState>,
}

impl RecordingConsole {
    /// Create a console with empty output and input queues.
    pub fn new() -> Self {
        Self {
            state: Arc::new(ConsoleState {
                output: Mutex::new(Vec::new()),
                input: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Handle to the shared state.
    pub fn state(&self) -> Arc<ConsoleState> {
        self.state.clone()
    }
}

impl Default for RecordingConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for RecordingConsole {
    fn write(&mut self, bytes: &[u8]) {
        self.state.output.lock().extend_from_slice(bytes);
    }

    fn read_byte(&mut self) -> u8 {
        self.state.input.lock().pop_front().unwrap_or(0)
    }
}

/// Shared observable state of a [`StubProcessManager`].
pub struct ProcState {
    spawned: Mutex<Vec<String>>,
    next_pid: AtomicUsize,
    wait_results: Mutex<BTreeMap<usize, i64>>,
}

impl ProcState {
    /// Command lines passed to `spawn`, in order.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().clone()
    }

    /// Preset the result `wait` reports for `pid`.
    pub fn set_wait_result(&self, pid: Pid, code: i64) {
        self.wait_results.lock().insert(pid.as_usize(), code);
    }
}

/// Process-manager double.
///
/// Spawning an empty command line fails (the failure knob); anything else
/// is recorded and assigned the next pid starting at 1. `wait` reports a
/// preset result, or -1 for unknown pids.
pub struct StubProcessManager {
    state: Arc<ProcState>,
}

impl StubProcessManager {
    /// Create a manager with no spawned processes.
    pub fn new() -> Self {
        Self {
            state: Arc::new(ProcState {
                spawned: Mutex::new(Vec::new()),
                next_pid: AtomicUsize::new(1),
                wait_results: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Handle to the shared state.
    pub fn state(&self) -> Arc<ProcState> {
        self.state.clone()
    }
}

impl Default for StubProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager for StubProcessManager {
    fn spawn(&mut self, cmdline: &str) -> Option<Pid> {
        if cmdline.is_empty() {
            return None;
        }
        self.state.spawned.lock().push(String::from(cmdline));
        Some(Pid::new(self.state.next_pid.fetch_add(1, Ordering::SeqCst)))
    }

    fn wait(&mut self, pid: Pid) -> i64 {
        self.state
            .wait_results
            .lock()
            .get(&pid.as_usize())
            .copied()
            .unwrap_or(-1)
    }
}
