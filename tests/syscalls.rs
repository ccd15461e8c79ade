//! End-to-end syscall scenarios driven through the trap entry point,
//! against in-memory collaborators.

use std::collections::BTreeSet;
use std::sync::Arc;

use trapgate::services::Pid;
use trapgate::syscall::numbers::*;
use trapgate::testing::{
    ConsoleState, FlatAddressSpace, FsState, MemoryFs, ProcState, RecordingConsole,
    StubProcessManager,
};
use trapgate::{Kernel, Process, TrapFrame, TrapOutcome, UserAddr};

/// Base of the mapped user window used by every test process.
const BASE: usize = 0x0800_0000;
/// Window size: plenty for an argument vector, strings, and buffers.
const WINDOW: usize = 0x1_0000;
/// Where the staged argument vector lives.
const SP: usize = BASE + 0x100;
/// Scratch locations inside the window.
const STR_A: usize = BASE + 0x400;
const BUF_A: usize = BASE + 0x800;
const BUF_B: usize = BASE + 0xC00;

struct Machine {
    kernel: Kernel,
    fs: Arc<FsState>,
    console: Arc<ConsoleState>,
    procs: Arc<ProcState>,
}

fn machine() -> Machine {
    let fs = MemoryFs::new();
    let console = RecordingConsole::new();
    let procs = StubProcessManager::new();
    let (fs_state, console_state, procs_state) = (fs.state(), console.state(), procs.state());
    Machine {
        kernel: Kernel::new(Box::new(fs), Box::new(console), Box::new(procs)),
        fs: fs_state,
        console: console_state,
        procs: procs_state,
    }
}

fn user_process(name: &str) -> (Process, FlatAddressSpace) {
    let aspace = FlatAddressSpace::new(BASE, WINDOW);
    let process = Process::new(name, Box::new(aspace.clone()));
    (process, aspace)
}

/// Stage an argument vector and take one trap.
fn trap(
    kernel: &Kernel,
    process: &mut Process,
    aspace: &FlatAddressSpace,
    words: &[usize],
) -> (TrapOutcome, i64) {
    aspace.stage(UserAddr::new(SP), words);
    let mut frame = TrapFrame::new(UserAddr::new(SP));
    let outcome = kernel.handle_trap(process, &mut frame);
    (outcome, frame.result)
}

#[test]
fn open_write_seek_read_close_round_trip() {
    let m = machine();
    let (mut p, aspace) = user_process("io");
    aspace.write_cstr(UserAddr::new(STR_A), "a.txt");

    let (_, created) = trap(&m.kernel, &mut p, &aspace, &[SYS_CREATE, STR_A, 0]);
    assert_eq!(created, 1);

    let (outcome, h0) = trap(&m.kernel, &mut p, &aspace, &[SYS_OPEN, STR_A]);
    assert_eq!(outcome, TrapOutcome::Completed);
    assert!(h0 >= 2, "file handles start above the console sentinels");
    let h0 = h0 as usize;

    aspace.write_bytes(UserAddr::new(BUF_A), b"0123456789");
    let (_, written) = trap(&m.kernel, &mut p, &aspace, &[SYS_WRITE, h0, BUF_A, 10]);
    assert_eq!(written, 10);

    let (outcome, _) = trap(&m.kernel, &mut p, &aspace, &[SYS_SEEK, h0, 0]);
    assert_eq!(outcome, TrapOutcome::Completed);

    let (_, pos) = trap(&m.kernel, &mut p, &aspace, &[SYS_TELL, h0]);
    assert_eq!(pos, 0);

    let (_, size) = trap(&m.kernel, &mut p, &aspace, &[SYS_FILESIZE, h0]);
    assert_eq!(size, 10);

    let (_, read) = trap(&m.kernel, &mut p, &aspace, &[SYS_READ, h0, BUF_B, 10]);
    assert_eq!(read, 10);
    assert_eq!(aspace.read_bytes(UserAddr::new(BUF_B), 10), b"0123456789");

    let (outcome, _) = trap(&m.kernel, &mut p, &aspace, &[SYS_CLOSE, h0]);
    assert_eq!(outcome, TrapOutcome::Completed);
    assert_eq!(m.fs.closes(), 1);

    // The handle is dead now: using it again is a fatal violation.
    let (outcome, _) = trap(&m.kernel, &mut p, &aspace, &[SYS_FILESIZE, h0]);
    assert_eq!(outcome, TrapOutcome::Exited(-1));
    assert_eq!(p.exit_code(), Some(-1));
}

#[test]
fn handles_are_unique_across_concurrent_processes() {
    let m = machine();
    let kernel = &m.kernel;
    let handles: Vec<Vec<i64>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                scope.spawn(move || {
                    let (mut p, aspace) = user_process("worker");
                    aspace.write_cstr(UserAddr::new(STR_A), &format!("f{worker}"));
                    let (_, created) = trap(kernel, &mut p, &aspace, &[SYS_CREATE, STR_A, 0]);
                    assert_eq!(created, 1);
                    (0..32)
                        .map(|_| {
                            let (_, handle) = trap(kernel, &mut p, &aspace, &[SYS_OPEN, STR_A]);
                            assert!(handle >= 2);
                            handle
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    let mut all = BTreeSet::new();
    for per_process in &handles {
        // Strictly increasing within each process.
        assert!(per_process.windows(2).all(|w| w[0] < w[1]));
        for &handle in per_process {
            assert!(all.insert(handle), "handle {handle} issued twice");
        }
    }
    assert_eq!(all.len(), 4 * 32);
}

#[test]
fn close_of_standard_output_terminates() {
    let m = machine();
    let (mut p, aspace) = user_process("bad-close");
    let (outcome, _) = trap(&m.kernel, &mut p, &aspace, &[SYS_CLOSE, 1]);
    assert_eq!(outcome, TrapOutcome::Exited(-1));
    assert_eq!(p.exit_code(), Some(-1));
    let output = m.console.output();
    assert_eq!(String::from_utf8(output).unwrap(), "bad-close: exit(-1)\n");
}

#[test]
fn read_of_standard_output_is_a_sentinel_failure() {
    let m = machine();
    let (mut p, aspace) = user_process("p");
    let (outcome, result) = trap(&m.kernel, &mut p, &aspace, &[SYS_READ, 1, BUF_A, 8]);
    assert_eq!(outcome, TrapOutcome::Completed);
    assert_eq!(result, -1);
    // Buffer untouched.
    assert_eq!(aspace.read_bytes(UserAddr::new(BUF_A), 8), vec![0u8; 8]);
    assert_eq!(p.exit_code(), None);
}

#[test]
fn write_to_standard_input_terminates() {
    let m = machine();
    let (mut p, aspace) = user_process("p");
    let (outcome, _) = trap(&m.kernel, &mut p, &aspace, &[SYS_WRITE, 0, BUF_A, 8]);
    assert_eq!(outcome, TrapOutcome::Exited(-1));
    assert_eq!(p.exit_code(), Some(-1));
}

#[test]
fn console_write_and_read() {
    let m = machine();
    let (mut p, aspace) = user_process("tty");

    aspace.write_bytes(UserAddr::new(BUF_A), b"hello");
    let (_, written) = trap(&m.kernel, &mut p, &aspace, &[SYS_WRITE, 1, BUF_A, 5]);
    assert_eq!(written, 5);
    assert_eq!(m.console.output(), b"hello");

    m.console.push_input(b"abc");
    let (_, read) = trap(&m.kernel, &mut p, &aspace, &[SYS_READ, 0, BUF_B, 3]);
    assert_eq!(read, 3);
    assert_eq!(aspace.read_bytes(UserAddr::new(BUF_B), 3), b"abc");
}

#[test]
fn exit_records_code_and_drains_descriptors() {
    let m = machine();
    let (mut p, aspace) = user_process("worker");
    aspace.write_cstr(UserAddr::new(STR_A), "a");
    trap(&m.kernel, &mut p, &aspace, &[SYS_CREATE, STR_A, 4]);
    trap(&m.kernel, &mut p, &aspace, &[SYS_OPEN, STR_A]);
    trap(&m.kernel, &mut p, &aspace, &[SYS_OPEN, STR_A]);
    assert_eq!(p.descriptors.len(), 2);

    let (outcome, result) = trap(&m.kernel, &mut p, &aspace, &[SYS_EXIT, 5]);
    assert_eq!(outcome, TrapOutcome::Exited(5));
    assert_eq!(result, 5);
    assert_eq!(p.exit_code(), Some(5));
    assert!(p.descriptors.is_empty());
    assert_eq!(m.fs.closes(), 2);
    assert_eq!(
        String::from_utf8(m.console.output()).unwrap(),
        "worker: exit(5)\n"
    );
}

#[test]
fn unknown_selector_is_ignored() {
    let m = machine();
    let (mut p, aspace) = user_process("p");
    aspace.stage(UserAddr::new(SP), &[9999]);
    let mut frame = TrapFrame::new(UserAddr::new(SP));
    frame.result = 123;
    let outcome = m.kernel.handle_trap(&mut p, &mut frame);
    assert_eq!(outcome, TrapOutcome::Completed);
    assert_eq!(frame.result, 123, "result slot must be left untouched");
    assert_eq!(p.exit_code(), None);
}

#[test]
fn null_returns_argument_plus_one() {
    let m = machine();
    let (mut p, aspace) = user_process("p");
    let (_, result) = trap(&m.kernel, &mut p, &aspace, &[SYS_NULL, 41]);
    assert_eq!(result, 42);
}

#[test]
fn exec_forwards_command_line_and_wait_forwards_result() {
    let m = machine();
    let (mut p, aspace) = user_process("shell");

    aspace.write_cstr(UserAddr::new(STR_A), "echo hi");
    let (_, pid) = trap(&m.kernel, &mut p, &aspace, &[SYS_EXEC, STR_A]);
    assert_eq!(pid, 1);
    assert_eq!(m.procs.spawned(), vec![String::from("echo hi")]);

    // Spawn failure is a sentinel, not a termination.
    aspace.write_cstr(UserAddr::new(STR_A), "");
    let (outcome, failed) = trap(&m.kernel, &mut p, &aspace, &[SYS_EXEC, STR_A]);
    assert_eq!(outcome, TrapOutcome::Completed);
    assert_eq!(failed, -1);

    m.procs.set_wait_result(Pid::new(7), 33);
    let (_, status) = trap(&m.kernel, &mut p, &aspace, &[SYS_WAIT, 7]);
    assert_eq!(status, 33);
    let (_, status) = trap(&m.kernel, &mut p, &aspace, &[SYS_WAIT, 8]);
    assert_eq!(status, -1);
}

#[test]
fn create_and_remove_report_sentinels() {
    let m = machine();
    let (mut p, aspace) = user_process("p");
    aspace.write_cstr(UserAddr::new(STR_A), "f");

    let (_, created) = trap(&m.kernel, &mut p, &aspace, &[SYS_CREATE, STR_A, 16]);
    assert_eq!(created, 1);
    let (_, again) = trap(&m.kernel, &mut p, &aspace, &[SYS_CREATE, STR_A, 16]);
    assert_eq!(again, 0);

    let (_, removed) = trap(&m.kernel, &mut p, &aspace, &[SYS_REMOVE, STR_A]);
    assert_eq!(removed, 1);
    let (_, missing) = trap(&m.kernel, &mut p, &aspace, &[SYS_REMOVE, STR_A]);
    assert_eq!(missing, 0);

    let (outcome, opened) = trap(&m.kernel, &mut p, &aspace, &[SYS_OPEN, STR_A]);
    assert_eq!(outcome, TrapOutcome::Completed);
    assert_eq!(opened, -1);
}

#[test]
fn non_utf8_path_is_a_sentinel_failure() {
    let m = machine();
    let (mut p, aspace) = user_process("p");
    aspace.write_bytes(UserAddr::new(STR_A), &[0xff, 0xfe, 0]);
    let (outcome, created) = trap(&m.kernel, &mut p, &aspace, &[SYS_CREATE, STR_A, 0]);
    assert_eq!(outcome, TrapOutcome::Completed);
    assert_eq!(created, 0);
    let (_, opened) = trap(&m.kernel, &mut p, &aspace, &[SYS_OPEN, STR_A]);
    assert_eq!(opened, -1);
}

#[test]
fn halt_powers_down() {
    let m = machine();
    let (mut p, aspace) = user_process("p");
    let (outcome, _) = trap(&m.kernel, &mut p, &aspace, &[SYS_HALT]);
    assert_eq!(outcome, TrapOutcome::Shutdown);
}

#[test]
fn unmapped_buffer_terminates() {
    let m = machine();
    let (mut p, aspace) = user_process("p");
    let unmapped = BASE + 2 * WINDOW;
    let (outcome, _) = trap(&m.kernel, &mut p, &aspace, &[SYS_WRITE, 1, unmapped, 4]);
    assert_eq!(outcome, TrapOutcome::Exited(-1));
}

#[test]
fn unmapped_argument_vector_terminates() {
    let m = machine();
    let (mut p, _aspace) = user_process("p");
    let mut frame = TrapFrame::new(UserAddr::new(BASE - 0x1000));
    let outcome = m.kernel.handle_trap(&mut p, &mut frame);
    assert_eq!(outcome, TrapOutcome::Exited(-1));
    assert_eq!(p.exit_code(), Some(-1));
}

#[test]
fn descriptors_do_not_resolve_across_processes() {
    let m = machine();
    let (mut alice, alice_mem) = user_process("alice");
    let (mut bob, bob_mem) = user_process("bob");

    alice_mem.write_cstr(UserAddr::new(STR_A), "shared");
    trap(&m.kernel, &mut alice, &alice_mem, &[SYS_CREATE, STR_A, 8]);
    let (_, handle) = trap(&m.kernel, &mut alice, &alice_mem, &[SYS_OPEN, STR_A]);
    let handle = handle as usize;

    // The handle value is live in alice's table, but bob never received
    // it: resolution in bob's table is a fatal violation.
    let (outcome, _) = trap(&m.kernel, &mut bob, &bob_mem, &[SYS_FILESIZE, handle]);
    assert_eq!(outcome, TrapOutcome::Exited(-1));

    // Alice is unaffected.
    let (outcome, size) = trap(&m.kernel, &mut alice, &alice_mem, &[SYS_FILESIZE, handle]);
    assert_eq!(outcome, TrapOutcome::Completed);
    assert_eq!(size, 8);
}
