//! End-to-end attach/detach handshake tests driven through
//! `xproc_kern::orchestrator`, the same entry point `xproc-client` calls.

use xproc_abi::{CoreId, Error};
use xproc_kern::orchestrator::{attach, detach, is_attached};

// Each test below uses a `CoreId` not used by any other test in this file:
// all tests share one process-wide `KernelState` and may run concurrently.

#[test]
fn fresh_pair_is_not_attached() {
    assert!(!is_attached(CoreId::HOST, CoreId(100)));
}

#[test]
fn attach_then_detach_round_trips() {
    let remote = CoreId(101);
    attach(CoreId::HOST, remote, None, None, &[]).unwrap();
    assert!(is_attached(CoreId::HOST, remote));
    detach(CoreId::HOST, remote, None, None, &[]).unwrap();
    assert!(!is_attached(CoreId::HOST, remote));
}

#[test]
fn detach_without_attach_fails() {
    let remote = CoreId(102);
    assert!(detach(CoreId::HOST, remote, None, None, &[]).is_err());
}

#[test]
fn reattach_after_detach_succeeds() {
    let remote = CoreId(103);
    attach(CoreId::HOST, remote, None, None, &[]).unwrap();
    detach(CoreId::HOST, remote, None, None, &[]).unwrap();
    // The old slot is retired, not reset; this must allocate a fresh one.
    attach(CoreId::HOST, remote, None, None, &[]).unwrap();
    assert!(is_attached(CoreId::HOST, remote));
}

#[test]
fn double_attach_is_refused_once_already_attached() {
    let remote = CoreId(104);
    attach(CoreId::HOST, remote, None, None, &[]).unwrap();
    assert_eq!(
        attach(CoreId::HOST, remote, None, None, &[]).unwrap_err(),
        Error::AlreadySetup
    );
    // the pair is still attached -- the refusal didn't tear anything down.
    assert!(is_attached(CoreId::HOST, remote));
}
