//! Gate acquisition and mailbox dispatch, exercised together the way a
//! real caller would: create a gate in the registry, publish it through a
//! real name server, open it elsewhere, acquire/release it, then drain a
//! few mailbox events from the same peer.

use std::cell::{Cell, RefCell};

use drv_xproc_nameserver::{name, NameTable};
use xproc_abi::{CoreId, Error, LocalProtectionKind, RemoteProtectionKind};
use xproc_kern::gate::{acquire, HwSpinlock, LocalProtection};
use xproc_kern::gate_registry::GateRegistry;
use xproc_kern::mailbox::{Dispatcher, Event, Listener, MailboxHw};

struct FakeHw {
    locked: Cell<bool>,
}

impl HwSpinlock for FakeHw {
    fn try_lock(&self, _index: u8) -> bool {
        if self.locked.get() {
            false
        } else {
            self.locked.set(true);
            true
        }
    }
    fn unlock(&self, _index: u8) {
        self.locked.set(false);
    }
}

struct FakeLocal {
    depth: Cell<u32>,
}

impl LocalProtection for FakeLocal {
    type Token = ();
    fn enter(&self, _kind: LocalProtectionKind) -> Self::Token {
        self.depth.set(self.depth.get() + 1);
    }
    fn exit(&self, _kind: LocalProtectionKind, _token: Self::Token) {
        self.depth.set(self.depth.get() - 1);
    }
}

#[test]
fn create_publish_open_then_acquire_release() {
    let mut registry: GateRegistry<8> = GateRegistry::default();
    let mut names: NameTable<8> = NameTable::default();

    let created = registry
        .create(
            RemoteProtectionKind::SYSTEM,
            LocalProtectionKind::THREAD_PROCESS,
            CoreId::HOST,
            Some(name("fwupdate")),
            &mut names,
        )
        .unwrap();

    let opened = registry.open(&name("fwupdate"), &names).unwrap();
    let descriptor = registry.descriptor(&opened).unwrap();
    assert_eq!(descriptor.hw_lock_index, created.resource_id);

    let hw = FakeHw {
        locked: Cell::new(false),
    };
    let local = FakeLocal {
        depth: Cell::new(0),
    };

    let guard = acquire(&hw, &local, descriptor, 10).unwrap();
    assert!(hw.locked.get());
    assert_eq!(local.depth.get(), 1);
    drop(guard);
    assert!(!hw.locked.get());
    assert_eq!(local.depth.get(), 0);
}

#[test]
fn concurrent_acquire_attempt_fails_fast() {
    let mut registry: GateRegistry<8> = GateRegistry::default();
    let mut names: NameTable<8> = NameTable::default();
    registry
        .create(
            RemoteProtectionKind::SYSTEM,
            LocalProtectionKind::NONE,
            CoreId::HOST,
            Some(name("lock-a")),
            &mut names,
        )
        .unwrap();
    let handle = registry.open(&name("lock-a"), &names).unwrap();
    let descriptor = registry.descriptor(&handle).unwrap();

    let hw = FakeHw {
        locked: Cell::new(false),
    };
    let local_a = FakeLocal {
        depth: Cell::new(0),
    };
    let local_b = FakeLocal {
        depth: Cell::new(0),
    };

    let _first = acquire(&hw, &local_a, descriptor, 10).unwrap();
    let second = acquire(&hw, &local_b, descriptor, 3);
    assert_eq!(second.err(), Some(Error::GateAlreadyHeld));
}

#[test]
fn opening_an_unknown_address_is_rejected() {
    let mut registry: GateRegistry<8> = GateRegistry::default();
    assert!(registry
        .open_by_address(RemoteProtectionKind::SYSTEM, 9)
        .is_err());
}

#[test]
fn gate_is_in_use_until_every_opener_closes_and_deletes() {
    let mut registry: GateRegistry<8> = GateRegistry::default();
    let mut names: NameTable<8> = NameTable::default();
    let created = registry
        .create(
            RemoteProtectionKind::SYSTEM,
            LocalProtectionKind::NONE,
            CoreId::HOST,
            None,
            &mut names,
        )
        .unwrap();
    assert!(registry.is_in_use(RemoteProtectionKind::SYSTEM, created.resource_id));

    let opened = registry
        .open_by_address(RemoteProtectionKind::SYSTEM, created.resource_id)
        .unwrap();
    registry
        .close(RemoteProtectionKind::SYSTEM, opened.resource_id)
        .unwrap();
    assert!(registry.is_in_use(RemoteProtectionKind::SYSTEM, created.resource_id));

    registry
        .delete(RemoteProtectionKind::SYSTEM, created.resource_id)
        .unwrap();
    assert!(!registry.is_in_use(RemoteProtectionKind::SYSTEM, created.resource_id));
}

struct QueueHw {
    fifo: RefCell<std::collections::VecDeque<u32>>,
}

impl MailboxHw for QueueHw {
    fn drain_one(&self, _peer: CoreId) -> Option<u32> {
        self.fifo.borrow_mut().pop_front()
    }
    fn send(&self, _peer: CoreId, payload: u32) {
        self.fifo.borrow_mut().push_back(payload);
    }
}

struct Collector {
    events: Vec<Event>,
}

impl Listener for Collector {
    fn on_event(&mut self, event: Event) {
        self.events.push(event);
    }
}

#[test]
fn mailbox_drains_interrupt_then_dispatches_on_poll() {
    let hw = QueueHw {
        fifo: RefCell::new(std::collections::VecDeque::new()),
    };
    hw.send(CoreId(5), 10);
    hw.send(CoreId(5), 20);

    let mut dispatcher: Dispatcher<16, 4> = Dispatcher::default();
    dispatcher.register(CoreId(5), 0).unwrap();
    dispatcher.on_interrupt(&hw, &[CoreId(5)]).unwrap();

    let mut collector = Collector { events: Vec::new() };
    let delivered = dispatcher.poll(&mut collector);

    assert_eq!(delivered, 2);
    assert_eq!(collector.events.len(), 2);
    assert_eq!(collector.events[0].payload, 10);
    assert_eq!(collector.events[1].payload, 20);
}

#[test]
fn acquire_with_the_real_local_protection_driver() {
    use drv_xproc_localprot::CriticalSectionLocal;

    let mut registry: GateRegistry<8> = GateRegistry::default();
    let mut names: NameTable<8> = NameTable::default();
    registry
        .create(
            RemoteProtectionKind::SYSTEM,
            LocalProtectionKind::INTERRUPT,
            CoreId::HOST,
            Some(name("critical-section")),
            &mut names,
        )
        .unwrap();
    let handle = registry.open(&name("critical-section"), &names).unwrap();
    let descriptor = registry.descriptor(&handle).unwrap();

    let hw = FakeHw {
        locked: Cell::new(false),
    };
    let local = CriticalSectionLocal;

    let guard = acquire(&hw, &local, descriptor, 10).unwrap();
    assert!(hw.locked.get());
    drop(guard);
    assert!(!hw.locked.get());
}
