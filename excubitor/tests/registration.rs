mod common;

use common::{counted, draining, log, pipe, poke};
use excubitor::{EventLoop, EventSource, Interest, IoSource};

use std::cell::Cell;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;

fn union_of(sources: &[&EventSource]) -> Vec<RawFd> {
    let mut fds: Vec<RawFd> = sources
        .iter()
        .filter(|s| s.is_attached())
        .flat_map(|s| s.fds())
        .map(|fd| fd.raw_fd())
        .collect();
    fds.sort_unstable();
    fds
}

#[test]
fn test_add_source_twice_is_rejected() {
    let event_loop = EventLoop::new().unwrap();
    let (rx, _tx) = pipe();
    let (source, counters) = counted(&rx);

    assert!(event_loop.add_source(&source));
    assert!(!event_loop.add_source(&source));

    assert_eq!(event_loop.source_count(), 1);
    assert_eq!(event_loop.registered_fds(), vec![rx.as_raw_fd()]);
    assert_eq!(counters.prepares.get(), 1);
    assert_eq!(source.ref_count(), 2);
}

#[test]
fn test_source_cannot_join_two_loops() {
    let first = EventLoop::new().unwrap();
    let second = EventLoop::new().unwrap();
    let (rx, _tx) = pipe();
    let (source, _) = counted(&rx);

    assert!(first.add_source(&source));
    assert!(!second.add_source(&source));
    assert!(!second.del_source(&source));

    assert!(second.registered_fds().is_empty());
    assert!(first.del_source(&source));
    assert!(second.add_source(&source));
}

#[test]
fn test_del_source_requires_registration() {
    let event_loop = EventLoop::new().unwrap();
    let (rx, _tx) = pipe();
    let (source, _) = counted(&rx);

    assert!(!event_loop.del_source(&source));

    event_loop.add_source(&source);
    assert!(event_loop.del_source(&source));
    assert!(!event_loop.del_source(&source));

    assert!(!source.is_attached());
    assert_eq!(source.ref_count(), 1);
}

#[test]
fn test_registered_fds_match_registered_sources() {
    let event_loop = EventLoop::new().unwrap();

    let pipes: Vec<_> = (0..4).map(|_| pipe()).collect();
    let a = IoSource::new(pipes[0].0.as_raw_fd(), Interest::READABLE);
    let b = IoSource::new(pipes[1].0.as_raw_fd(), Interest::READABLE);
    let c = IoSource::empty();
    c.add_fd(pipes[2].0.as_raw_fd(), Interest::READABLE);
    c.add_fd(pipes[3].0.as_raw_fd(), Interest::READABLE);

    let all = [&a, &b, &c];
    let check = || assert_eq!(event_loop.registered_fds(), union_of(&all));

    check();
    event_loop.add_source(&a);
    check();
    event_loop.add_source(&c);
    check();
    event_loop.del_source(&a);
    check();
    event_loop.add_source(&b);
    event_loop.add_source(&a);
    check();
    event_loop.del_source(&c);
    event_loop.del_source(&b);
    check();
    event_loop.del_source(&a);
    check();

    assert!(event_loop.registered_fds().is_empty());
}

#[test]
fn test_fds_added_and_removed_while_registered() {
    let event_loop = EventLoop::new().unwrap();
    let log = log();

    let (first_rx, _first_tx) = pipe();
    let (second_rx, second_tx) = pipe();

    let source = IoSource::new(first_rx.as_raw_fd(), Interest::READABLE);
    source.set_callback(draining(&log, "io"), None);
    event_loop.add_source(&source);

    let second = source.add_fd(second_rx.as_raw_fd(), Interest::READABLE);
    assert_eq!(
        event_loop.registered_fds().len(),
        2,
        "fd added to a registered source is watched"
    );

    poke(&second_tx);
    assert!(event_loop.iterate(false).unwrap());
    assert_eq!(*log.borrow(), vec!["io"]);

    assert!(source.del_fd(&second));
    assert!(!source.del_fd(&second));
    assert!(second.source().is_none());
    assert_eq!(event_loop.registered_fds(), vec![first_rx.as_raw_fd()]);

    poke(&second_tx);
    assert!(!event_loop.iterate(false).unwrap());
}

#[test]
fn test_failed_fd_registration_does_not_block_others() {
    let event_loop = EventLoop::new().unwrap();
    let (rx, tx) = pipe();
    let log = log();

    let source = IoSource::empty();
    source.add_fd(-1, Interest::READABLE);
    source.add_fd(rx.as_raw_fd(), Interest::READABLE);
    source.set_callback(draining(&log, "ok"), None);

    assert!(event_loop.add_source(&source));
    assert_eq!(event_loop.registered_fds(), vec![rx.as_raw_fd()]);

    poke(&tx);
    assert!(event_loop.iterate(false).unwrap());
    assert_eq!(*log.borrow(), vec!["ok"]);

    assert!(event_loop.del_source(&source));
    assert!(event_loop.registered_fds().is_empty());
}

#[test]
fn test_loop_shares_source_ownership() {
    let event_loop = EventLoop::new().unwrap();
    let (rx, _tx) = pipe();
    let destroyed = Rc::new(Cell::new(0));

    let source = IoSource::new(rx.as_raw_fd(), Interest::READABLE);
    let flag = destroyed.clone();
    source.set_callback(|_| true, Some(Box::new(move || flag.set(flag.get() + 1))));

    assert_eq!(source.ref_count(), 1);
    event_loop.add_source(&source);
    assert_eq!(source.ref_count(), 2);

    // The loop keeps the source alive after the caller lets go.
    let fd = source.fds().remove(0);
    drop(source);
    assert_eq!(destroyed.get(), 0);
    assert!(fd.source().is_some());

    drop(event_loop);
    assert_eq!(destroyed.get(), 1);
    assert!(fd.source().is_none());
}

#[test]
fn test_dropping_loop_releases_sources() {
    let (rx, tx) = pipe();
    let destroyed = Rc::new(Cell::new(false));

    let source = IoSource::new(rx.as_raw_fd(), Interest::READABLE);
    let flag = destroyed.clone();
    source.set_callback(|_| true, Some(Box::new(move || flag.set(true))));

    {
        let event_loop = EventLoop::new().unwrap();
        let clone = event_loop.clone();
        assert_eq!(event_loop.ref_count(), 2);

        event_loop.add_source(&source);
        poke(&tx);
        event_loop.iterate(false).unwrap();

        drop(clone);
        assert!(source.is_attached());
    }

    assert!(!source.is_attached());
    assert_eq!(source.ref_count(), 1);
    assert!(!source.fds()[0].is_dispatched());
    assert!(!destroyed.get());

    // A released source can join a new loop.
    let event_loop = EventLoop::new().unwrap();
    assert!(event_loop.add_source(&source));
}

#[test]
fn test_weak_loop_handle() {
    let event_loop = EventLoop::new().unwrap();
    let weak = event_loop.downgrade();

    assert!(weak.upgrade().is_some());
    assert_eq!(event_loop.ref_count(), 1);

    drop(event_loop);
    assert!(weak.upgrade().is_none());
    weak.quit();
}
