mod common;

use common::{drain, draining, log, pipe, poke};
use excubitor::{EventLoop, Interest, IoSource};

use std::cell::Cell;
use std::os::fd::AsRawFd;
use std::rc::Rc;

#[test]
fn test_run_dispatches_urgent_source_first() {
    let event_loop = EventLoop::new().unwrap();
    let log = log();

    let (low_rx, low_tx) = pipe();
    let (high_rx, high_tx) = pipe();

    let mut sources = Vec::new();
    for (rx, priority, name) in [(&low_rx, 5, "p5"), (&high_rx, 1, "p1")] {
        let source = IoSource::new(rx.as_raw_fd(), Interest::READABLE);
        source.set_priority(priority);

        let handle = event_loop.downgrade();
        let seen = log.clone();
        let mut record = draining(&log, name);
        source.set_callback(
            move |fd| {
                let keep = record(fd);
                if seen.borrow().len() == 2 {
                    handle.quit();
                }
                keep
            },
            None,
        );

        event_loop.add_source(&source);
        sources.push(source);
    }

    poke(&low_tx);
    poke(&high_tx);

    event_loop.run().unwrap();

    assert_eq!(*log.borrow(), vec!["p1", "p5"]);
}

#[test]
fn test_removed_source_never_signaled_again() {
    let event_loop = EventLoop::new().unwrap();

    let (rx, tx) = pipe();
    let (stop_rx, stop_tx) = pipe();

    let calls = Rc::new(Cell::new(0));
    let released = Rc::new(Cell::new(false));

    let source = IoSource::new(rx.as_raw_fd(), Interest::READABLE);
    let seen = calls.clone();
    let flag = released.clone();
    source.set_callback(
        move |fd| {
            drain(fd.raw_fd());
            seen.set(seen.get() + 1);
            false
        },
        Some(Box::new(move || flag.set(true))),
    );
    event_loop.add_source(&source);
    drop(source);
    poke(&tx);

    // Less urgent: on its first dispatch it makes the removed pipe
    // readable again and stays queued, so at least one more poll runs
    // before it quits the loop on the second.
    let stop = IoSource::new(stop_rx.as_raw_fd(), Interest::READABLE);
    stop.set_priority(10);
    let handle = event_loop.downgrade();
    let mut rounds = 0;
    stop.set_callback(
        move |fd| {
            rounds += 1;
            if rounds == 1 {
                poke(&tx);
            } else {
                drain(fd.raw_fd());
                fd.clear_ready(Interest::READABLE);
                handle.quit();
            }
            true
        },
        None,
    );
    event_loop.add_source(&stop);

    poke(&stop_tx);
    event_loop.run().unwrap();

    assert_eq!(calls.get(), 1);
    assert!(released.get(), "loop handle was the last reference");
    assert_eq!(event_loop.registered_fds(), vec![stop_rx.as_raw_fd()]);
}

#[test]
fn test_quit_waits_for_dispatch_to_finish() {
    let event_loop = EventLoop::new().unwrap();
    let log = log();

    let (a_rx, a_tx) = pipe();
    let (b_rx, b_tx) = pipe();

    let a = IoSource::new(a_rx.as_raw_fd(), Interest::READABLE);
    let handle = event_loop.downgrade();
    let steps = log.clone();
    a.set_callback(
        move |fd| {
            steps.borrow_mut().push("before quit");
            handle.quit();

            let still_running = handle.upgrade().is_some_and(|l| l.is_running());
            assert!(!still_running);

            drain(fd.raw_fd());
            fd.clear_ready(Interest::READABLE);
            steps.borrow_mut().push("after quit");
            true
        },
        None,
    );

    let b = IoSource::new(b_rx.as_raw_fd(), Interest::READABLE);
    b.set_priority(3);
    b.set_callback(draining(&log, "b"), None);

    event_loop.add_source(&a);
    event_loop.add_source(&b);

    poke(&a_tx);
    poke(&b_tx);

    event_loop.run().unwrap();

    assert_eq!(*log.borrow(), vec!["before quit", "after quit"]);
    assert_eq!(event_loop.pending_len(), 1);
    assert!(a.is_attached());
    assert!(b.is_attached());
}
