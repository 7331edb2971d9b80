use libc::{
    CLOCK_MONOTONIC, SFD_CLOEXEC, SFD_NONBLOCK, SIG_BLOCK, TFD_CLOEXEC, TFD_NONBLOCK, c_int, close,
    itimerspec, pthread_sigmask, read, sigaddset, sigemptyset, signalfd, signalfd_siginfo,
    sigset_t, timerfd_create, timerfd_settime, timespec,
};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::time::Duration;
use std::{io, mem};

/// Closes a file descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { close(fd) };
}

/// Reads exactly one `T` worth of bytes from a non-blocking descriptor.
///
/// Returns `ErrorKind::WouldBlock` when nothing is available.
///
/// # Safety
///
/// Every bit pattern must be a valid `T`.
unsafe fn sys_read_value<T: Copy>(fd: RawFd) -> io::Result<T> {
    let mut value = mem::MaybeUninit::<T>::zeroed();
    let size = mem::size_of::<T>();

    let n = unsafe { read(fd, value.as_mut_ptr() as *mut _, size) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    if n as usize != size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "short read from event descriptor",
        ));
    }

    Ok(unsafe { value.assume_init() })
}

/// Builds a signal set from a list of signal numbers.
fn sys_sigset(signals: &[c_int]) -> io::Result<sigset_t> {
    let mut set: sigset_t = unsafe { mem::zeroed() };

    unsafe { sigemptyset(&mut set) };
    for &signo in signals {
        if unsafe { sigaddset(&mut set, signo) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(set)
}

/// Blocks `signals` for the calling thread and opens a non-blocking
/// `signalfd` receiving them.
///
/// The signals stay blocked after the descriptor is closed: unblocking a
/// pending signal would run its default disposition.
pub(crate) fn sys_signalfd(signals: &[c_int]) -> io::Result<OwnedFd> {
    let set = sys_sigset(signals)?;

    let rc = unsafe { pthread_sigmask(SIG_BLOCK, &set, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }

    let fd = unsafe { signalfd(-1, &set, SFD_NONBLOCK | SFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Reads one queued signal from a `signalfd`, returning its number.
pub(crate) fn sys_read_signal(fd: RawFd) -> io::Result<c_int> {
    let info: signalfd_siginfo = unsafe { sys_read_value(fd)? };

    Ok(info.ssi_signo as c_int)
}

/// Creates a disarmed, non-blocking monotonic `timerfd`.
pub(crate) fn sys_timerfd() -> io::Result<OwnedFd> {
    let fd = unsafe { timerfd_create(CLOCK_MONOTONIC, TFD_NONBLOCK | TFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn to_timespec(duration: Duration) -> timespec {
    timespec {
        tv_sec: duration.as_secs() as _,
        tv_nsec: duration.subsec_nanos() as _,
    }
}

/// Arms a `timerfd` to expire after `after`, then every `interval`.
///
/// A zero `after` would disarm the timer, so it is rounded up to one
/// nanosecond.
pub(crate) fn sys_timerfd_arm(
    fd: RawFd,
    after: Duration,
    interval: Option<Duration>,
) -> io::Result<()> {
    let spec = itimerspec {
        it_value: to_timespec(after.max(Duration::from_nanos(1))),
        it_interval: to_timespec(interval.unwrap_or(Duration::ZERO)),
    };

    let rc = unsafe { timerfd_settime(fd, 0, &spec, std::ptr::null_mut()) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Disarms a `timerfd`, discarding expirations not read yet.
pub(crate) fn sys_timerfd_disarm(fd: RawFd) -> io::Result<()> {
    let spec = itimerspec {
        it_value: to_timespec(Duration::ZERO),
        it_interval: to_timespec(Duration::ZERO),
    };

    let rc = unsafe { timerfd_settime(fd, 0, &spec, std::ptr::null_mut()) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Reads the number of expirations since the last read.
pub(crate) fn sys_read_expirations(fd: RawFd) -> io::Result<u64> {
    unsafe { sys_read_value::<u64>(fd) }
}
