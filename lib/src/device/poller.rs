//! Edge-triggered wait on a V4L2 device node, used to learn when a V4L2 event can be dequeued.
//!
//! A [`Poller`] also owns a [`Waker`], that other threads can use to interrupt an ongoing (or
//! coming) wait. This is what lets the event loop of a camera be shut down while it is blocked
//! on a device that never reports anything.

use std::{
    fs::File,
    io::{self, Read, Write},
    os::unix::io::{AsRawFd, FromRawFd, RawFd},
    sync::Arc,
    time::Duration,
};

use log::warn;

macro_rules! syscall {
    ($f: ident ( $($args: expr),* $(,)* ) ) => {{
        match unsafe { libc::$f($($args, )*) } {
            err if err < 0 => Err(std::io::Error::last_os_error()),
            res => Ok(res)
        }
    }};
}

const DEVICE_TOKEN: u64 = 0;
const WAKER_TOKEN: u64 = 1;

/// What a call to [`Poller::poll`] returned for. All fields are `false` on timeout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Wakeup {
    /// `EPOLLPRI` was reported: a V4L2 event can be dequeued.
    pub event_pending: bool,
    /// Another condition was reported on the device. A non-streaming capture node signals
    /// `EPOLLERR` along with its events, and a disconnected one `EPOLLHUP`.
    pub device_other: bool,
    /// The [`Waker`] has been signaled.
    pub woken: bool,
}

impl Wakeup {
    fn from_epoll(events: &[libc::epoll_event]) -> Self {
        let mut wakeup = Wakeup::default();

        for event in events {
            // Copy out of the possibly packed structure.
            let (flags, token) = (event.events, event.u64);
            match token {
                DEVICE_TOKEN => {
                    wakeup.event_pending |= flags & libc::EPOLLPRI as u32 != 0;
                    wakeup.device_other |= flags & !(libc::EPOLLPRI as u32) != 0;
                }
                WAKER_TOKEN => wakeup.woken = true,
                _ => warn!("epoll_wait returned unregistered token {}", token),
            }
        }

        wakeup
    }

    /// Whether anything at all was reported for the device.
    pub fn device(&self) -> bool {
        self.event_pending || self.device_other
    }
}

/// Interrupts the wait of a [`Poller`] from any thread.
pub struct Waker(File);

impl Waker {
    fn new() -> io::Result<Self> {
        let fd = syscall!(eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK))?;
        // Safe because `eventfd` just created this descriptor for us.
        Ok(Waker(unsafe { File::from_raw_fd(fd) }))
    }

    /// Make the current or next `poll` of the poller return with `woken` set.
    pub fn wake(&self) -> io::Result<()> {
        (&self.0).write_all(&1u64.to_ne_bytes())
    }

    /// Consume the pending wake requests, so the next `poll` blocks again.
    fn clear(&self) {
        let mut counter = [0u8; 8];
        match (&self.0).read(&mut counter) {
            Ok(_) => (),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => (),
            Err(e) => warn!("Failed to clear poller waker: {}", e),
        }
    }
}

fn epoll_add(epoll: &File, fd: RawFd, events: i32, token: u64) -> io::Result<()> {
    let mut event = libc::epoll_event {
        events: events as u32,
        u64: token,
    };
    syscall!(epoll_ctl(
        epoll.as_raw_fd(),
        libc::EPOLL_CTL_ADD,
        fd,
        &mut event
    ))
    .map(|_| ())
}

/// Epoll set watching one device and one waker.
///
/// The device is registered as edge-triggered: a wakeup is reported once per event queued by the
/// kernel, so every pending event must be dequeued before polling again.
pub struct Poller {
    epoll: File,
    waker: Arc<Waker>,
}

impl Poller {
    /// Create a poller for `device_fd`. The descriptor must stay open for as long as the poller
    /// is in use.
    pub fn new(device_fd: RawFd) -> io::Result<Self> {
        let fd = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?;
        // Safe because `epoll_create1` just created this descriptor for us.
        let epoll = unsafe { File::from_raw_fd(fd) };

        // EPOLLIN must be part of the registration, otherwise some drivers never report EPOLLPRI
        // either.
        epoll_add(
            &epoll,
            device_fd,
            libc::EPOLLIN | libc::EPOLLPRI | libc::EPOLLET,
            DEVICE_TOKEN,
        )?;

        let waker = Waker::new()?;
        epoll_add(&epoll, waker.0.as_raw_fd(), libc::EPOLLIN, WAKER_TOKEN)?;

        Ok(Poller {
            epoll,
            waker: Arc::new(waker),
        })
    }

    /// Returns the waker that interrupts this poller.
    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    /// Wait for the device or the waker to be signaled. `None` waits forever.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Wakeup> {
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 2];
        let timeout = timeout.map_or(-1, |d| d.as_millis().min(i32::MAX as u128) as i32);

        let count = syscall!(epoll_wait(
            self.epoll.as_raw_fd(),
            events.as_mut_ptr(),
            events.len() as i32,
            timeout
        ))? as usize;

        let wakeup = Wakeup::from_epoll(&events[..count]);
        if wakeup.woken {
            self.waker.clear();
        }

        Ok(wakeup)
    }
}
