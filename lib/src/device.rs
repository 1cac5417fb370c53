//! Ownership of an opened V4L2 device node, and the [`DevicePort`] trait through which every
//! kernel request is issued.
pub mod poller;

#[cfg(test)]
pub(crate) mod mock;

use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use log::debug;
use nix::errno::Errno;
use thiserror::Error;

use crate::ioctl::{
    self, Capability, ControlDescriptor, CtrlId, DqEvent, DqEventError, EnumFmtError, EventType,
    FmtDesc, FrameInterval, FrameIntervalsError, FrameSize, FrameSizeError, GCtrlError,
    QueryCapError, QueryCtrlError, QueryCtrlFlags, SCtrlError, SubscribeEventError,
};
use crate::PixelFormat;

/// One method per kernel operation needed to drive the controls of a camera.
///
/// [`Device`] implements it on top of the real ioctls. Tests use a scripted implementation. The
/// file descriptor returned by `as_raw_fd` must be pollable: the event loop waits on it for
/// `EPOLLPRI` to learn that an event can be dequeued.
pub trait DevicePort: AsRawFd + Send + Sync {
    fn querycap(&self) -> Result<Capability, QueryCapError>;
    fn queryctrl(
        &self,
        id: CtrlId,
        flags: QueryCtrlFlags,
    ) -> Result<ControlDescriptor, QueryCtrlError>;
    fn g_ctrl(&self, id: u32) -> Result<i32, GCtrlError>;
    fn s_ctrl(&self, id: u32, value: i32) -> Result<i32, SCtrlError>;
    fn subscribe_event(&self, event: EventType) -> Result<(), SubscribeEventError>;
    fn unsubscribe_event(&self, event: EventType) -> Result<(), SubscribeEventError>;
    fn dqevent(&self) -> Result<DqEvent, DqEventError>;
    fn enum_fmt(&self, index: u32) -> Result<FmtDesc, EnumFmtError>;
    fn enum_frame_sizes(
        &self,
        index: u32,
        pixel_format: PixelFormat,
    ) -> Result<FrameSize, FrameSizeError>;
    fn enum_frame_intervals(
        &self,
        index: u32,
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<FrameInterval, FrameIntervalsError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceConfig {
    read_write: bool,
}

impl DeviceConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Open the device for writing as well. Controls can be set through a read-only file
    /// descriptor, so this is only needed by drivers that insist on it.
    pub fn read_write(self) -> Self {
        DeviceConfig { read_write: true }
    }
}

#[derive(Debug, Error)]
#[error("cannot open {}: {errno}", .path.display())]
pub struct DeviceOpenError {
    pub path: PathBuf,
    pub errno: Errno,
}

/// An opened V4L2 device node.
///
/// The file descriptor is exclusively owned and closed when the `Device` is dropped.
#[derive(Debug)]
pub struct Device {
    path: PathBuf,
    fd: OwnedFd,
}

impl Device {
    pub fn open(path: &Path, config: DeviceConfig) -> Result<Self, DeviceOpenError> {
        use nix::fcntl::{open, OFlag};
        use nix::sys::stat::Mode;

        // Non-blocking so draining the event queue ends with ENOENT instead of sleeping.
        let flags = OFlag::O_CLOEXEC
            | OFlag::O_NONBLOCK
            | match config.read_write {
                true => OFlag::O_RDWR,
                false => OFlag::O_RDONLY,
            };

        let fd = open(path, flags, Mode::empty()).map_err(|errno| DeviceOpenError {
            path: path.to_owned(),
            errno,
        })?;
        debug!("Opened {} as fd {}", path.display(), fd);

        Ok(Device {
            path: path.to_owned(),
            // Safe because `open` just returned this descriptor to us and nobody else owns it.
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRawFd for Device {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl DevicePort for Device {
    fn querycap(&self) -> Result<Capability, QueryCapError> {
        ioctl::querycap(self)
    }

    fn queryctrl(
        &self,
        id: CtrlId,
        flags: QueryCtrlFlags,
    ) -> Result<ControlDescriptor, QueryCtrlError> {
        ioctl::queryctrl(self, id, flags)
    }

    fn g_ctrl(&self, id: u32) -> Result<i32, GCtrlError> {
        ioctl::g_ctrl(self, id)
    }

    fn s_ctrl(&self, id: u32, value: i32) -> Result<i32, SCtrlError> {
        ioctl::s_ctrl(self, id, value)
    }

    fn subscribe_event(&self, event: EventType) -> Result<(), SubscribeEventError> {
        ioctl::subscribe_event(self, event)
    }

    fn unsubscribe_event(&self, event: EventType) -> Result<(), SubscribeEventError> {
        ioctl::unsubscribe_event(self, event)
    }

    fn dqevent(&self) -> Result<DqEvent, DqEventError> {
        ioctl::dqevent(self)
    }

    fn enum_fmt(&self, index: u32) -> Result<FmtDesc, EnumFmtError> {
        ioctl::enum_fmt(self, index)
    }

    fn enum_frame_sizes(
        &self,
        index: u32,
        pixel_format: PixelFormat,
    ) -> Result<FrameSize, FrameSizeError> {
        ioctl::enum_frame_sizes(self, index, pixel_format)
    }

    fn enum_frame_intervals(
        &self,
        index: u32,
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<FrameInterval, FrameIntervalsError> {
        ioctl::enum_frame_intervals(self, index, pixel_format, width, height)
    }
}
