//! Reading and writing the value of a single control with `VIDIOC_G_CTRL` and `VIDIOC_S_CTRL`.
//!
//! These "old-style" ioctls only carry 32-bit values, which covers every integer, boolean and
//! menu control a webcam exposes.
use std::os::unix::io::AsRawFd;

use nix::errno::Errno;
use thiserror::Error;

use crate::bindings::v4l2_control;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_control;
    nix::ioctl_readwrite!(vidioc_g_ctrl, b'V', 27, v4l2_control);
    nix::ioctl_readwrite!(vidioc_s_ctrl, b'V', 28, v4l2_control);
}

#[derive(Debug, Error)]
pub enum GCtrlError {
    #[error("no such control")]
    InvalidId,
    #[error("control cannot be read")]
    WriteOnly,
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<Errno> for GCtrlError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::EINVAL => GCtrlError::InvalidId,
            Errno::EACCES => GCtrlError::WriteOnly,
            errno => GCtrlError::IoctlError(errno),
        }
    }
}

impl From<GCtrlError> for Errno {
    fn from(err: GCtrlError) -> Self {
        match err {
            GCtrlError::InvalidId => Errno::EINVAL,
            GCtrlError::WriteOnly => Errno::EACCES,
            GCtrlError::IoctlError(errno) => errno,
        }
    }
}

#[derive(Debug, Error)]
pub enum SCtrlError {
    #[error("no such control, or value rejected")]
    InvalidId,
    #[error("value outside of the control's range")]
    ValueOutOfBounds,
    #[error("control is temporarily locked by the driver")]
    DeviceBusy,
    #[error("control cannot be written")]
    ReadOnly,
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<Errno> for SCtrlError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::EINVAL => SCtrlError::InvalidId,
            Errno::ERANGE => SCtrlError::ValueOutOfBounds,
            Errno::EBUSY => SCtrlError::DeviceBusy,
            Errno::EACCES => SCtrlError::ReadOnly,
            errno => SCtrlError::IoctlError(errno),
        }
    }
}

impl From<SCtrlError> for Errno {
    fn from(err: SCtrlError) -> Self {
        match err {
            SCtrlError::InvalidId => Errno::EINVAL,
            SCtrlError::ValueOutOfBounds => Errno::ERANGE,
            SCtrlError::DeviceBusy => Errno::EBUSY,
            SCtrlError::ReadOnly => Errno::EACCES,
            SCtrlError::IoctlError(errno) => errno,
        }
    }
}

/// Current value of control `id`.
pub fn g_ctrl(fd: &impl AsRawFd, id: u32) -> Result<i32, GCtrlError> {
    let mut control = v4l2_control { id, value: 0 };
    // Safe because `control` is a valid `v4l2_control` the kernel can write into.
    unsafe { ioctl::vidioc_g_ctrl(fd.as_raw_fd(), &mut control) }?;
    Ok(control.value)
}

/// Set control `id` to `value`, and return the value the driver kept. It can differ from `value`
/// when the driver rounds it to the step of the control.
pub fn s_ctrl(fd: &impl AsRawFd, id: u32, value: i32) -> Result<i32, SCtrlError> {
    let mut control = v4l2_control { id, value };
    // Safe because `control` is a valid `v4l2_control` the kernel can write into.
    unsafe { ioctl::vidioc_s_ctrl(fd.as_raw_fd(), &mut control) }?;
    Ok(control.value)
}
