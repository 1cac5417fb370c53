//! Safe wrapper for the `VIDIOC_ENUM_FRAMESIZES` ioctl.
use std::os::unix::io::AsRawFd;

use nix::errno::Errno;
use thiserror::Error;

use crate::{bindings, PixelFormat};

/// Bounds of a stepwise or continuous frame size range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSizeStepwise {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

impl From<bindings::v4l2_frmsize_stepwise> for FrameSizeStepwise {
    fn from(s: bindings::v4l2_frmsize_stepwise) -> Self {
        FrameSizeStepwise {
            min_width: s.min_width,
            max_width: s.max_width,
            step_width: s.step_width,
            min_height: s.min_height,
            max_height: s.max_height,
            step_height: s.step_height,
        }
    }
}

/// Safe variant of `struct v4l2_frmsizeenum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    Discrete { width: u32, height: u32 },
    Continuous(FrameSizeStepwise),
    Stepwise(FrameSizeStepwise),
    /// The driver reported a size type we do not know of.
    Unknown(u32),
}

impl From<bindings::v4l2_frmsizeenum> for FrameSize {
    fn from(input: bindings::v4l2_frmsizeenum) -> Self {
        // Safe because the member of the union we read is selected by `type_`.
        match input.type_ {
            bindings::v4l2_frmsizetypes_V4L2_FRMSIZE_TYPE_DISCRETE => {
                let discrete = unsafe { input.__bindgen_anon_1.discrete };
                FrameSize::Discrete {
                    width: discrete.width,
                    height: discrete.height,
                }
            }
            bindings::v4l2_frmsizetypes_V4L2_FRMSIZE_TYPE_CONTINUOUS => {
                FrameSize::Continuous(unsafe { input.__bindgen_anon_1.stepwise }.into())
            }
            bindings::v4l2_frmsizetypes_V4L2_FRMSIZE_TYPE_STEPWISE => {
                FrameSize::Stepwise(unsafe { input.__bindgen_anon_1.stepwise }.into())
            }
            t => FrameSize::Unknown(t),
        }
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_frmsizeenum;
    nix::ioctl_readwrite!(vidioc_enum_framesizes, b'V', 74, v4l2_frmsizeenum);
}

#[derive(Debug, Error)]
pub enum FrameSizeError {
    #[error("unexpected ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl FrameSizeError {
    /// Whether `index` went past the last frame size.
    pub fn is_end_of_enumeration(&self) -> bool {
        match self {
            FrameSizeError::IoctlError(e) => super::is_end_of_enumeration(*e),
        }
    }
}

impl From<FrameSizeError> for Errno {
    fn from(err: FrameSizeError) -> Self {
        match err {
            FrameSizeError::IoctlError(e) => e,
        }
    }
}

pub fn enum_frame_sizes<T: From<bindings::v4l2_frmsizeenum>>(
    fd: &impl AsRawFd,
    index: u32,
    pixel_format: PixelFormat,
) -> Result<T, FrameSizeError> {
    let mut frame_size = bindings::v4l2_frmsizeenum {
        index,
        pixel_format: pixel_format.into(),
        ..unsafe { std::mem::zeroed() }
    };

    match unsafe { ioctl::vidioc_enum_framesizes(fd.as_raw_fd(), &mut frame_size) } {
        Ok(_) => Ok(T::from(frame_size)),
        Err(e) => Err(FrameSizeError::IoctlError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_from_raw() {
        let mut raw: bindings::v4l2_frmsizeenum = unsafe { std::mem::zeroed() };
        raw.type_ = bindings::v4l2_frmsizetypes_V4L2_FRMSIZE_TYPE_DISCRETE;
        raw.__bindgen_anon_1.discrete = bindings::v4l2_frmsize_discrete {
            width: 1920,
            height: 1080,
        };
        assert_eq!(
            FrameSize::from(raw),
            FrameSize::Discrete {
                width: 1920,
                height: 1080
            }
        );

        raw.type_ = bindings::v4l2_frmsizetypes_V4L2_FRMSIZE_TYPE_STEPWISE;
        raw.__bindgen_anon_1.stepwise = bindings::v4l2_frmsize_stepwise {
            min_width: 16,
            max_width: 4096,
            step_width: 16,
            min_height: 16,
            max_height: 2160,
            step_height: 16,
        };
        assert!(matches!(FrameSize::from(raw), FrameSize::Stepwise(s) if s.max_width == 4096));

        raw.type_ = 42;
        assert_eq!(FrameSize::from(raw), FrameSize::Unknown(42));
    }
}
