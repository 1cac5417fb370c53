//! Safe wrapper for the `VIDIOC_ENUM_FRAMEINTERVALS` ioctl.
use std::fmt;
use std::os::unix::io::AsRawFd;

use nix::errno::Errno;
use thiserror::Error;

use crate::{bindings, PixelFormat};

/// Safe variant of `struct v4l2_fract`. A frame interval is expressed in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    /// Number of frames per second this interval corresponds to, rounded down. Returns `None` for
    /// a zero numerator.
    pub fn frame_rate(&self) -> Option<u32> {
        self.denominator.checked_div(self.numerator)
    }
}

impl From<bindings::v4l2_fract> for Fraction {
    fn from(f: bindings::v4l2_fract) -> Self {
        Fraction {
            numerator: f.numerator,
            denominator: f.denominator,
        }
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Bounds of a stepwise or continuous frame interval range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIntervalStepwise {
    pub min: Fraction,
    pub max: Fraction,
    pub step: Fraction,
}

/// Safe variant of `struct v4l2_frmivalenum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameInterval {
    Discrete(Fraction),
    Continuous(FrameIntervalStepwise),
    Stepwise(FrameIntervalStepwise),
    /// The driver reported an interval type we do not know of.
    Unknown(u32),
}

impl From<bindings::v4l2_frmivalenum> for FrameInterval {
    fn from(input: bindings::v4l2_frmivalenum) -> Self {
        let stepwise = |s: bindings::v4l2_frmival_stepwise| FrameIntervalStepwise {
            min: s.min.into(),
            max: s.max.into(),
            step: s.step.into(),
        };

        // Safe because the member of the union we read is selected by `type_`.
        match input.type_ {
            bindings::v4l2_frmivaltypes_V4L2_FRMIVAL_TYPE_DISCRETE => {
                FrameInterval::Discrete(unsafe { input.__bindgen_anon_1.discrete }.into())
            }
            bindings::v4l2_frmivaltypes_V4L2_FRMIVAL_TYPE_CONTINUOUS => {
                FrameInterval::Continuous(stepwise(unsafe { input.__bindgen_anon_1.stepwise }))
            }
            bindings::v4l2_frmivaltypes_V4L2_FRMIVAL_TYPE_STEPWISE => {
                FrameInterval::Stepwise(stepwise(unsafe { input.__bindgen_anon_1.stepwise }))
            }
            t => FrameInterval::Unknown(t),
        }
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_frmivalenum;
    nix::ioctl_readwrite!(vidioc_enum_frameintervals, b'V', 75, v4l2_frmivalenum);
}

#[derive(Debug, Error)]
pub enum FrameIntervalsError {
    #[error("unexpected ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl FrameIntervalsError {
    /// Whether `index` went past the last frame interval.
    pub fn is_end_of_enumeration(&self) -> bool {
        match self {
            FrameIntervalsError::IoctlError(e) => super::is_end_of_enumeration(*e),
        }
    }
}

impl From<FrameIntervalsError> for Errno {
    fn from(err: FrameIntervalsError) -> Self {
        match err {
            FrameIntervalsError::IoctlError(e) => e,
        }
    }
}

pub fn enum_frame_intervals<T: From<bindings::v4l2_frmivalenum>>(
    fd: &impl AsRawFd,
    index: u32,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<T, FrameIntervalsError> {
    let mut frame_interval = bindings::v4l2_frmivalenum {
        index,
        pixel_format: pixel_format.into(),
        width,
        height,
        ..unsafe { std::mem::zeroed() }
    };

    match unsafe { ioctl::vidioc_enum_frameintervals(fd.as_raw_fd(), &mut frame_interval) } {
        Ok(_) => Ok(T::from(frame_interval)),
        Err(e) => Err(FrameIntervalsError::IoctlError(e)),
    }
}
