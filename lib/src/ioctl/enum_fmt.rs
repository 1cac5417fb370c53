//! Listing of the pixel formats a capture node can produce, through `VIDIOC_ENUM_FMT`.
use super::cstr_field;
use crate::bindings;
use crate::bindings::v4l2_fmtdesc;
use crate::PixelFormat;
use bitflags::bitflags;
use nix::errno::Errno;
use std::fmt;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

bitflags! {
    /// `flags` of a `struct v4l2_fmtdesc`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FormatFlags: u32 {
        const COMPRESSED = bindings::V4L2_FMT_FLAG_COMPRESSED;
        /// Converted in software by libv4l rather than produced by the hardware.
        const EMULATED = bindings::V4L2_FMT_FLAG_EMULATED;
    }
}

/// One format of the capture queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmtDesc {
    pub pixelformat: PixelFormat,
    /// Driver-provided name, e.g. "Motion-JPEG".
    pub description: String,
    pub flags: FormatFlags,
}

impl fmt::Display for FmtDesc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.pixelformat, self.description)?;
        if !self.flags.is_empty() {
            f.write_str(" (")?;
            bitflags::parser::to_writer(&self.flags, &mut *f)?;
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl From<v4l2_fmtdesc> for FmtDesc {
    fn from(raw: v4l2_fmtdesc) -> Self {
        FmtDesc {
            pixelformat: PixelFormat::from(raw.pixelformat),
            description: cstr_field(&raw.description),
            flags: FormatFlags::from_bits_truncate(raw.flags),
        }
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_fmtdesc;
    nix::ioctl_readwrite!(vidioc_enum_fmt, b'V', 2, v4l2_fmtdesc);
}

#[derive(Debug, Error)]
pub enum EnumFmtError {
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl EnumFmtError {
    /// Whether `index` went past the last format.
    pub fn is_end_of_enumeration(&self) -> bool {
        let EnumFmtError::IoctlError(errno) = self;
        super::is_end_of_enumeration(*errno)
    }
}

impl From<EnumFmtError> for Errno {
    fn from(err: EnumFmtError) -> Self {
        let EnumFmtError::IoctlError(errno) = err;
        errno
    }
}

/// Returns the `index`-th format of the single-planar capture queue of `fd`. Indices start at 0
/// and the enumeration ends with `EINVAL`.
pub fn enum_fmt<T: From<v4l2_fmtdesc>>(fd: &impl AsRawFd, index: u32) -> Result<T, EnumFmtError> {
    let mut raw = v4l2_fmtdesc {
        index,
        type_: bindings::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE,
        ..Default::default()
    };
    // Safe because `raw` is a valid `v4l2_fmtdesc` the kernel can write into.
    unsafe { ioctl::vidioc_enum_fmt(fd.as_raw_fd(), &mut raw) }?;

    Ok(T::from(raw))
}
