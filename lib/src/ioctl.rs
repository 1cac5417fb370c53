//! This module provides safer versions of the V4L2 ioctls used for camera control through simple
//! functions working on a `RawFd`, and safer variants of the structures they exchange. Most code
//! should go through the [`crate::device::DevicePort`] trait instead, which bundles these
//! functions behind one object and can be mocked.
//!
//! Each ioctl proxy function is designed as follows:
//!
//! * It takes the relevant input as parameters and not the entire input/output structure. This
//!   lifts any ambiguity as to which parts of the structure userspace is supposed to fill.
//! * It returns a safe variant of the output structure, built from its C counterpart with
//!   `From` or `TryFrom`.
//!
//! For instance, `VIDIOC_QUERYCTRL` takes a `struct v4l2_queryctrl` of which only the `id` field
//! is set by user-space. Our [`queryctrl()`] function therefore takes the control ID and the
//! enumeration flags, and returns any type that can be built from the filled structure, like
//! [`ControlDescriptor`].
//!
//! Every ioctl also has its own error type: this helps discern scenarios where the ioctl returned
//! non-zero, but the situation is not necessarily an error. For instance, `VIDIOC_DQEVENT`
//! returns `ENOENT` if no event is pending, which is represented by its own variant. All error
//! types can be converted to their original error code using their `Into<Errno>`
//! implementation.

mod enum_fmt;
mod frameintervals;
mod framesizes;
mod g_ctrl;
mod querycap;
mod queryctrl;
mod subscribe_event;

pub use enum_fmt::*;
pub use frameintervals::*;
pub use framesizes::*;
pub use g_ctrl::*;
pub use querycap::*;
pub use queryctrl::*;
pub use subscribe_event::*;

use nix::errno::Errno;

/// Text of a fixed-size, nul-padded string field of a kernel structure. A field that fills its
/// whole buffer without a terminating nul is taken entirely.
fn cstr_field(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

/// Copies `s` into a fixed-size C string buffer, truncating if needed and always leaving room for
/// the terminating nul.
#[cfg(test)]
pub(crate) fn cstr_buffer<const N: usize>(s: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let len = s.len().min(N - 1);
    buf[..len].copy_from_slice(&s.as_bytes()[..len]);
    buf
}

/// Returns whether `errno` is one of the codes drivers use to signal the end of an enumeration,
/// or that the enumeration ioctl is not implemented at all for this node.
pub fn is_end_of_enumeration(errno: Errno) -> bool {
    matches!(errno, Errno::EINVAL | Errno::ENOTTY)
}
