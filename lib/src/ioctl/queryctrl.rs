//! Safe wrapper for the `VIDIOC_QUERYCTRL` ioctl.
use std::fmt;
use std::os::unix::io::AsRawFd;

use bitflags::bitflags;
use enumn::N;
use nix::errno::Errno;
use thiserror::Error;

use super::cstr_field;
use crate::bindings;
use crate::bindings::v4l2_queryctrl;

/// Index of a control that has been validated, i.e. which ID is within the range of
/// `V4L2_CTRL_ID_MASK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CtrlId(u32);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CtrlIdError {
    #[error("invalid control number: 0x{0:08x}")]
    InvalidControl(u32),
}

impl CtrlId {
    /// Pseudo-ID that, combined with [`QueryCtrlFlags::NEXT`], returns the first control of the
    /// device.
    pub const FIRST: CtrlId = CtrlId(0);

    /// Create a new control index from its u32 representation, after validation.
    pub fn new(ctrl: u32) -> Result<Self, CtrlIdError> {
        if (ctrl & bindings::V4L2_CTRL_ID_MASK) != ctrl {
            Err(CtrlIdError::InvalidControl(ctrl))
        } else {
            Ok(CtrlId(ctrl))
        }
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CtrlId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug)]
    pub struct QueryCtrlFlags: u32 {
        const NEXT = bindings::V4L2_CTRL_FLAG_NEXT_CTRL;
    }
}

/// Equivalent of `enum v4l2_ctrl_type`, limited to the non-compound types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, N)]
#[repr(u32)]
pub enum ControlType {
    Integer = bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_INTEGER,
    Boolean = bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_BOOLEAN,
    Menu = bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_MENU,
    Button = bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_BUTTON,
    Integer64 = bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_INTEGER64,
    CtrlClass = bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_CTRL_CLASS,
    String = bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_STRING,
    Bitmask = bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_BITMASK,
    IntegerMenu = bindings::v4l2_ctrl_type_V4L2_CTRL_TYPE_INTEGER_MENU,
}

bitflags! {
    /// `flags` member of `struct v4l2_queryctrl`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ControlFlags: u32 {
        const DISABLED = bindings::V4L2_CTRL_FLAG_DISABLED;
        const GRABBED = bindings::V4L2_CTRL_FLAG_GRABBED;
        const READ_ONLY = bindings::V4L2_CTRL_FLAG_READ_ONLY;
        const UPDATE = bindings::V4L2_CTRL_FLAG_UPDATE;
        const INACTIVE = bindings::V4L2_CTRL_FLAG_INACTIVE;
        const SLIDER = bindings::V4L2_CTRL_FLAG_SLIDER;
        const WRITE_ONLY = bindings::V4L2_CTRL_FLAG_WRITE_ONLY;
        const VOLATILE = bindings::V4L2_CTRL_FLAG_VOLATILE;
        const HAS_PAYLOAD = bindings::V4L2_CTRL_FLAG_HAS_PAYLOAD;
        const EXECUTE_ON_WRITE = bindings::V4L2_CTRL_FLAG_EXECUTE_ON_WRITE;
        const MODIFY_LAYOUT = bindings::V4L2_CTRL_FLAG_MODIFY_LAYOUT;
        const DYNAMIC_ARRAY = bindings::V4L2_CTRL_FLAG_DYNAMIC_ARRAY;
    }
}

impl ControlFlags {
    /// Flags that prevent a control from being changed by the user.
    pub const UNCHANGEABLE: ControlFlags = ControlFlags::DISABLED
        .union(ControlFlags::GRABBED)
        .union(ControlFlags::INACTIVE)
        .union(ControlFlags::READ_ONLY);
}

/// Safe variant of `struct v4l2_queryctrl`, describing one hardware control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDescriptor {
    pub id: u32,
    /// `None` if the driver reported a type we do not know of.
    pub type_: Option<ControlType>,
    pub raw_type: u32,
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub flags: ControlFlags,
}

impl ControlDescriptor {
    /// Whether the control can currently be changed.
    pub fn is_enabled(&self) -> bool {
        !self.flags.intersects(ControlFlags::UNCHANGEABLE)
    }
}

impl From<v4l2_queryctrl> for ControlDescriptor {
    fn from(qctrl: v4l2_queryctrl) -> Self {
        ControlDescriptor {
            id: qctrl.id,
            type_: ControlType::n(qctrl.type_),
            raw_type: qctrl.type_,
            name: cstr_field(&qctrl.name),
            minimum: qctrl.minimum,
            maximum: qctrl.maximum,
            step: qctrl.step,
            default_value: qctrl.default_value,
            flags: ControlFlags::from_bits_truncate(qctrl.flags),
        }
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_queryctrl;
    nix::ioctl_readwrite!(vidioc_queryctrl, b'V', 36, v4l2_queryctrl);
}

#[derive(Debug, Error)]
pub enum QueryCtrlError {
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl QueryCtrlError {
    /// Whether this error marks the end of a `NEXT` enumeration rather than a failure.
    pub fn is_end_of_enumeration(&self) -> bool {
        match self {
            QueryCtrlError::IoctlError(e) => super::is_end_of_enumeration(*e),
        }
    }
}

impl From<QueryCtrlError> for Errno {
    fn from(err: QueryCtrlError) -> Self {
        match err {
            QueryCtrlError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_QUERYCTRL` ioctl.
pub fn queryctrl<T: From<v4l2_queryctrl>>(
    fd: &impl AsRawFd,
    id: CtrlId,
    flags: QueryCtrlFlags,
) -> Result<T, QueryCtrlError> {
    let mut qctrl: v4l2_queryctrl = v4l2_queryctrl {
        id: id.0 | flags.bits(),
        ..Default::default()
    };

    match unsafe { ioctl::vidioc_queryctrl(fd.as_raw_fd(), &mut qctrl) } {
        Ok(_) => Ok(T::from(qctrl)),
        Err(e) => Err(QueryCtrlError::IoctlError(e)),
    }
}
