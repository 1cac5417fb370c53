//! Notifications from the driver: `VIDIOC_SUBSCRIBE_EVENT`, `VIDIOC_UNSUBSCRIBE_EVENT` and
//! `VIDIOC_DQEVENT`.
//!
//! Once subscribed, events are queued per open file by the kernel and the file signals `EPOLLPRI`
//! until they are all dequeued.

use nix::errno::Errno;
use std::mem;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

use crate::bindings;
use crate::ioctl::ControlFlags;
use bitflags::bitflags;

/// What to subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Changes of the control with the given ID.
    Ctrl(u32),
}

impl EventType {
    /// The subscription carries no flag: changes made through our own file are not reported
    /// back, and no event is queued for the initial state.
    fn subscription(self) -> bindings::v4l2_event_subscription {
        let (type_, id) = match self {
            EventType::Ctrl(id) => (bindings::V4L2_EVENT_CTRL, id),
        };

        bindings::v4l2_event_subscription {
            type_,
            id,
            ..Default::default()
        }
    }
}

bitflags! {
    /// `changes` member of `struct v4l2_event_ctrl`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CtrlChanges: u32 {
        const VALUE = bindings::V4L2_EVENT_CTRL_CH_VALUE;
        const FLAGS = bindings::V4L2_EVENT_CTRL_CH_FLAGS;
        const RANGE = bindings::V4L2_EVENT_CTRL_CH_RANGE;
        const DIMENSIONS = bindings::V4L2_EVENT_CTRL_CH_DIMENSIONS;
    }
}

/// Payload of a `V4L2_EVENT_CTRL` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrlEvent {
    /// ID of the control that changed.
    pub id: u32,
    pub changes: CtrlChanges,
    pub type_: u32,
    /// New value of the control. Only meaningful for 32-bit control types.
    pub value: i32,
    pub flags: ControlFlags,
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Ctrl(CtrlEvent),
    /// Any event type we do not decode. Carries the raw `V4L2_EVENT_*` type.
    Other(u32),
}

/// An event dequeued with [`dqevent`], along with its queue metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DqEvent {
    pub event: Event,
    /// Number of events still pending after this one.
    pub pending: u32,
    pub sequence: u32,
}

impl From<bindings::v4l2_event> for DqEvent {
    fn from(v4l2_event: bindings::v4l2_event) -> Self {
        let event = match v4l2_event.type_ {
            bindings::V4L2_EVENT_CTRL => {
                // Safe because the kernel fills the `ctrl` member for `V4L2_EVENT_CTRL`.
                let ctrl = unsafe { v4l2_event.u.ctrl };
                Event::Ctrl(CtrlEvent {
                    id: v4l2_event.id,
                    changes: CtrlChanges::from_bits_truncate(ctrl.changes),
                    type_: ctrl.type_,
                    value: unsafe { ctrl.__bindgen_anon_1.value },
                    flags: ControlFlags::from_bits_truncate(ctrl.flags),
                    minimum: ctrl.minimum,
                    maximum: ctrl.maximum,
                    step: ctrl.step,
                    default_value: ctrl.default_value,
                })
            }
            t => Event::Other(t),
        };

        DqEvent {
            event,
            pending: v4l2_event.pending,
            sequence: v4l2_event.sequence,
        }
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::{v4l2_event, v4l2_event_subscription};

    nix::ioctl_read!(vidioc_dqevent, b'V', 89, v4l2_event);
    nix::ioctl_write_ptr!(vidioc_subscribe_event, b'V', 90, v4l2_event_subscription);
    nix::ioctl_write_ptr!(vidioc_unsubscribe_event, b'V', 91, v4l2_event_subscription);
}

#[derive(Debug, Error)]
pub enum SubscribeEventError {
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl From<SubscribeEventError> for Errno {
    fn from(err: SubscribeEventError) -> Self {
        let SubscribeEventError::IoctlError(errno) = err;
        errno
    }
}

/// Start queueing `event` on `fd`. Subscribing twice to the same event is not an error.
pub fn subscribe_event(
    fd: &impl AsRawFd,
    event: EventType,
) -> Result<(), SubscribeEventError> {
    let subscription = event.subscription();
    // Safe because `subscription` is a valid `v4l2_event_subscription` only read by the kernel.
    unsafe { ioctl::vidioc_subscribe_event(fd.as_raw_fd(), &subscription) }?;
    Ok(())
}

/// Stop queueing `event` on `fd`. Events of that type already queued are dropped.
pub fn unsubscribe_event(fd: &impl AsRawFd, event: EventType) -> Result<(), SubscribeEventError> {
    let subscription = event.subscription();
    // Safe because `subscription` is a valid `v4l2_event_subscription` only read by the kernel.
    unsafe { ioctl::vidioc_unsubscribe_event(fd.as_raw_fd(), &subscription) }?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum DqEventError {
    /// The queue is empty. Not an actual failure.
    #[error("no pending event")]
    NotReady,
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<Errno> for DqEventError {
    fn from(error: Errno) -> Self {
        match error {
            Errno::ENOENT => Self::NotReady,
            error => Self::IoctlError(error),
        }
    }
}

impl From<DqEventError> for Errno {
    fn from(err: DqEventError) -> Self {
        match err {
            DqEventError::NotReady => Errno::ENOENT,
            DqEventError::IoctlError(e) => e,
        }
    }
}

/// Take the oldest pending event of `fd`. This never blocks, even on a blocking file.
pub fn dqevent(fd: &impl AsRawFd) -> Result<DqEvent, DqEventError> {
    // Safe because `v4l2_event` is made of integers and unions of integers.
    let mut raw: bindings::v4l2_event = unsafe { mem::zeroed() };
    // Safe because `raw` is a valid `v4l2_event` the kernel can write into.
    unsafe { ioctl::vidioc_dqevent(fd.as_raw_fd(), &mut raw) }?;

    Ok(DqEvent::from(raw))
}
