//! Scripted [`DevicePort`] used by the unit tests.
//!
//! An `eventfd` stands in for the device node: queuing an event writes to it, which is what a
//! V4L2 driver does to its file descriptor when an event becomes available.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::sync::Mutex;

use nix::errno::Errno;

use crate::bindings;
use crate::device::DevicePort;
use crate::ioctl::{
    Capabilities, Capability, ControlDescriptor, ControlFlags, ControlType, CtrlChanges, CtrlEvent,
    CtrlId, DqEvent, DqEventError, EnumFmtError, Event, EventType, FmtDesc, FormatFlags,
    FrameInterval, FrameIntervalsError, FrameSize, FrameSizeError, GCtrlError, QueryCapError,
    QueryCtrlError, QueryCtrlFlags, SCtrlError, SubscribeEventError,
};
use crate::PixelFormat;

pub(crate) fn integer(
    id: u32,
    name: &str,
    minimum: i32,
    maximum: i32,
    step: i32,
) -> ControlDescriptor {
    ControlDescriptor {
        id,
        type_: Some(ControlType::Integer),
        raw_type: ControlType::Integer as u32,
        name: name.into(),
        minimum,
        maximum,
        step,
        default_value: minimum,
        flags: ControlFlags::empty(),
    }
}

pub(crate) fn boolean(id: u32, name: &str) -> ControlDescriptor {
    ControlDescriptor {
        type_: Some(ControlType::Boolean),
        raw_type: ControlType::Boolean as u32,
        ..integer(id, name, 0, 1, 1)
    }
}

pub(crate) fn of_type(id: u32, name: &str, type_: ControlType) -> ControlDescriptor {
    ControlDescriptor {
        type_: Some(type_),
        raw_type: type_ as u32,
        ..integer(id, name, 0, 0, 0)
    }
}

pub(crate) fn capture_capability(card: &str) -> Capability {
    Capability {
        driver: "uvcvideo".into(),
        card: card.into(),
        bus_info: "usb-0000:00:14.0-1".into(),
        version: 0x0006_0800,
        capabilities: Capabilities::VIDEO_CAPTURE
            | Capabilities::META_CAPTURE
            | Capabilities::STREAMING
            | Capabilities::DEVICE_CAPS,
        device_caps: Some(Capabilities::VIDEO_CAPTURE | Capabilities::STREAMING),
    }
}

pub(crate) struct MockFormat {
    pub desc: FmtDesc,
    pub sizes: Vec<(FrameSize, Vec<FrameInterval>)>,
}

pub(crate) fn format(fourcc: &[u8; 4], description: &str) -> MockFormat {
    MockFormat {
        desc: FmtDesc {
            flags: FormatFlags::empty(),
            description: description.into(),
            pixelformat: PixelFormat::from(fourcc),
        },
        sizes: Vec::new(),
    }
}

#[derive(Default)]
pub(crate) struct MockState {
    pub capability: Option<Capability>,
    /// Errno returned by `querycap`, taking precedence over `capability`.
    pub querycap_failure: Option<Errno>,
    pub controls: BTreeMap<u32, ControlDescriptor>,
    pub values: BTreeMap<u32, i32>,
    /// Errno returned by the `NEXT` query following this many successful ones.
    pub queryctrl_failure: Option<(usize, Errno)>,
    /// Errno returned once the control list is exhausted.
    pub end_of_controls: Option<Errno>,
    /// Number of `queryctrl` calls so far.
    pub queryctrl_calls: usize,
    pub formats: Vec<MockFormat>,
    pub events: VecDeque<Result<DqEvent, Errno>>,
    pub subscribed: Vec<u32>,
    pub subscribe_failure: Option<Errno>,
    pub unsubscribe_failure: Option<Errno>,
    pub s_ctrl_calls: Vec<(u32, i32)>,
}

pub(crate) struct MockPort {
    fd: File,
    pub state: Mutex<MockState>,
}

impl MockPort {
    pub fn new() -> Self {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        assert!(fd >= 0, "cannot create eventfd");

        MockPort {
            fd: unsafe { File::from_raw_fd(fd) },
            state: Mutex::new(MockState {
                capability: Some(capture_capability("Mock Camera")),
                ..Default::default()
            }),
        }
    }

    pub fn with_controls(controls: impl IntoIterator<Item = ControlDescriptor>) -> Self {
        let port = Self::new();
        {
            let mut state = port.state.lock().unwrap();
            for control in controls {
                state.values.insert(control.id, control.default_value);
                state.controls.insert(control.id, control);
            }
        }
        port
    }

    pub fn value(&self, id: u32) -> i32 {
        self.state.lock().unwrap().values[&id]
    }

    pub fn set_raw_value(&self, id: u32, value: i32) {
        self.state.lock().unwrap().values.insert(id, value);
    }

    /// Queue a control change event for `id` and signal the file descriptor.
    pub fn queue_ctrl_event(&self, id: u32, changes: CtrlChanges) {
        let mut state = self.state.lock().unwrap();
        let desc = state.controls.get(&id).cloned();
        let value = state.values.get(&id).copied().unwrap_or(0);
        let event = match desc {
            Some(desc) => CtrlEvent {
                id,
                changes,
                type_: desc.raw_type,
                value,
                flags: desc.flags,
                minimum: desc.minimum,
                maximum: desc.maximum,
                step: desc.step,
                default_value: desc.default_value,
            },
            None => CtrlEvent {
                id,
                changes,
                type_: 0,
                value,
                flags: ControlFlags::empty(),
                minimum: 0,
                maximum: 0,
                step: 0,
                default_value: 0,
            },
        };
        Self::push(&mut state, Ok(Event::Ctrl(event)));
        drop(state);
        self.signal();
    }

    /// Queue a non-control event of type `type_` and signal the file descriptor.
    pub fn queue_other_event(&self, type_: u32) {
        Self::push(&mut self.state.lock().unwrap(), Ok(Event::Other(type_)));
        self.signal();
    }

    /// Make the next `dqevent` fail with `errno`.
    pub fn queue_dqevent_failure(&self, errno: Errno) {
        self.state.lock().unwrap().events.push_back(Err(errno));
        self.signal();
    }

    fn push(state: &mut MockState, event: Result<Event, Errno>) {
        state.events.push_back(event.map(|event| DqEvent {
            event,
            pending: 0,
            sequence: 0,
        }));
    }

    fn signal(&self) {
        (&self.fd)
            .write_all(&1u64.to_ne_bytes())
            .expect("cannot signal mock device");
    }
}

impl AsRawFd for MockPort {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl DevicePort for MockPort {
    fn querycap(&self) -> Result<Capability, QueryCapError> {
        let state = self.state.lock().unwrap();
        if let Some(errno) = state.querycap_failure {
            return Err(QueryCapError::IoctlError(errno));
        }
        state
            .capability
            .clone()
            .ok_or(QueryCapError::IoctlError(Errno::ENOTTY))
    }

    fn queryctrl(
        &self,
        id: CtrlId,
        flags: QueryCtrlFlags,
    ) -> Result<ControlDescriptor, QueryCtrlError> {
        let mut state = self.state.lock().unwrap();
        let calls = state.queryctrl_calls;
        state.queryctrl_calls += 1;

        if !flags.contains(QueryCtrlFlags::NEXT) {
            return state
                .controls
                .get(&id.raw())
                .cloned()
                .ok_or(QueryCtrlError::IoctlError(Errno::EINVAL));
        }

        if let Some((after, errno)) = state.queryctrl_failure {
            if calls >= after {
                return Err(QueryCtrlError::IoctlError(errno));
            }
        }

        state
            .controls
            .range(id.raw() + 1..)
            .next()
            .map(|(_, desc)| desc.clone())
            .ok_or(QueryCtrlError::IoctlError(
                state.end_of_controls.unwrap_or(Errno::EINVAL),
            ))
    }

    fn g_ctrl(&self, id: u32) -> Result<i32, GCtrlError> {
        self.state
            .lock()
            .unwrap()
            .values
            .get(&id)
            .copied()
            .ok_or(GCtrlError::InvalidId)
    }

    fn s_ctrl(&self, id: u32, value: i32) -> Result<i32, SCtrlError> {
        let mut state = self.state.lock().unwrap();
        let desc = state.controls.get(&id).ok_or(SCtrlError::InvalidId)?;
        if desc.flags.contains(ControlFlags::READ_ONLY) {
            return Err(SCtrlError::ReadOnly);
        }
        if value < desc.minimum || value > desc.maximum {
            return Err(SCtrlError::ValueOutOfBounds);
        }
        state.values.insert(id, value);
        state.s_ctrl_calls.push((id, value));
        Ok(value)
    }

    fn subscribe_event(&self, event: EventType) -> Result<(), SubscribeEventError> {
        let mut state = self.state.lock().unwrap();
        if let Some(errno) = state.subscribe_failure {
            return Err(SubscribeEventError::IoctlError(errno));
        }
        let EventType::Ctrl(id) = event;
        state.subscribed.push(id);
        Ok(())
    }

    fn unsubscribe_event(&self, event: EventType) -> Result<(), SubscribeEventError> {
        let mut state = self.state.lock().unwrap();
        if let Some(errno) = state.unsubscribe_failure {
            return Err(SubscribeEventError::IoctlError(errno));
        }
        let EventType::Ctrl(id) = event;
        state.subscribed.retain(|&s| s != id);
        Ok(())
    }

    fn dqevent(&self) -> Result<DqEvent, DqEventError> {
        let mut state = self.state.lock().unwrap();
        match state.events.pop_front() {
            None => Err(DqEventError::NotReady),
            Some(Err(errno)) => Err(DqEventError::from(errno)),
            Some(Ok(mut event)) => {
                event.pending = state.events.len() as u32;
                Ok(event)
            }
        }
    }

    fn enum_fmt(&self, index: u32) -> Result<FmtDesc, EnumFmtError> {
        self.state
            .lock()
            .unwrap()
            .formats
            .get(index as usize)
            .map(|f| f.desc.clone())
            .ok_or(EnumFmtError::IoctlError(Errno::EINVAL))
    }

    fn enum_frame_sizes(
        &self,
        index: u32,
        pixel_format: PixelFormat,
    ) -> Result<FrameSize, FrameSizeError> {
        let state = self.state.lock().unwrap();
        state
            .formats
            .iter()
            .find(|f| f.desc.pixelformat == pixel_format)
            .and_then(|f| f.sizes.get(index as usize))
            .map(|(size, _)| *size)
            .ok_or(FrameSizeError::IoctlError(Errno::EINVAL))
    }

    fn enum_frame_intervals(
        &self,
        index: u32,
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<FrameInterval, FrameIntervalsError> {
        let state = self.state.lock().unwrap();
        state
            .formats
            .iter()
            .find(|f| f.desc.pixelformat == pixel_format)
            .and_then(|f| {
                f.sizes.iter().find(|(size, _)| {
                    matches!(size, FrameSize::Discrete { width: w, height: h } if *w == width && *h == height)
                })
            })
            .and_then(|(_, intervals)| intervals.get(index as usize))
            .copied()
            .ok_or(FrameIntervalsError::IoctlError(Errno::EINVAL))
    }
}

/// Control IDs most webcams expose, used to script realistic devices.
pub(crate) fn webcam_controls() -> Vec<ControlDescriptor> {
    vec![
        of_type(bindings::V4L2_CID_USER_CLASS, "User Controls", ControlType::CtrlClass),
        of_type(bindings::V4L2_CID_CAMERA_CLASS, "Camera Controls", ControlType::CtrlClass),
        integer(bindings::V4L2_CID_BRIGHTNESS, "Brightness", 0, 255, 1),
        integer(bindings::V4L2_CID_CONTRAST, "Contrast", 0, 100, 1),
        boolean(bindings::V4L2_CID_AUTO_WHITE_BALANCE, "White Balance, Automatic"),
        of_type(
            bindings::V4L2_CID_POWER_LINE_FREQUENCY,
            "Power Line Frequency",
            ControlType::Menu,
        ),
        integer(
            bindings::V4L2_CID_WHITE_BALANCE_TEMPERATURE,
            "White Balance Temperature",
            2000,
            10000,
            10,
        ),
        boolean(bindings::V4L2_CID_HFLIP, "Horizontal Flip"),
        integer(bindings::V4L2_CID_PAN_ABSOLUTE, "Pan, Absolute", -522000, 522000, 3600),
        integer(bindings::V4L2_CID_TILT_ABSOLUTE, "Tilt, Absolute", -324000, 360000, 3600),
        integer(bindings::V4L2_CID_ZOOM_ABSOLUTE, "Zoom, Absolute", 100, 400, 1),
        of_type(bindings::V4L2_CID_PAN_RESET, "Pan, Reset", ControlType::Button),
    ]
}
