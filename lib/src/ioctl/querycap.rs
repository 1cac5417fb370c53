//! Identification of a device node through `VIDIOC_QUERYCAP`.
use super::cstr_field;
use crate::bindings;
use crate::bindings::v4l2_capability;
use bitflags::bitflags;
use nix::errno::Errno;
use std::fmt;
use std::mem;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

bitflags! {
    /// Capability bits of `v4l2_capability` that matter to a webcam. Bits describing other kinds
    /// of devices (radio, SDR, output, codecs...) are dropped when decoding.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const VIDEO_CAPTURE = bindings::V4L2_CAP_VIDEO_CAPTURE;
        const VIDEO_CAPTURE_MPLANE = bindings::V4L2_CAP_VIDEO_CAPTURE_MPLANE;
        const META_CAPTURE = bindings::V4L2_CAP_META_CAPTURE;
        const EXT_PIX_FORMAT = bindings::V4L2_CAP_EXT_PIX_FORMAT;
        const READWRITE = bindings::V4L2_CAP_READWRITE;
        const STREAMING = bindings::V4L2_CAP_STREAMING;
        const IO_MC = bindings::V4L2_CAP_IO_MC;
        /// `device_caps` is filled.
        const DEVICE_CAPS = bindings::V4L2_CAP_DEVICE_CAPS;
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

/// Identity and capabilities of a device node, captured once when it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    pub version: u32,
    pub capabilities: Capabilities,
    pub device_caps: Option<Capabilities>,
}

impl Capability {
    /// Capabilities of the physical device, all nodes included.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Capabilities of the opened node. Drivers that do not report them separately only give
    /// the capabilities of the whole device.
    pub fn device_caps(&self) -> Capabilities {
        match self.device_caps {
            Some(caps) => caps,
            None => self.capabilities - Capabilities::DEVICE_CAPS,
        }
    }

    /// Whether the opened node can capture video, which is what we require to drive its
    /// controls. Metadata nodes exposed by the same webcam do not qualify.
    pub fn is_video_capture(&self) -> bool {
        self.device_caps().contains(Capabilities::VIDEO_CAPTURE)
    }

    /// Kernel-style `major.minor.patch` rendering of `version`.
    pub fn version_string(&self) -> String {
        let [patch, minor, major, _] = self.version.to_le_bytes();
        format!("{}.{}.{}", major, minor, patch)
    }
}

impl From<v4l2_capability> for Capability {
    fn from(raw: v4l2_capability) -> Self {
        let capabilities = Capabilities::from_bits_truncate(raw.capabilities);
        let device_caps = capabilities
            .contains(Capabilities::DEVICE_CAPS)
            .then(|| Capabilities::from_bits_truncate(raw.device_caps));

        Capability {
            driver: cstr_field(&raw.driver),
            card: cstr_field(&raw.card),
            bus_info: cstr_field(&raw.bus_info),
            version: raw.version,
            capabilities,
            device_caps,
        }
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_capability;
    nix::ioctl_read!(vidioc_querycap, b'V', 0, v4l2_capability);
}

#[derive(Debug, Error)]
pub enum QueryCapError {
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<QueryCapError> for Errno {
    fn from(err: QueryCapError) -> Self {
        match err {
            QueryCapError::IoctlError(e) => e,
        }
    }
}

/// Runs `VIDIOC_QUERYCAP` on `fd`. `ENOTTY` means the node is not a V4L2 device.
pub fn querycap<T: From<v4l2_capability>>(fd: &impl AsRawFd) -> Result<T, QueryCapError> {
    // Safe because all fields of `v4l2_capability` are plain integers.
    let mut raw: v4l2_capability = unsafe { mem::zeroed() };

    // Safe because `raw` is a valid `v4l2_capability` the kernel can write into.
    unsafe { ioctl::vidioc_querycap(fd.as_raw_fd(), &mut raw) }
        .map(|_| T::from(raw))
        .map_err(QueryCapError::IoctlError)
}
