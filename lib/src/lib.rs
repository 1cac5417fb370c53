//! Control of webcam hardware settings (pan, tilt, zoom, brightness, white balance...) through
//! the V4L2 control ioctls.
//!
//! The crate is organized in layers:
//!
//! * The `ioctl` module provides direct, thin wrappers over the V4L2 ioctls involved in camera
//!   control with added safety. Note that "safety" here is in terms of memory safety: this layer
//!   won't guard against passing invalid data that the ioctls will reject - it just makes sure
//!   that data passed from and to the kernel can be accessed safely.
//!
//! * The `device` module owns the opened device node and exposes every kernel operation through
//!   the [`device::DevicePort`] trait, so that the layers above it can run against a real device
//!   or a scripted one.
//!
//! * The `controls`, `events` and `video_mode` modules turn raw control descriptors into typed
//!   controls, deliver change notifications coming from the kernel, and list the capture modes of
//!   a device.
//!
//! * [`camera::Camera`] ties all of these together for one device node, and
//!   [`manager::CameraManager`] discovers the cameras plugged into the system.
//!
#[doc(hidden)]
pub mod bindings;
pub mod camera;
pub mod controls;
pub mod device;
pub mod events;
pub mod ioctl;
pub mod manager;
pub mod video_mode;

use std::fmt;

pub use camera::{Camera, CameraConfig, CameraError};
pub use manager::{CameraManager, ManagerConfig, ManagerError};
pub use video_mode::VideoMode;

/// Four-character code identifying the encoding of the frames of a video mode, as reported by
/// `VIDIOC_ENUM_FMT`.
///
/// ```
/// # use v4l2cam::PixelFormat;
/// let mjpeg = PixelFormat::from(b"MJPG");
/// assert_eq!(mjpeg, PixelFormat::MJPEG);
/// assert_eq!(u32::from(mjpeg), 0x47504a4d);
/// assert_eq!(mjpeg.to_string(), "MJPG");
/// assert_eq!(format!("{:?}", PixelFormat::YUYV), "YUYV (0x56595559)");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PixelFormat(u32);

impl PixelFormat {
    pub const H264: PixelFormat = PixelFormat::from_fourcc(b"H264");
    pub const YUYV: PixelFormat = PixelFormat::from_fourcc(b"YUYV");
    pub const MJPEG: PixelFormat = PixelFormat::from_fourcc(b"MJPG");

    /// Same layout as the kernel's `v4l2_fourcc()` macro: first character in the lowest byte.
    pub const fn from_fourcc(code: &[u8; 4]) -> Self {
        PixelFormat(u32::from_le_bytes(*code))
    }

    pub const fn fourcc(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<u32> for PixelFormat {
    fn from(raw: u32) -> Self {
        PixelFormat(raw)
    }
}

impl From<PixelFormat> for u32 {
    fn from(format: PixelFormat) -> Self {
        format.0
    }
}

impl From<&[u8; 4]> for PixelFormat {
    fn from(code: &[u8; 4]) -> Self {
        Self::from_fourcc(code)
    }
}

/// The four characters of the code. Unprintable bytes are shown as `.`.
impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let code: String = self
            .fourcc()
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();
        f.write_str(&code)
    }
}

impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (0x{:08x})", self, self.0)
    }
}
