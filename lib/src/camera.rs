//! A webcam and its controls.
//!
//! [`Camera`] opens a device node, probes its capabilities and, if it is a video capture device,
//! enumerates its controls and starts delivering kernel change notifications to them. The
//! controls we give a meaning to are available through named accessors, and the others through
//! [`Camera::advanced_controls`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info};
use nix::errno::Errno;
use thiserror::Error;

use crate::controls::camera::{PanAbsolute, TiltAbsolute, ZoomAbsolute};
use crate::controls::user::{AutoWhiteBalance, Brightness, WhiteBalanceTemperature};
use crate::controls::{
    AngleControl, BooleanControl, ControlIterator, ControlKind, KnownControl, PercentControl,
    RawControl,
};
use crate::device::{Device, DeviceConfig, DeviceOpenError, DevicePort};
use crate::events::{EventListener, EventSubscriber};
use crate::ioctl::{Capabilities, Capability, ControlDescriptor, QueryCapError};
use crate::video_mode::{self, VideoMode};

#[derive(Debug, Clone)]
pub struct CameraConfig {
    device_dir: PathBuf,
    device: DeviceConfig,
    listen_events: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            device_dir: PathBuf::from("/dev"),
            device: DeviceConfig::default(),
            listen_events: true,
        }
    }
}

impl CameraConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Directory containing the device nodes.
    pub fn device_dir(self, device_dir: impl Into<PathBuf>) -> Self {
        CameraConfig {
            device_dir: device_dir.into(),
            ..self
        }
    }

    pub fn device_config(self, device: DeviceConfig) -> Self {
        CameraConfig { device, ..self }
    }

    /// Whether to start a thread delivering the changes made to the controls by other processes.
    pub fn listen_events(self, listen_events: bool) -> Self {
        CameraConfig {
            listen_events,
            ..self
        }
    }
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error(transparent)]
    DeviceOpen(#[from] DeviceOpenError),
    #[error("cannot query capabilities of {raw_name}: {source}")]
    QueryCap {
        raw_name: String,
        source: QueryCapError,
    },
}

/// Controls that do not have a named accessor on [`Camera`], keyed by control ID.
#[derive(Debug, Default, Clone)]
pub struct AdvancedControls {
    pub booleans: BTreeMap<u32, BooleanControl>,
    pub integers: BTreeMap<u32, RawControl>,
}

impl AdvancedControls {
    pub fn is_empty(&self) -> bool {
        self.booleans.is_empty() && self.integers.is_empty()
    }
}

/// Returns the name to display for a device `card` string. Some devices repeat their name
/// twice, as in "Insta360 Link: Insta360 Link", in which case only one copy is kept.
pub fn friendly_name(card: &str) -> &str {
    let pieces: Vec<&str> = card.split(':').map(str::trim).collect();
    match pieces.as_slice() {
        [first, second] if first == second => *first,
        _ => card,
    }
}

pub struct Camera {
    raw_name: String,
    port: Arc<dyn DevicePort>,
    capability: Capability,
    video_modes: Vec<VideoMode>,
    pan: Option<AngleControl>,
    tilt: Option<AngleControl>,
    zoom: Option<RawControl>,
    brightness: Option<PercentControl>,
    temperature: Option<RawControl>,
    auto_white_balance: Option<BooleanControl>,
    advanced: AdvancedControls,
    events: Arc<EventSubscriber>,
    listener: Option<EventListener>,
}

impl Camera {
    /// Open the device node `raw_name` (e.g. "video0") of the device directory.
    pub fn open(raw_name: &str, config: CameraConfig) -> Result<Self, CameraError> {
        let path = config.device_dir.join(raw_name);
        let device = Device::open(&path, config.device)?;

        Self::with_port(raw_name, Arc::new(device), config)
    }

    /// Build a camera over an already opened device.
    pub fn with_port(
        raw_name: &str,
        port: Arc<dyn DevicePort>,
        config: CameraConfig,
    ) -> Result<Self, CameraError> {
        let capability = match port.querycap() {
            Ok(capability) => capability,
            // Not a V4L2 device at all: keep it around as an unsupported camera.
            Err(QueryCapError::IoctlError(Errno::ENOTTY)) => {
                debug!("{} does not support VIDIOC_QUERYCAP", raw_name);
                Capability {
                    driver: String::new(),
                    card: raw_name.to_string(),
                    bus_info: String::new(),
                    version: 0,
                    capabilities: Capabilities::empty(),
                    device_caps: None,
                }
            }
            Err(source) => {
                return Err(CameraError::QueryCap {
                    raw_name: raw_name.to_string(),
                    source,
                })
            }
        };

        let events = Arc::new(EventSubscriber::new(Arc::clone(&port)));
        let mut camera = Camera {
            raw_name: raw_name.to_string(),
            video_modes: video_mode::enumerate_video_modes(port.as_ref()),
            port,
            capability,
            pan: None,
            tilt: None,
            zoom: None,
            brightness: None,
            temperature: None,
            auto_white_balance: None,
            advanced: Default::default(),
            events,
            listener: None,
        };

        info!(
            "Found camera: {} ({}), driver {} {}. Capabilities: {:?}, device capabilities: {:?}, supported: {}",
            camera.name(),
            camera.raw_name,
            camera.capability.driver,
            camera.capability.version_string(),
            camera.capability.capabilities(),
            camera.capability.device_caps(),
            camera.is_supported()
        );

        if camera.is_supported() {
            camera.create_controls(config.listen_events);
            if config.listen_events {
                match camera.events.listen() {
                    Ok(listener) => camera.listener = Some(listener),
                    Err(e) => error!(
                        "{}: cannot start event loop, changes made by other processes will not be notified: {}",
                        camera.raw_name, e
                    ),
                }
            }
        }

        Ok(camera)
    }

    fn new_control(&self, descriptor: ControlDescriptor, listen_events: bool) -> RawControl {
        if listen_events {
            RawControl::with_events(Arc::clone(&self.port), descriptor, &self.events).0
        } else {
            RawControl::new(Arc::clone(&self.port), descriptor)
        }
    }

    fn create_controls(&mut self, listen_events: bool) {
        let mut integers = BTreeMap::new();
        let mut booleans = BTreeMap::new();

        for descriptor in ControlIterator::new(self.port.as_ref()) {
            let descriptor = match descriptor {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    error!(
                        "{}: control enumeration aborted, keeping the controls found so far: {}",
                        self.raw_name, e
                    );
                    break;
                }
            };

            info!(
                "Supports control: {} (0x{:08x}). Type = {:?}, Flags = {:?}",
                descriptor.name, descriptor.id, descriptor.type_, descriptor.flags
            );

            let id = descriptor.id;
            match ControlKind::of(&descriptor) {
                ControlKind::Integer => {
                    integers.insert(id, self.new_control(descriptor, listen_events));
                }
                ControlKind::Boolean => {
                    booleans.insert(
                        id,
                        BooleanControl::new(self.new_control(descriptor, listen_events)),
                    );
                }
                ControlKind::Class => (),
                ControlKind::Unsupported => info!(
                    "=> Unsupported control type {:?} (raw type {})",
                    descriptor.type_, descriptor.raw_type
                ),
            }
        }

        self.brightness = integers.remove(&Brightness::ID).map(PercentControl::new);
        self.pan = integers.remove(&PanAbsolute::ID).map(AngleControl::new);
        self.tilt = integers.remove(&TiltAbsolute::ID).map(AngleControl::new);
        self.temperature = integers
            .remove(&WhiteBalanceTemperature::ID)
            .map(|c| c.with_formatter(Arc::new(|v| format!("{}K", v))));
        self.zoom = integers
            .remove(&ZoomAbsolute::ID)
            .map(|c| c.with_formatter(Arc::new(|v| format!("{}%", v))));
        self.auto_white_balance = booleans.remove(&AutoWhiteBalance::ID);

        self.advanced = AdvancedControls { booleans, integers };
    }

    /// Name of the device node, e.g. "video0".
    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    /// Name of the camera suitable for display, e.g. "Insta360 Link".
    pub fn name(&self) -> &str {
        friendly_name(&self.capability.card)
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Whether this device can capture video, which is the condition for its controls to be
    /// available.
    pub fn is_supported(&self) -> bool {
        self.capability.is_video_capture()
    }

    /// Supported video modes, best first.
    pub fn video_modes(&self) -> &[VideoMode] {
        &self.video_modes
    }

    /// Pan in degrees.
    pub fn pan(&self) -> Option<&AngleControl> {
        self.pan.as_ref()
    }

    /// Tilt in degrees.
    pub fn tilt(&self) -> Option<&AngleControl> {
        self.tilt.as_ref()
    }

    pub fn zoom(&self) -> Option<&RawControl> {
        self.zoom.as_ref()
    }

    pub fn brightness(&self) -> Option<&PercentControl> {
        self.brightness.as_ref()
    }

    /// White balance temperature in Kelvin.
    pub fn temperature(&self) -> Option<&RawControl> {
        self.temperature.as_ref()
    }

    pub fn auto_white_balance(&self) -> Option<&BooleanControl> {
        self.auto_white_balance.as_ref()
    }

    pub fn advanced_controls(&self) -> &AdvancedControls {
        &self.advanced
    }

    /// Whether changes made to the controls by other processes are being delivered.
    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().map_or(false, EventListener::is_alive)
    }
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Camera")
            .field("raw_name", &self.raw_name)
            .field("capability", &self.capability)
            .field("video_modes", &self.video_modes.len())
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        info!("Closing camera {}", self.raw_name);
        // Stop the event loop before the subscriptions and the device go away.
        drop(self.listener.take());
        self.events.unsubscribe_all();
    }
}
