//! Discovery of the cameras attached to the system.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::camera::{Camera, CameraConfig};

/// Name of the camera picked by [`CameraManager::default_camera`] when present.
pub const PREFERRED_CAMERA_NAME: &str = "Insta360 Link";

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    sysfs_dir: PathBuf,
    preferred_name: String,
    camera: CameraConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            sysfs_dir: PathBuf::from("/sys/class/video4linux"),
            preferred_name: PREFERRED_CAMERA_NAME.to_string(),
            camera: CameraConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Directory listing one entry per video device, named after its device node.
    pub fn sysfs_dir(self, sysfs_dir: impl Into<PathBuf>) -> Self {
        ManagerConfig {
            sysfs_dir: sysfs_dir.into(),
            ..self
        }
    }

    pub fn preferred_name(self, preferred_name: impl Into<String>) -> Self {
        ManagerConfig {
            preferred_name: preferred_name.into(),
            ..self
        }
    }

    /// Configuration of every camera opened by the manager. Its device directory is where the
    /// device nodes are looked for.
    pub fn camera_config(self, camera: CameraConfig) -> Self {
        ManagerConfig { camera, ..self }
    }
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("No cameras were found")]
    NoCamerasFound,
    #[error("cannot list video devices: {0}")]
    Sysfs(#[from] io::Error),
}

pub struct CameraManager {
    cameras: Vec<Camera>,
    preferred_name: String,
}

/// Names of the entries of `dir`, in natural order so "video2" comes before "video10".
fn list_devices(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        match entry?.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => warn!("Ignoring non UTF-8 device name {:?}", name),
        }
    }
    names.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    Ok(names)
}

impl CameraManager {
    /// Open every video device of the system and keep the supported ones. Devices that cannot be
    /// opened are skipped.
    pub fn new(config: ManagerConfig) -> Result<Self, ManagerError> {
        let names = match list_devices(&config.sysfs_dir) {
            Ok(names) => names,
            // No video device has ever been registered.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("{} does not exist", config.sysfs_dir.display());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut cameras = Vec::new();
        for name in names {
            match Camera::open(&name, config.camera.clone()) {
                Ok(camera) if camera.is_supported() => cameras.push(camera),
                Ok(camera) => info!("Skipping {}: not a video capture device", camera.raw_name()),
                Err(e) => warn!("Skipping {}: {}", name, e),
            }
        }

        Ok(Self::from_cameras(cameras, config.preferred_name))
    }

    /// Build a manager over already opened cameras.
    pub fn from_cameras(cameras: Vec<Camera>, preferred_name: impl Into<String>) -> Self {
        CameraManager {
            cameras,
            preferred_name: preferred_name.into(),
        }
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    /// The preferred camera if it is present, otherwise the first one.
    pub fn default_camera(&self) -> Result<&Camera, ManagerError> {
        self.cameras
            .iter()
            .find(|c| c.name() == self.preferred_name)
            .or_else(|| self.cameras.first())
            .ok_or(ManagerError::NoCamerasFound)
    }

    /// Select a camera by friendly name (e.g. "Insta360 Link") or device node name (e.g.
    /// "video0").
    pub fn find(&self, name: &str) -> Option<&Camera> {
        self.cameras
            .iter()
            .find(|c| c.raw_name() == name)
            .or_else(|| self.cameras.iter().find(|c| c.name() == name))
    }
}
