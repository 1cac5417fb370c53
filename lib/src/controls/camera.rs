//! Controls of the CAMERA class we give a meaning to.

use crate::bindings;
use crate::controls::KnownControl;

/// Absolute pan, in arcseconds.
pub struct PanAbsolute;
impl KnownControl for PanAbsolute {
    const ID: u32 = bindings::V4L2_CID_PAN_ABSOLUTE;
}

/// Absolute tilt, in arcseconds.
pub struct TiltAbsolute;
impl KnownControl for TiltAbsolute {
    const ID: u32 = bindings::V4L2_CID_TILT_ABSOLUTE;
}

pub struct ZoomAbsolute;
impl KnownControl for ZoomAbsolute {
    const ID: u32 = bindings::V4L2_CID_ZOOM_ABSOLUTE;
}
