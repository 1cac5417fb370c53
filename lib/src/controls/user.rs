//! Controls of the USER class we give a meaning to.

use crate::bindings;
use crate::controls::KnownControl;

pub struct Brightness;
impl KnownControl for Brightness {
    const ID: u32 = bindings::V4L2_CID_BRIGHTNESS;
}

pub struct AutoWhiteBalance;
impl KnownControl for AutoWhiteBalance {
    const ID: u32 = bindings::V4L2_CID_AUTO_WHITE_BALANCE;
}

pub struct WhiteBalanceTemperature;
impl KnownControl for WhiteBalanceTemperature {
    const ID: u32 = bindings::V4L2_CID_WHITE_BALANCE_TEMPERATURE;
}
