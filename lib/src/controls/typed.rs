//! Wrappers presenting an integer control in another value domain.
//!
//! A wrapper owns a handle to its inner control and nothing else: values are transformed on every
//! access, and name, enablement and `Changed` notifications are forwarded as-is. The friendly
//! value of the inner control is not, since it describes a raw value.

use super::{ChangedCallback, Control, ControlError, ListenerId, RawControl};

macro_rules! forward_control {
    () => {
        fn id(&self) -> u32 {
            self.inner.id()
        }

        fn name(&self) -> String {
            self.inner.name()
        }

        fn is_enabled(&self) -> bool {
            self.inner.is_enabled()
        }

        fn connect_changed(&self, callback: ChangedCallback) -> ListenerId {
            self.inner.connect_changed(callback)
        }

        fn disconnect_changed(&self, id: ListenerId) -> bool {
            self.inner.disconnect_changed(id)
        }
    };
}

/// Boolean view of a control: raw `1` is `true`, anything else `false`.
#[derive(Debug, Clone)]
pub struct BooleanControl<C = RawControl> {
    inner: C,
}

impl<C: Control<Value = i32>> BooleanControl<C> {
    pub fn new(inner: C) -> Self {
        BooleanControl { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Control<Value = i32>> Control for BooleanControl<C> {
    type Value = bool;

    forward_control!();

    fn minimum(&self) -> bool {
        false
    }

    fn maximum(&self) -> bool {
        true
    }

    fn step(&self) -> bool {
        true
    }

    fn value(&self) -> Result<bool, ControlError> {
        Ok(self.inner.value()? == 1)
    }

    fn set_value(&self, value: bool) -> Result<(), ControlError> {
        self.inner.set_value(if value { 1 } else { 0 })
    }
}

/// Percentage view of a control, mapping its raw range linearly onto `0..=100`.
#[derive(Debug, Clone)]
pub struct PercentControl<C = RawControl> {
    inner: C,
}

impl<C: Control<Value = i32>> PercentControl<C> {
    pub fn new(inner: C) -> Self {
        PercentControl { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Width of the raw range, or `None` for a control that can take a single value.
    fn span(&self) -> Option<i64> {
        let span = self.inner.maximum() as i64 - self.inner.minimum() as i64;
        if span > 0 {
            Some(span)
        } else {
            None
        }
    }
}

impl<C: Control<Value = i32>> Control for PercentControl<C> {
    type Value = i32;

    forward_control!();

    fn minimum(&self) -> i32 {
        0
    }

    fn maximum(&self) -> i32 {
        100
    }

    /// The raw step scaled to the percent range. May be 0 for fine-grained controls.
    fn step(&self) -> i32 {
        match self.span() {
            Some(span) => (self.inner.step() as i64 * 100 / span) as i32,
            None => 0,
        }
    }

    fn value(&self) -> Result<i32, ControlError> {
        let raw = self.inner.value()?;
        Ok(match self.span() {
            Some(span) => ((raw as i64 - self.inner.minimum() as i64) * 100 / span) as i32,
            None => 0,
        })
    }

    fn set_value(&self, value: i32) -> Result<(), ControlError> {
        let minimum = self.inner.minimum();
        let raw = match self.span() {
            Some(span) => minimum as i64 + span * value as i64 / 100,
            None => minimum as i64,
        };
        // The inner control clamps, but the conversion itself must not wrap around.
        let raw = raw.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        self.inner.set_value(raw)
    }
}

/// Number of raw units per degree for angular controls.
const ARCSECONDS_PER_DEGREE: f32 = 3600.0;

/// Angle view of a control whose raw unit is the arcsecond, in degrees.
#[derive(Debug, Clone)]
pub struct AngleControl<C = RawControl> {
    inner: C,
}

impl<C: Control<Value = i32>> AngleControl<C> {
    pub fn new(inner: C) -> Self {
        AngleControl { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Control<Value = i32>> Control for AngleControl<C> {
    type Value = f32;

    forward_control!();

    fn minimum(&self) -> f32 {
        self.inner.minimum() as f32 / ARCSECONDS_PER_DEGREE
    }

    fn maximum(&self) -> f32 {
        self.inner.maximum() as f32 / ARCSECONDS_PER_DEGREE
    }

    fn step(&self) -> f32 {
        self.inner.step() as f32 / ARCSECONDS_PER_DEGREE
    }

    fn value(&self) -> Result<f32, ControlError> {
        Ok(self.inner.value()? as f32 / ARCSECONDS_PER_DEGREE)
    }

    fn set_value(&self, degrees: f32) -> Result<(), ControlError> {
        // Saturating float to integer conversion.
        self.inner
            .set_value((degrees * ARCSECONDS_PER_DEGREE).round() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings;
    use crate::device::mock::{self, MockPort};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn port_with(desc: crate::ioctl::ControlDescriptor) -> (Arc<MockPort>, RawControl) {
        let port = Arc::new(MockPort::with_controls([desc.clone()]));
        let control = RawControl::new(port.clone(), desc);
        (port, control)
    }

    #[test]
    fn test_angle() {
        let id = bindings::V4L2_CID_PAN_ABSOLUTE;
        let (port, raw) = port_with(mock::integer(id, "Pan, Absolute", -648000, 648000, 3600));
        let pan = AngleControl::new(raw);

        pan.set_value(90.0).unwrap();
        assert_eq!(port.value(id), 324000);
        assert_eq!(pan.value().unwrap(), 90.0);

        assert_eq!(pan.minimum(), -180.0);
        assert_eq!(pan.maximum(), 180.0);
        assert_eq!(pan.step(), 1.0);

        pan.set_value(-12.5).unwrap();
        assert_eq!(port.value(id), -45000);

        // Clamped by the raw control.
        pan.set_value(720.0).unwrap();
        assert_eq!(port.value(id), 648000);
    }

    #[test]
    fn test_percent() {
        let id = bindings::V4L2_CID_BRIGHTNESS;
        let (port, raw) = port_with(mock::integer(id, "Brightness", 100, 300, 2));
        let brightness = PercentControl::new(raw);

        brightness.set_value(50).unwrap();
        assert_eq!(port.value(id), 200);

        port.set_raw_value(id, 300);
        assert_eq!(brightness.value().unwrap(), 100);
        port.set_raw_value(id, 100);
        assert_eq!(brightness.value().unwrap(), 0);
        port.set_raw_value(id, 151);
        assert_eq!(brightness.value().unwrap(), 25);

        assert_eq!(brightness.minimum(), 0);
        assert_eq!(brightness.maximum(), 100);
        assert_eq!(brightness.step(), 1);

        brightness.set_value(150).unwrap();
        assert_eq!(port.value(id), 300);
    }

    #[test]
    fn test_percent_reaches_bounds() {
        let id = bindings::V4L2_CID_BRIGHTNESS;
        let (port, raw) = port_with(mock::integer(id, "Brightness", 0, 255, 1));
        let brightness = PercentControl::new(raw);

        brightness.set_value(100).unwrap();
        assert_eq!(port.value(id), 255);
        assert_eq!(brightness.value().unwrap(), 100);

        brightness.set_value(0).unwrap();
        assert_eq!(port.value(id), 0);

        for percent in 0..=100 {
            brightness.set_value(percent).unwrap();
            assert_eq!(port.value(id), percent * 255 / 100);
        }

        // Ranges wider than what fits in an i32 once multiplied.
        let id = bindings::V4L2_CID_CONTRAST;
        let (port, raw) = port_with(mock::integer(id, "Contrast", i32::MIN, i32::MAX, 1));
        let contrast = PercentControl::new(raw);
        contrast.set_value(100).unwrap();
        assert_eq!(port.value(id), i32::MAX);
        assert_eq!(contrast.value().unwrap(), 100);
    }

    #[test]
    fn test_wrappers_hide_raw_friendly_value() {
        let id = bindings::V4L2_CID_BRIGHTNESS;
        let (_port, raw) = port_with(mock::integer(id, "Brightness", 0, 255, 1));
        let raw = raw.with_formatter(Arc::new(|v| format!("{} units", v)));
        assert_eq!(raw.user_friendly_value().unwrap().as_deref(), Some("0 units"));

        assert_eq!(PercentControl::new(raw.clone()).user_friendly_value().unwrap(), None);
        assert_eq!(BooleanControl::new(raw.clone()).user_friendly_value().unwrap(), None);
        assert_eq!(AngleControl::new(raw).user_friendly_value().unwrap(), None);
    }

    #[test]
    fn test_percent_single_value() {
        let id = bindings::V4L2_CID_BRIGHTNESS;
        let (port, raw) = port_with(mock::integer(id, "Brightness", 7, 7, 1));
        let brightness = PercentControl::new(raw);

        assert_eq!(brightness.value().unwrap(), 0);
        assert_eq!(brightness.step(), 0);
        brightness.set_value(80).unwrap();
        assert_eq!(port.value(id), 7);
    }

    #[test]
    fn test_boolean() {
        let id = bindings::V4L2_CID_AUTO_WHITE_BALANCE;
        let (port, raw) = port_with(mock::boolean(id, "White Balance, Automatic"));
        let awb = BooleanControl::new(raw);

        awb.set_value(true).unwrap();
        assert_eq!(port.value(id), 1);
        assert!(awb.value().unwrap());

        port.set_raw_value(id, 0);
        assert!(!awb.value().unwrap());

        assert!(!awb.minimum());
        assert!(awb.maximum());
        assert!(awb.step());
    }

    #[test]
    fn test_wrappers_share_state() {
        let id = bindings::V4L2_CID_TILT_ABSOLUTE;
        let (_port, raw) = port_with(mock::integer(id, "Tilt, Absolute", -324000, 360000, 3600));
        let first = AngleControl::new(raw.clone());
        let second = AngleControl::new(raw.clone());

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        second.connect_changed(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        first.set_value(-30.0).unwrap();
        assert_eq!(second.value().unwrap(), -30.0);
        assert_eq!(raw.value().unwrap(), -108000);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(first.name(), "Tilt, Absolute");
        assert_eq!(first.id(), id);
    }
}
