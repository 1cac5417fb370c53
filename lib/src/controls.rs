//! Hardware controls of a camera.
//!
//! Every control implements the [`Control`] trait. [`RawControl`] is the only implementor that
//! talks to the device: it binds one [`ControlDescriptor`] to a [`DevicePort`] and reads or writes
//! the signed integer value the kernel holds. The wrappers of the [`typed`] module present a
//! `RawControl` in another domain (boolean, percentage, angle) by transforming values on the fly.
//! None of them caches the value of the control, so every read reaches the kernel.
//!
//! Sub-modules [`user`] and [`camera`] list the IDs of the controls we give a meaning to,
//! organized by control class.

pub mod camera;
pub mod typed;
pub mod user;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use log::{debug, warn};
use thiserror::Error;

use crate::device::DevicePort;
use crate::events::{EventSubscriber, SubscriptionId};
use crate::ioctl::{
    ControlDescriptor, ControlType, CtrlId, GCtrlError, QueryCtrlError, QueryCtrlFlags, SCtrlError,
};

pub use typed::{AngleControl, BooleanControl, PercentControl};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("error while reading control 0x{id:08x}: {source}")]
    Get { id: u32, source: GCtrlError },
    #[error("error while writing control 0x{id:08x}: {source}")]
    Set { id: u32, source: SCtrlError },
}

/// A control ID this crate gives a specific meaning to.
pub trait KnownControl {
    const ID: u32;
}

/// Callback invoked when the value of a control changes, either because it was set through this
/// crate or because the kernel notified us of a change.
pub type ChangedCallback = Arc<dyn Fn() + Send + Sync>;

/// Identifies a callback registered with [`Control::connect_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Ordered list of `Changed` callbacks.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(ListenerId, ChangedCallback)>>,
}

impl Listeners {
    fn connect(&self, callback: ChangedCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().unwrap().push((id, callback));
        id
    }

    fn disconnect(&self, id: ListenerId) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap();
        let len = callbacks.len();
        callbacks.retain(|(i, _)| *i != id);
        callbacks.len() != len
    }

    /// Invoke every callback in registration order. The list is not locked while the callbacks
    /// run, so they can connect or disconnect listeners themselves.
    fn fire(&self) {
        let callbacks: Vec<ChangedCallback> = self
            .callbacks
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback();
        }
    }
}

/// Common contract of every control, raw or wrapped.
pub trait Control {
    type Value;

    /// Kernel ID of the underlying control.
    fn id(&self) -> u32;
    fn name(&self) -> String;
    fn minimum(&self) -> Self::Value;
    fn maximum(&self) -> Self::Value;
    fn step(&self) -> Self::Value;
    /// Whether the control can currently be changed.
    fn is_enabled(&self) -> bool;

    /// Query the current value from the device.
    fn value(&self) -> Result<Self::Value, ControlError>;
    /// Write `value` to the device and notify the `Changed` listeners.
    fn set_value(&self, value: Self::Value) -> Result<(), ControlError>;

    /// Current value formatted for display, if this control has a specific representation.
    fn user_friendly_value(&self) -> Result<Option<String>, ControlError> {
        Ok(None)
    }

    /// Register `callback` to be invoked whenever the value of the control changes.
    fn connect_changed(&self, callback: ChangedCallback) -> ListenerId;
    /// Unregister a callback previously returned by `connect_changed`. Returns `false` if it was
    /// not registered.
    fn disconnect_changed(&self, id: ListenerId) -> bool;
}

pub type ValueFormatter = Arc<dyn Fn(i32) -> String + Send + Sync>;

struct RawControlInner {
    id: u32,
    port: Arc<dyn DevicePort>,
    /// Refreshed when the kernel reports a change of the control.
    descriptor: RwLock<ControlDescriptor>,
    listeners: Listeners,
}

/// A control with the signed integer value of the kernel.
///
/// This is a cheap handle: clones refer to the same control and share its listeners.
#[derive(Clone)]
pub struct RawControl {
    inner: Arc<RawControlInner>,
    formatter: Option<ValueFormatter>,
}

impl RawControl {
    pub fn new(port: Arc<dyn DevicePort>, descriptor: ControlDescriptor) -> Self {
        RawControl {
            inner: Arc::new(RawControlInner {
                id: descriptor.id,
                port,
                descriptor: RwLock::new(descriptor),
                listeners: Default::default(),
            }),
            formatter: None,
        }
    }

    /// Create a control and subscribe it to the kernel change events of its ID, so its
    /// descriptor is refreshed and its listeners invoked when the control changes outside of
    /// this process.
    pub fn with_events(
        port: Arc<dyn DevicePort>,
        descriptor: ControlDescriptor,
        events: &EventSubscriber,
    ) -> (Self, SubscriptionId) {
        let control = Self::new(port, descriptor);
        let weak: Weak<RawControlInner> = Arc::downgrade(&control.inner);
        let subscription = events.subscribe(
            control.id(),
            Arc::new(move |descriptor: &ControlDescriptor| {
                if let Some(inner) = weak.upgrade() {
                    *inner.descriptor.write().unwrap() = descriptor.clone();
                    inner.listeners.fire();
                }
            }),
        );

        (control, subscription)
    }

    /// Use `formatter` to build the user-friendly representation of values.
    pub fn with_formatter(self, formatter: ValueFormatter) -> Self {
        RawControl {
            formatter: Some(formatter),
            ..self
        }
    }

    /// Snapshot of the current descriptor.
    pub fn descriptor(&self) -> ControlDescriptor {
        self.inner.descriptor.read().unwrap().clone()
    }

    fn clamp(&self, value: i32) -> i32 {
        let (minimum, maximum) = {
            let desc = self.inner.descriptor.read().unwrap();
            (desc.minimum, desc.maximum)
        };

        if value > maximum {
            warn!(
                "SetControl(0x{:08x}): {} is above the maximum of {}",
                self.inner.id, value, maximum
            );
            maximum
        } else if value < minimum {
            warn!(
                "SetControl(0x{:08x}): {} is below the minimum of {}",
                self.inner.id, value, minimum
            );
            minimum
        } else {
            value
        }
    }
}

impl fmt::Debug for RawControl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RawControl")
            .field("descriptor", &*self.inner.descriptor.read().unwrap())
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

impl Control for RawControl {
    type Value = i32;

    fn id(&self) -> u32 {
        self.inner.id
    }

    fn name(&self) -> String {
        self.inner.descriptor.read().unwrap().name.clone()
    }

    fn minimum(&self) -> i32 {
        self.inner.descriptor.read().unwrap().minimum
    }

    fn maximum(&self) -> i32 {
        self.inner.descriptor.read().unwrap().maximum
    }

    fn step(&self) -> i32 {
        self.inner.descriptor.read().unwrap().step
    }

    fn is_enabled(&self) -> bool {
        self.inner.descriptor.read().unwrap().is_enabled()
    }

    fn value(&self) -> Result<i32, ControlError> {
        let id = self.inner.id;
        let value = self
            .inner
            .port
            .g_ctrl(id)
            .map_err(|source| ControlError::Get { id, source })?;
        debug!("GetControl(0x{:08x}) = {}", id, value);
        Ok(value)
    }

    fn set_value(&self, value: i32) -> Result<(), ControlError> {
        let id = self.inner.id;
        let value = self.clamp(value);
        self.inner
            .port
            .s_ctrl(id, value)
            .map_err(|source| ControlError::Set { id, source })?;
        debug!("SetControl(0x{:08x}, {})", id, value);
        self.inner.listeners.fire();
        Ok(())
    }

    fn user_friendly_value(&self) -> Result<Option<String>, ControlError> {
        match &self.formatter {
            Some(formatter) => Ok(Some(formatter(self.value()?))),
            None => Ok(None),
        }
    }

    fn connect_changed(&self, callback: ChangedCallback) -> ListenerId {
        self.inner.listeners.connect(callback)
    }

    fn disconnect_changed(&self, id: ListenerId) -> bool {
        self.inner.listeners.disconnect(id)
    }
}

/// Iterator over the descriptors of all the controls of a device, using `V4L2_CTRL_FLAG_NEXT_CTRL`.
///
/// The iterator ends when the driver reports the end of the list. Any other failure is returned
/// once as an `Err`, after which the iterator ends too.
pub struct ControlIterator<'a> {
    port: &'a dyn DevicePort,
    next: Option<CtrlId>,
}

impl<'a> ControlIterator<'a> {
    pub fn new(port: &'a dyn DevicePort) -> Self {
        ControlIterator {
            port,
            next: Some(CtrlId::FIRST),
        }
    }
}

impl<'a> Iterator for ControlIterator<'a> {
    type Item = Result<ControlDescriptor, QueryCtrlError>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;

        match self.port.queryctrl(id, QueryCtrlFlags::NEXT) {
            Ok(desc) => {
                // A driver returning a control we already went past would make us loop forever.
                match CtrlId::new(desc.id) {
                    Ok(next) if next > id => self.next = Some(next),
                    _ => warn!(
                        "Driver returned control 0x{:08x} after 0x{:08x}, stopping enumeration",
                        desc.id,
                        id.raw()
                    ),
                }
                Some(Ok(desc))
            }
            Err(e) if e.is_end_of_enumeration() => {
                debug!("Finished enumerating controls: {}", e);
                None
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// How the camera layer handles a control, depending on its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Integer,
    Boolean,
    /// Control class marker, not an actual control.
    Class,
    Unsupported,
}

impl ControlKind {
    pub fn of(descriptor: &ControlDescriptor) -> Self {
        match descriptor.type_ {
            Some(ControlType::Integer) => ControlKind::Integer,
            Some(ControlType::Boolean) => ControlKind::Boolean,
            Some(ControlType::CtrlClass) => ControlKind::Class,
            _ => ControlKind::Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings;
    use crate::device::mock::{self, MockPort};
    use nix::errno::Errno;
    use std::sync::atomic::AtomicUsize;

    const ID: u32 = bindings::V4L2_CID_CONTRAST;

    fn raw_control(minimum: i32, maximum: i32) -> (Arc<MockPort>, RawControl) {
        let desc = mock::integer(ID, "Contrast", minimum, maximum, 1);
        let port = Arc::new(MockPort::with_controls([desc.clone()]));
        let control = RawControl::new(port.clone(), desc);
        (port, control)
    }

    #[test]
    fn test_set_then_get_is_clamped() {
        for (minimum, maximum) in [(0, 255), (-10, 10), (100, 300), (5, 5)] {
            let (port, control) = raw_control(minimum, maximum);
            for v in [i32::MIN, minimum - 1, minimum, 0, 42, maximum, maximum + 1, i32::MAX] {
                control.set_value(v).unwrap();
                assert_eq!(control.value().unwrap(), v.clamp(minimum, maximum));
                assert_eq!(port.value(ID), v.clamp(minimum, maximum));
            }
        }
    }

    #[test]
    fn test_get_reads_device() {
        let (port, control) = raw_control(0, 100);
        port.set_raw_value(ID, 77);
        assert_eq!(control.value().unwrap(), 77);
        port.set_raw_value(ID, 12);
        assert_eq!(control.value().unwrap(), 12);
    }

    #[test]
    fn test_set_fires_changed() {
        let (_port, control) = raw_control(0, 100);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let listener = control.connect_changed(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        control.set_value(10).unwrap();
        // Clones share their listeners.
        control.clone().set_value(200).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        assert!(control.disconnect_changed(listener));
        assert!(!control.disconnect_changed(listener));
        control.set_value(20).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_set_does_not_fire() {
        let mut desc = mock::integer(ID, "Contrast", 0, 100, 1);
        desc.flags = crate::ioctl::ControlFlags::READ_ONLY;
        let port = Arc::new(MockPort::with_controls([desc.clone()]));
        let control = RawControl::new(port, desc);
        assert!(!control.is_enabled());

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        control.connect_changed(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let err = control.set_value(10).unwrap_err();
        assert!(matches!(
            err,
            ControlError::Set {
                source: SCtrlError::ReadOnly,
                ..
            }
        ));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_user_friendly_value() {
        let (port, control) = raw_control(2000, 10000);
        assert_eq!(control.user_friendly_value().unwrap(), None);

        let control = control.with_formatter(Arc::new(|v| format!("{}K", v)));
        port.set_raw_value(ID, 5600);
        assert_eq!(control.user_friendly_value().unwrap(), Some("5600K".into()));
    }

    #[test]
    fn test_control_iterator_terminates() {
        for n in [0usize, 1, 5] {
            let controls = (0..n as u32)
                .map(|i| mock::integer(bindings::V4L2_CID_BASE + i, "Control", 0, 1, 1));
            let port = MockPort::with_controls(controls);
            port.state.lock().unwrap().end_of_controls = Some(Errno::ENOTTY);

            let found: Vec<_> = ControlIterator::new(&port).collect();
            assert_eq!(found.len(), n);
            assert!(found.iter().all(|d| d.is_ok()));
            // N successful queries, plus the terminating one.
            assert_eq!(port.state.lock().unwrap().queryctrl_calls, n + 1);
        }
    }

    #[test]
    fn test_control_iterator_failure() {
        let port = MockPort::with_controls(mock::webcam_controls());
        port.state.lock().unwrap().queryctrl_failure = Some((3, Errno::EIO));

        let found: Vec<_> = ControlIterator::new(&port).collect();
        assert_eq!(found.len(), 4);
        assert!(found[..3].iter().all(|d| d.is_ok()));
        assert!(matches!(
            found[3],
            Err(QueryCtrlError::IoctlError(Errno::EIO))
        ));
    }

    #[test]
    fn test_control_kind() {
        let kinds: Vec<ControlKind> = mock::webcam_controls()
            .iter()
            .map(ControlKind::of)
            .collect();
        assert_eq!(kinds.iter().filter(|k| **k == ControlKind::Class).count(), 2);
        assert_eq!(
            kinds
                .iter()
                .filter(|k| **k == ControlKind::Unsupported)
                .count(),
            2
        );
        assert_eq!(kinds.iter().filter(|k| **k == ControlKind::Boolean).count(), 2);
    }
}
