//! Delivery of control change notifications sent by the kernel.
//!
//! The [`EventSubscriber`] keeps, for each control ID, the ordered list of callbacks interested in
//! changes of that control, and subscribes to the matching kernel events. [`EventSubscriber::listen`]
//! starts a thread that waits on the device with an edge-triggered [`Poller`], dequeues every
//! event the kernel has for us, refreshes the descriptor of the control that changed and invokes
//! its callbacks in registration order.
//!
//! The thread is stopped by dropping the returned [`EventListener`].

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::device::poller::{Poller, Waker};
use crate::device::DevicePort;
use crate::ioctl::{
    ControlDescriptor, CtrlId, DqEvent, DqEventError, Event, EventType, QueryCtrlFlags,
    SubscribeEventError,
};

/// Duration of the first wait of the event loop. Its outcome is discarded: the first wakeup
/// reported for a freshly registered device is unreliable on some drivers.
const INITIAL_WAIT: Duration = Duration::from_millis(10);

/// Callback invoked on the polling thread with the refreshed descriptor of the control that
/// changed.
pub type EventCallback = Arc<dyn Fn(&ControlDescriptor) + Send + Sync>;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("cannot subscribe to changes of control 0x{id:08x}: {source}")]
    Subscribe {
        id: u32,
        source: SubscribeEventError,
    },
    #[error("cannot unsubscribe from changes of control 0x{id:08x}: {source}")]
    Unsubscribe {
        id: u32,
        source: SubscribeEventError,
    },
}

/// Identifies one callback registered with [`EventSubscriber::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    control: u32,
    seq: u64,
}

impl SubscriptionId {
    pub fn control(&self) -> u32 {
        self.control
    }
}

struct Subscription {
    seq: u64,
    callback: EventCallback,
}

pub struct EventSubscriber {
    port: Arc<dyn DevicePort>,
    table: Mutex<BTreeMap<u32, Vec<Subscription>>>,
    next_seq: AtomicU64,
}

impl EventSubscriber {
    pub fn new(port: Arc<dyn DevicePort>) -> Self {
        EventSubscriber {
            port,
            table: Default::default(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register `callback` to be invoked when control `id` changes.
    ///
    /// The kernel subscription is requested along with the first callback of a control. If it
    /// fails, a warning is logged and the callback is registered nonetheless: it will be invoked
    /// if an event ever arrives for this control.
    pub fn subscribe(&self, id: u32, callback: EventCallback) -> SubscriptionId {
        let mut table = self.table.lock().unwrap();

        if !table.contains_key(&id) {
            // Changes we make ourselves are notified by `Control::set_value`, so no feedback.
            if let Err(source) = self.port.subscribe_event(EventType::Ctrl(id)) {
                warn!(
                    "{}, live updates of this control are disabled",
                    SubscriptionError::Subscribe { id, source }
                );
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        table
            .entry(id)
            .or_default()
            .push(Subscription { seq, callback });

        SubscriptionId { control: id, seq }
    }

    /// Remove every callback registered for control `id` and cancel the kernel subscription.
    ///
    /// Does nothing if no callback is registered for `id`. If the kernel refuses to cancel the
    /// subscription, the callbacks are kept and the error is returned.
    pub fn unsubscribe(&self, id: u32) -> Result<(), SubscriptionError> {
        let mut table = self.table.lock().unwrap();
        if !table.contains_key(&id) {
            return Ok(());
        }

        self.port
            .unsubscribe_event(EventType::Ctrl(id))
            .map_err(|source| SubscriptionError::Unsubscribe { id, source })?;
        table.remove(&id);

        Ok(())
    }

    /// Remove a single callback. The kernel subscription is cancelled along with the last callback
    /// of a control. Returns `false` if the callback was not registered.
    pub fn remove(&self, subscription: SubscriptionId) -> bool {
        let id = subscription.control;
        let mut table = self.table.lock().unwrap();
        let subscriptions = match table.get_mut(&id) {
            Some(subscriptions) => subscriptions,
            None => return false,
        };

        let len = subscriptions.len();
        subscriptions.retain(|s| s.seq != subscription.seq);
        if subscriptions.len() == len {
            return false;
        }

        if subscriptions.is_empty() {
            table.remove(&id);
            if let Err(source) = self.port.unsubscribe_event(EventType::Ctrl(id)) {
                warn!("{}", SubscriptionError::Unsubscribe { id, source });
            }
        }

        true
    }

    /// Drop every callback and cancel all kernel subscriptions.
    pub fn unsubscribe_all(&self) {
        let ids: Vec<u32> = self.table.lock().unwrap().keys().copied().collect();
        for id in ids {
            if let Err(e) = self.unsubscribe(id) {
                warn!("{}", e);
            }
        }
        self.table.lock().unwrap().clear();
    }

    /// IDs of the controls that have at least one callback.
    #[cfg(test)]
    fn subscribed_controls(&self) -> Vec<u32> {
        self.table.lock().unwrap().keys().copied().collect()
    }

    /// Dispatch one dequeued event to the callbacks of its control.
    pub fn handle_event(&self, event: &DqEvent) {
        let ctrl = match &event.event {
            Event::Ctrl(ctrl) => ctrl,
            Event::Other(type_) => {
                info!("Ignoring event of type {} (seq {})", type_, event.sequence);
                return;
            }
        };
        debug!(
            "Control 0x{:08x} changed ({:?}), value {}",
            ctrl.id, ctrl.changes, ctrl.value
        );

        let callbacks: Vec<EventCallback> = match self.table.lock().unwrap().get(&ctrl.id) {
            Some(subscriptions) => subscriptions
                .iter()
                .map(|s| Arc::clone(&s.callback))
                .collect(),
            None => {
                warn!(
                    "Received change event for control 0x{:08x} with no subscriber",
                    ctrl.id
                );
                return;
            }
        };

        // Range and flags may have changed along with the value.
        let descriptor = match CtrlId::new(ctrl.id)
            .map_err(|e| e.to_string())
            .and_then(|id| {
                self.port
                    .queryctrl(id, QueryCtrlFlags::empty())
                    .map_err(|e| e.to_string())
            }) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(
                    "Cannot refresh control 0x{:08x}, dropping its change event: {}",
                    ctrl.id, e
                );
                return;
            }
        };

        for callback in callbacks {
            callback(&descriptor);
        }
    }

    /// Dequeue and dispatch events until the kernel has none left. Returns the number of events
    /// dequeued.
    pub fn drain_events(&self) -> Result<usize, DqEventError> {
        let mut count = 0;
        loop {
            match self.port.dqevent() {
                Ok(event) => {
                    count += 1;
                    self.handle_event(&event);
                    if event.pending == 0 {
                        return Ok(count);
                    }
                }
                Err(DqEventError::NotReady) => return Ok(count),
                Err(e) => return Err(e),
            }
        }
    }

    /// Start the thread that delivers kernel events to the callbacks.
    pub fn listen(self: &Arc<Self>) -> io::Result<EventListener> {
        let poller = Poller::new(self.port.as_raw_fd())?;
        let waker = poller.waker();
        let alive = Arc::new(AtomicBool::new(true));

        let subscriber = Arc::clone(self);
        let thread_alive = Arc::clone(&alive);
        let handle = thread::Builder::new()
            .name(format!("v4l2cam-events-{}", self.port.as_raw_fd()))
            .spawn(move || {
                subscriber.event_loop(poller);
                thread_alive.store(false, Ordering::Release);
            })?;

        Ok(EventListener {
            waker,
            handle: Some(handle),
            alive,
        })
    }

    fn drain_and_log(&self) {
        if let Err(e) = self.drain_events() {
            error!("Failed to dequeue event: {}", e);
        }
    }

    fn event_loop(&self, mut poller: Poller) {
        match poller.poll(Some(INITIAL_WAIT)) {
            Ok(wakeup) if wakeup.woken => {
                debug!("Event loop stopped before it started");
                return;
            }
            Ok(_) => (),
            Err(e) => {
                error!("Event loop failed to start: {}", e);
                return;
            }
        }
        // Catch up with what was queued while we were setting up.
        self.drain_and_log();

        loop {
            let wakeup = match poller.poll(None) {
                Ok(wakeup) => wakeup,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Event loop stopped, no more changes will be notified: {}", e);
                    return;
                }
            };

            if wakeup.woken {
                debug!("Event loop stopped");
                return;
            }
            if wakeup.device() {
                self.drain_and_log();
            }
        }
    }
}

/// Handle to the thread started by [`EventSubscriber::listen`]. Dropping it stops the thread.
pub struct EventListener {
    waker: Arc<Waker>,
    handle: Option<JoinHandle<()>>,
    alive: Arc<AtomicBool>,
}

impl EventListener {
    /// Whether events are still being delivered.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        if let Err(e) = self.waker.wake() {
            // Joining would block forever.
            error!("Cannot stop event loop, leaving it behind: {}", e);
            return;
        }

        if let Some(handle) = self.handle.take() {
            // Dropped from one of the callbacks: the loop ends once they have returned.
            if handle.thread().id() == thread::current().id() {
                debug!("Event loop stopped from its own thread");
                return;
            }
            if handle.join().is_err() {
                error!("Event loop panicked");
            }
        }
    }
}
