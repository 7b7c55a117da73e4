//! The peripheral link: everything that talks to the Bluetooth transport.
//!
//! A link is driven by the [state machine](../control/index.html) through the
//! [`PeripheralLink`](trait.PeripheralLink.html) trait. All calls are fire-and-forget; their
//! outcome arrives later as a [`LinkEvent`](enum.LinkEvent.html) posted through the
//! [`EventSink`](struct.EventSink.html) the link was created with.

#[cfg(target_os = "macos")]
pub mod apple;

use static_assertions::*;

use crate::AdapterState;
use crate::control::Event;
use crate::error::Error;
use crate::sync::Sender;
use crate::uuid::Uuid;

/// Opaque reference to a discovered peripheral.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PeripheralHandle(Uuid);

assert_impl_all!(PeripheralHandle: Send, Sync);

impl PeripheralHandle {
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Platform identifier of the peripheral.
    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// Reference to the relay characteristic within one connection.
///
/// The connection serial is assigned by the link; handles obtained during an earlier
/// connection to the same peripheral never compare equal to the current one.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CharacteristicHandle {
    peripheral: PeripheralHandle,
    id: Uuid,
    connection: u64,
}

assert_impl_all!(CharacteristicHandle: Send, Sync);

impl CharacteristicHandle {
    pub fn new(peripheral: PeripheralHandle, id: Uuid, connection: u64) -> Self {
        Self {
            peripheral,
            id,
            connection,
        }
    }

    pub fn peripheral(&self) -> PeripheralHandle {
        self.peripheral
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connection(&self) -> u64 {
        self.connection
    }
}

/// Commands issued by the state machine to the transport.
pub trait PeripheralLink {
    /// Starts scanning for advertisers of `service`. Does nothing if a scan is already running.
    fn start_scan(&mut self, service: Uuid);

    fn stop_scan(&mut self);

    /// Initiates a connection. Failure is reported as `LinkEvent::Disconnected`.
    fn connect(&mut self, peripheral: PeripheralHandle);

    /// Cancels an active or pending connection.
    fn disconnect(&mut self, peripheral: PeripheralHandle);

    /// Looks up `service` and then `characteristic` within it. Reports
    /// `LinkEvent::ServicesReady` or `LinkEvent::DiscoveryFailed`.
    fn discover(&mut self, peripheral: PeripheralHandle, service: Uuid, characteristic: Uuid);

    fn read_characteristic(&mut self, characteristic: &CharacteristicHandle);

    /// Writes with delivery acknowledgment. Only failures are reported.
    fn write_characteristic(&mut self, characteristic: &CharacteristicHandle, value: &[u8]);

    /// One-shot RSSI query; the caller owns the cadence.
    fn read_signal_strength(&mut self, peripheral: PeripheralHandle);
}

impl<L: PeripheralLink + ?Sized> PeripheralLink for Box<L> {
    fn start_scan(&mut self, service: Uuid) {
        (**self).start_scan(service)
    }

    fn stop_scan(&mut self) {
        (**self).stop_scan()
    }

    fn connect(&mut self, peripheral: PeripheralHandle) {
        (**self).connect(peripheral)
    }

    fn disconnect(&mut self, peripheral: PeripheralHandle) {
        (**self).disconnect(peripheral)
    }

    fn discover(&mut self, peripheral: PeripheralHandle, service: Uuid, characteristic: Uuid) {
        (**self).discover(peripheral, service, characteristic)
    }

    fn read_characteristic(&mut self, characteristic: &CharacteristicHandle) {
        (**self).read_characteristic(characteristic)
    }

    fn write_characteristic(&mut self, characteristic: &CharacteristicHandle, value: &[u8]) {
        (**self).write_characteristic(characteristic, value)
    }

    fn read_signal_strength(&mut self, peripheral: PeripheralHandle) {
        (**self).read_signal_strength(peripheral)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum LinkEvent {
    AdapterStateChanged {
        new_state: AdapterState,
    },

    DeviceDiscovered {
        peripheral: PeripheralHandle,
        rssi: i32,
    },

    Connected {
        peripheral: PeripheralHandle,
    },

    /// The connection was lost, cancelled, or could not be established.
    Disconnected {
        peripheral: PeripheralHandle,
        error: Option<Error>,
    },

    ServicesReady {
        characteristic: CharacteristicHandle,
    },

    DiscoveryFailed {
        peripheral: PeripheralHandle,
        error: Error,
    },

    /// Result of a read (raw bytes, undecoded).
    CharacteristicValueUpdated {
        characteristic: CharacteristicHandle,
        value: Result<Vec<u8>, Error>,
    },

    SignalRead {
        peripheral: PeripheralHandle,
        rssi: Result<i32, Error>,
    },

    WriteFailed {
        characteristic: CharacteristicHandle,
        error: Error,
    },
}

assert_impl_all!(LinkEvent: Send, Sync);

/// Posts link events into the controller queue.
#[derive(Clone, Debug)]
pub struct EventSink(Sender<Event>);

assert_impl_all!(EventSink: Send);

impl EventSink {
    pub(in crate) fn new(sender: Sender<Event>) -> Self {
        Self(sender)
    }

    /// Returns `false` once the controller has stopped.
    pub fn send(&self, event: LinkEvent) -> bool {
        self.0.send(Event::Link(event)).is_ok()
    }
}
