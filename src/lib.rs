//! Connection controller for a single Bluetooth Low Energy relay board.
//!
//! The controller finds the first peripheral advertising the relay service, connects to it, reads
//! and writes one boolean relay characteristic, polls the signal strength and releases the link
//! when the host application stays in the background for too long. Every connection failure
//! takes the same path back to scanning.
//!
//! The pieces, leaves first:
//!
//! * [`link`](link/index.html) - the [`PeripheralLink`](link/trait.PeripheralLink.html) trait over
//!   the Bluetooth transport, with a Core Bluetooth implementation on macOS.
//! * [`control`](control/index.html) - the state machine, one transition function over
//!   [`Event`](control/enum.Event.html).
//! * [`timer`](timer/index.html) - the RSSI poll and background grace timers.
//! * [`presentation`](presentation/index.html) - read-only [`Status`](presentation/struct.Status.html)
//!   for a UI, and the relay toggle command.
//! * [`runtime`](runtime/index.html) - the event queue and its thread.
//!
//! ## Example
//!
//! ```no_run
//! use van_control::*;
//! # struct NoLink;
//! # impl link::PeripheralLink for NoLink {
//! #     fn start_scan(&mut self, _: uuid::Uuid) {}
//! #     fn stop_scan(&mut self) {}
//! #     fn connect(&mut self, _: link::PeripheralHandle) {}
//! #     fn disconnect(&mut self, _: link::PeripheralHandle) {}
//! #     fn discover(&mut self, _: link::PeripheralHandle, _: uuid::Uuid, _: uuid::Uuid) {}
//! #     fn read_characteristic(&mut self, _: &link::CharacteristicHandle) {}
//! #     fn write_characteristic(&mut self, _: &link::CharacteristicHandle, _: &[u8]) {}
//! #     fn read_signal_strength(&mut self, _: link::PeripheralHandle) {}
//! # }
//! # fn new_platform_link(_: link::EventSink) -> NoLink { NoLink }
//!
//! let controller = ControllerBuilder::new()
//!     .build(|sink| new_platform_link(sink))
//!     .unwrap();
//! let presenter = controller.presenter();
//!
//! for status in presenter.subscribe().iter() {
//!     println!("connected: {}, relay: {}, bars: {}",
//!         status.is_connected(), status.relay, status.signal_level().bars());
//!     if status.is_connected() && !status.relay {
//!         presenter.request_relay_change(true);
//!     }
//! }
//! ```
#![deny(dead_code)]
#![deny(non_snake_case)]
#![deny(unused_imports)]
#![deny(unused_must_use)]

pub mod control;
pub mod error;
pub mod link;
pub mod presentation;
pub mod relay;
pub mod runtime;
mod sync;
pub mod timer;
pub mod uuid;

use static_assertions::*;

pub use control::{Config, ConnectionState};
pub use presentation::{Presenter, SignalLevel, Status};
pub use runtime::{Controller, ControllerBuilder};
pub use sync::Receiver;
pub use uuid::Uuid;

/// Service advertised by the relay board and containing the relay characteristic.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// The relay characteristic: readable, writable with response, UTF-8 `true` / `false`.
pub const RELAY_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// The possible states of the platform Bluetooth adapter.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum AdapterState {
    /// The adapter state is unknown.
    Unknown,

    /// The connection with the system service was momentarily lost.
    Resetting,

    /// The host doesn't support the Bluetooth low energy central role.
    Unsupported,

    /// The application isn't authorized to use Bluetooth.
    Unauthorized,

    /// Bluetooth is currently powered off.
    PoweredOff,

    /// Bluetooth is powered on and available to use.
    PoweredOn,
}

assert_impl_all!(AdapterState: Send, Sync);
