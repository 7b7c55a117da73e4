//! [`PeripheralLink`](../trait.PeripheralLink.html) on top of Core Bluetooth.
//!
//! Core Bluetooth delivers its delegate callbacks on its own serial queue as `CentralEvent`s. A
//! forwarding thread translates them into [`LinkEvent`](../enum.LinkEvent.html)s and posts them
//! into the controller queue; platform objects are kept here, keyed by the opaque handles the
//! state machine works with.

use core_bluetooth::ManagerState;
use core_bluetooth::central::{CentralEvent, CentralManager, ScanOptions};
use core_bluetooth::central::characteristic::{Characteristic, WriteKind};
use core_bluetooth::central::peripheral::Peripheral;
use core_bluetooth::error::Error as CbError;
use core_bluetooth::uuid::Uuid as CbUuid;
use log::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::AdapterState;
use crate::error::{Error, ErrorKind};
use crate::uuid::Uuid;
use super::*;

fn to_cb(uuid: Uuid) -> CbUuid {
    CbUuid::from_bytes(uuid.bytes())
}

fn from_cb(uuid: CbUuid) -> Uuid {
    Uuid::from_bytes(uuid.bytes())
}

fn error(kind: ErrorKind, err: CbError) -> Error {
    Error::new(kind, err.to_string())
}

fn adapter_state(state: ManagerState) -> AdapterState {
    match state {
        ManagerState::Resetting => AdapterState::Resetting,
        ManagerState::Unsupported => AdapterState::Unsupported,
        ManagerState::Unauthorized => AdapterState::Unauthorized,
        ManagerState::PoweredOff => AdapterState::PoweredOff,
        ManagerState::PoweredOn => AdapterState::PoweredOn,
        _ => AdapterState::Unknown,
    }
}

struct Discovery {
    service: Uuid,
    characteristic: Uuid,
}

struct Relay {
    handle: CharacteristicHandle,
    characteristic: Characteristic,
}

#[derive(Default)]
struct Registry {
    peripherals: HashMap<Uuid, Peripheral>,
    discovery: Option<Discovery>,
    relay: Option<Relay>,
    connections: u64,
    scanning: bool,
}

#[derive(Clone)]
struct Shared(Arc<Mutex<Registry>>);

impl Shared {
    fn lock(&self) -> MutexGuard<Registry> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct CoreBluetoothLink {
    central: CentralManager,
    sink: EventSink,
    shared: Shared,
}

impl CoreBluetoothLink {
    /// Creates the Core Bluetooth central manager. The adapter state arrives shortly after as
    /// `LinkEvent::AdapterStateChanged`.
    pub fn new(sink: EventSink) -> Result<Self, Error> {
        let (central, receiver) = CentralManager::new();
        let shared = Shared(Arc::new(Mutex::new(Registry::default())));

        let forward_sink = sink.clone();
        let forward_shared = shared.clone();
        thread::Builder::new()
            .name("core-bluetooth-events".into())
            .spawn(move || {
                for event in receiver.iter() {
                    trace!("core bluetooth event: {:?}", event);
                    if let Some(event) = translate(event, &forward_shared) {
                        if !forward_sink.send(event) {
                            break;
                        }
                    }
                }
                debug!("core bluetooth event forwarding stopped");
            })
            .map_err(|e| Error::new(ErrorKind::Other, e.to_string()))?;

        Ok(Self {
            central,
            sink,
            shared,
        })
    }

    fn peripheral(&self, handle: PeripheralHandle) -> Option<Peripheral> {
        self.shared.lock().peripherals.get(&handle.id()).cloned()
    }

    fn relay(&self, handle: &CharacteristicHandle) -> Option<(Peripheral, Characteristic)> {
        let registry = self.shared.lock();
        let relay = registry.relay.as_ref().filter(|r| r.handle == *handle)?;
        let peripheral = registry.peripherals.get(&handle.peripheral().id())?;
        Some((peripheral.clone(), relay.characteristic.clone()))
    }
}

impl PeripheralLink for CoreBluetoothLink {
    fn start_scan(&mut self, service: Uuid) {
        let mut registry = self.shared.lock();
        if registry.scanning {
            return;
        }
        registry.scanning = true;
        registry.peripherals.clear();
        self.central.scan_with_options(ScanOptions::default().services(&[to_cb(service)]));
    }

    fn stop_scan(&mut self) {
        self.shared.lock().scanning = false;
        self.central.cancel_scan();
    }

    fn connect(&mut self, peripheral: PeripheralHandle) {
        match self.peripheral(peripheral) {
            Some(p) => self.central.connect(&p),
            None => {
                self.sink.send(LinkEvent::Disconnected {
                    peripheral,
                    error: Some(Error::new(ErrorKind::Connect, "peripheral is no longer known")),
                });
            }
        }
    }

    fn disconnect(&mut self, peripheral: PeripheralHandle) {
        {
            let mut registry = self.shared.lock();
            if registry.relay.as_ref().map(|r| r.handle.peripheral()) == Some(peripheral) {
                registry.relay = None;
            }
            registry.discovery = None;
        }
        if let Some(p) = self.peripheral(peripheral) {
            self.central.cancel_connect(&p);
        }
    }

    fn discover(&mut self, peripheral: PeripheralHandle, service: Uuid, characteristic: Uuid) {
        let p = match self.peripheral(peripheral) {
            Some(p) => p,
            None => {
                self.sink.send(LinkEvent::DiscoveryFailed {
                    peripheral,
                    error: Error::new(ErrorKind::Discovery, "peripheral is no longer known"),
                });
                return;
            }
        };
        self.shared.lock().discovery = Some(Discovery {
            service,
            characteristic,
        });
        p.discover_services_with_uuids(&[to_cb(service)]);
    }

    fn read_characteristic(&mut self, characteristic: &CharacteristicHandle) {
        match self.relay(characteristic) {
            Some((p, c)) => p.read_characteristic(&c),
            None => debug!("read of unknown {:?}", characteristic),
        }
    }

    fn write_characteristic(&mut self, characteristic: &CharacteristicHandle, value: &[u8]) {
        match self.relay(characteristic) {
            Some((p, c)) => p.write_characteristic(&c, value, WriteKind::WithResponse),
            None => {
                self.sink.send(LinkEvent::WriteFailed {
                    characteristic: *characteristic,
                    error: Error::new(ErrorKind::Write, "characteristic is no longer valid"),
                });
            }
        }
    }

    fn read_signal_strength(&mut self, peripheral: PeripheralHandle) {
        if let Some(p) = self.peripheral(peripheral) {
            p.read_rssi();
        }
    }
}

fn translate(event: CentralEvent, shared: &Shared) -> Option<LinkEvent> {
    let handle = |p: &Peripheral| PeripheralHandle::new(from_cb(p.id()));
    Some(match event {
        CentralEvent::ManagerStateChanged { new_state } => {
            if new_state != ManagerState::PoweredOn {
                shared.lock().scanning = false;
            }
            LinkEvent::AdapterStateChanged { new_state: adapter_state(new_state) }
        }
        CentralEvent::PeripheralDiscovered { peripheral, rssi, .. } => {
            let h = handle(&peripheral);
            shared.lock().peripherals.insert(h.id(), peripheral);
            LinkEvent::DeviceDiscovered { peripheral: h, rssi }
        }
        CentralEvent::PeripheralConnected { peripheral } => {
            LinkEvent::Connected { peripheral: handle(&peripheral) }
        }
        CentralEvent::PeripheralConnectFailed { peripheral, error } => {
            LinkEvent::Disconnected {
                peripheral: handle(&peripheral),
                error: Some(error
                    .map(|e| self::error(ErrorKind::Connect, e))
                    .unwrap_or_else(|| Error::new(ErrorKind::Connect, "connection failed"))),
            }
        }
        // Registry cleanup happens in `disconnect()`; a late report may follow a newer discovery.
        CentralEvent::PeripheralDisconnected { peripheral, error } => {
            LinkEvent::Disconnected {
                peripheral: handle(&peripheral),
                error: error.map(|e| self::error(ErrorKind::Connect, e)),
            }
        }
        CentralEvent::ServicesDiscovered { peripheral, services } => {
            let h = handle(&peripheral);
            let registry = shared.lock();
            let discovery = registry.discovery.as_ref()?;
            let services = match services {
                Ok(v) => v,
                Err(e) => return Some(LinkEvent::DiscoveryFailed {
                    peripheral: h,
                    error: self::error(ErrorKind::Discovery, e),
                }),
            };
            match services.iter().find(|s| from_cb(s.id()) == discovery.service) {
                Some(service) => {
                    peripheral.discover_characteristics_with_uuids(
                        service, &[to_cb(discovery.characteristic)]);
                    return None;
                }
                None => LinkEvent::DiscoveryFailed {
                    peripheral: h,
                    error: Error::new(ErrorKind::Discovery,
                        format!("service {} not found", discovery.service)),
                },
            }
        }
        CentralEvent::CharacteristicsDiscovered { peripheral, characteristics, .. } => {
            let h = handle(&peripheral);
            let mut registry = shared.lock();
            let wanted = registry.discovery.as_ref()?.characteristic;
            let characteristics = match characteristics {
                Ok(v) => v,
                Err(e) => return Some(LinkEvent::DiscoveryFailed {
                    peripheral: h,
                    error: self::error(ErrorKind::Discovery, e),
                }),
            };
            match characteristics.into_iter().find(|c| from_cb(c.id()) == wanted) {
                Some(characteristic) => {
                    registry.connections += 1;
                    let relay = Relay {
                        handle: CharacteristicHandle::new(h, wanted, registry.connections),
                        characteristic,
                    };
                    let event = LinkEvent::ServicesReady { characteristic: relay.handle };
                    registry.relay = Some(relay);
                    event
                }
                None => LinkEvent::DiscoveryFailed {
                    peripheral: h,
                    error: Error::new(ErrorKind::Discovery,
                        format!("characteristic {} not found", wanted)),
                },
            }
        }
        CentralEvent::CharacteristicValue { peripheral, characteristic, value } => {
            let h = handle(&peripheral);
            let registry = shared.lock();
            let relay = registry.relay.as_ref()
                .filter(|r| r.handle.peripheral() == h && from_cb(characteristic.id()) == r.handle.id())?;
            LinkEvent::CharacteristicValueUpdated {
                characteristic: relay.handle,
                value: value.map_err(|e| self::error(ErrorKind::Read, e)),
            }
        }
        CentralEvent::ReadRssiResult { peripheral, rssi } => {
            LinkEvent::SignalRead {
                peripheral: handle(&peripheral),
                rssi: rssi.map_err(|e| self::error(ErrorKind::SignalStrength, e)),
            }
        }
        CentralEvent::WriteCharacteristicResult { peripheral, characteristic, result } => {
            let e = result.err()?;
            let h = handle(&peripheral);
            let registry = shared.lock();
            let relay = registry.relay.as_ref()
                .filter(|r| r.handle.peripheral() == h && from_cb(characteristic.id()) == r.handle.id())?;
            LinkEvent::WriteFailed {
                characteristic: relay.handle,
                error: self::error(ErrorKind::Write, e),
            }
        }
        _ => return None,
    })
}
