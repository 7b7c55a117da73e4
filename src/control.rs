//! The connection state machine.
//!
//! [`Machine::handle`](struct.Machine.html#method.handle) is the single transition function. It is
//! fed every link event, timer firing, lifecycle signal and UI command in arrival order, drives
//! the [`PeripheralLink`](../link/trait.PeripheralLink.html) in response, and publishes a
//! [`Status`](../presentation/struct.Status.html) snapshot after each event.
//!
//! ```text
//!   Idle ──power on / Start──> Scanning ──discovered──> Connecting ──connected──> Discovering
//!                                 ^                                                   │
//!                                 │ disconnected / discovery failed / grace expired   │ services ready
//!                                 │                                                   v
//!                                 └──────────── BackgroundPending <──background── Ready
//!                                                              ──foreground──>
//! ```


use log::*;
use static_assertions::*;
use std::time::Duration;

use crate::{AdapterState, RELAY_CHARACTERISTIC_UUID, SERVICE_UUID};
use crate::link::*;
use crate::presentation::{Status, StatusBoard};
use crate::relay;
use crate::timer::*;
use crate::uuid::Uuid;

/// RSSI polling cadence while connected in the foreground.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// How long a connection survives the host being in the background.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Controller settings. The defaults target the relay board.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Service UUID used to filter advertisements and to find the relay characteristic.
    pub service: Uuid,

    /// The relay characteristic within `service`.
    pub characteristic: Uuid,

    /// RSSI polling cadence while `Ready`.
    pub poll_interval: Duration,

    /// How long the link is kept while the host is in the background.
    pub grace_period: Duration,

    /// Issue a read after a failed write so the relay state is corrected right away instead of on
    /// the next read.
    pub verify_failed_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: SERVICE_UUID,
            characteristic: RELAY_CHARACTERISTIC_UUID,
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            verify_failed_writes: false,
        }
    }
}

/// Where the controller is in the scan / connect / discover cycle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectionState {
    /// Not started, or torn down.
    Idle,

    /// Looking for a peripheral advertising the relay service.
    Scanning,

    /// Connection to the discovered peripheral requested.
    Connecting,

    /// Connected, looking up the relay characteristic.
    Discovering,

    /// Relay characteristic usable, signal strength polled.
    Ready,

    /// Connected, host in background, grace deadline armed.
    BackgroundPending,

    /// Waiting for the adapter to be powered on again.
    Disconnected,
}

impl ConnectionState {
    /// States holding a peripheral handle.
    fn has_peripheral(self) -> bool {
        match self {
            Self::Connecting | Self::Discovering | Self::Ready | Self::BackgroundPending => true,
            Self::Idle | Self::Scanning | Self::Disconnected => false,
        }
    }
}

/// Input to [`Machine::handle`](struct.Machine.html#method.handle).
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// Explicit start; scanning otherwise begins when the adapter reports powered on.
    Start,

    /// Report from the transport.
    Link(LinkEvent),

    /// The host application moved to the background.
    EnteredBackground,

    /// The host application returned to the foreground.
    EnteredForeground,

    /// Switch the relay on or off. Dropped unless `Ready`.
    RequestRelayChange(bool),

    TimerFired(TimerId),

    /// Process teardown.
    Shutdown,
}

assert_impl_all!(Event: Send);

impl From<LinkEvent> for Event {
    fn from(v: LinkEvent) -> Self {
        Self::Link(v)
    }
}

/// Whether the event loop should keep running after an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Stop,
}

/// The connection state machine over a link `L` and a timer scheduler `S`.
pub struct Machine<L, S> {
    config: Config,
    link: L,
    scheduler: S,
    board: StatusBoard,

    state: ConnectionState,
    adapter: AdapterState,
    background: bool,
    peripheral: Option<PeripheralHandle>,
    characteristic: Option<CharacteristicHandle>,
    /// Peripheral disconnected by us whose platform disconnect report hasn't arrived yet.
    cancelled: Option<PeripheralHandle>,
    relay: bool,
    signal: Option<i32>,

    poll_timer: Option<TimerId>,
    grace_timer: Option<TimerId>,
    timer_serial: u64,
}

impl<L: PeripheralLink, S: Scheduler> Machine<L, S> {
    pub fn new(config: Config, link: L, scheduler: S, board: StatusBoard) -> Self {
        Self {
            config,
            link,
            scheduler,
            board,
            state: ConnectionState::Idle,
            adapter: AdapterState::Unknown,
            background: false,
            peripheral: None,
            characteristic: None,
            cancelled: None,
            relay: false,
            signal: None,
            poll_timer: None,
            grace_timer: None,
            timer_serial: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.state,
            relay: self.relay,
            signal: self.signal,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Applies one event, then publishes the resulting status. Returns `Flow::Stop` after
    /// `Event::Shutdown`.
    pub fn handle(&mut self, event: Event) -> Flow {
        trace!("{:?} <- {:?}", self.state, event);
        let mut flow = Flow::Continue;
        match event {
            Event::Start => self.start(),
            Event::Link(e) => self.handle_link_event(e),
            Event::EnteredBackground => self.entered_background(),
            Event::EnteredForeground => self.entered_foreground(),
            Event::RequestRelayChange(on) => self.request_relay_change(on),
            Event::TimerFired(id) => self.timer_fired(id),
            Event::Shutdown => {
                self.teardown();
                flow = Flow::Stop;
            }
        }
        self.board.publish(self.status());
        flow
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::AdapterStateChanged { new_state } => self.adapter_changed(new_state),
            LinkEvent::DeviceDiscovered { peripheral, rssi } => {
                if self.state != ConnectionState::Scanning {
                    debug!("ignoring discovery of {:?} while {:?}", peripheral, self.state);
                    return;
                }
                info!("connecting to {} ({} dBm)", peripheral.id(), rssi);
                self.link.stop_scan();
                self.peripheral = Some(peripheral);
                self.enter(ConnectionState::Connecting);
                self.link.connect(peripheral);
            }
            LinkEvent::Connected { peripheral } => {
                if self.state != ConnectionState::Connecting || !self.is_current(peripheral) {
                    debug!("ignoring connection of {:?} while {:?}", peripheral, self.state);
                    return;
                }
                info!("connected to {}", peripheral.id());
                self.enter(ConnectionState::Discovering);
                self.link.discover(peripheral, self.config.service, self.config.characteristic);
            }
            LinkEvent::Disconnected { peripheral, error } => {
                if self.cancelled == Some(peripheral) {
                    debug!("{:?} reported the link we cancelled", peripheral);
                    self.cancelled = None;
                    return;
                }
                if !self.state.has_peripheral() || !self.is_current(peripheral) {
                    debug!("ignoring stale disconnect of {:?} while {:?}", peripheral, self.state);
                    return;
                }
                match error {
                    Some(e) => warn!("lost {} while {:?}: {}", peripheral.id(), self.state, e),
                    None => info!("{} disconnected while {:?}", peripheral.id(), self.state),
                }
                self.link_lost();
            }
            LinkEvent::ServicesReady { characteristic } => {
                if self.state != ConnectionState::Discovering
                    || !self.is_current(characteristic.peripheral())
                {
                    debug!("ignoring {:?} while {:?}", characteristic, self.state);
                    return;
                }
                info!("relay characteristic ready on {} (connection {})",
                    characteristic.peripheral().id(), characteristic.connection());
                self.characteristic = Some(characteristic);
                self.link.read_characteristic(&characteristic);
                self.enter(if self.background {
                    ConnectionState::BackgroundPending
                } else {
                    ConnectionState::Ready
                });
            }
            LinkEvent::DiscoveryFailed { peripheral, error } => {
                if self.state != ConnectionState::Discovering || !self.is_current(peripheral) {
                    debug!("ignoring discovery failure of {:?} while {:?}", peripheral, self.state);
                    return;
                }
                warn!("{}", error);
                self.cancel_link(peripheral);
                self.link_lost();
            }
            LinkEvent::CharacteristicValueUpdated { characteristic, value } => {
                if self.characteristic != Some(characteristic) {
                    debug!("ignoring value of stale {:?}", characteristic);
                    return;
                }
                match value.as_ref().map(|v| relay::decode(v)) {
                    Ok(Ok(on)) => {
                        debug!("relay is {}", if on { "on" } else { "off" });
                        self.relay = on;
                    }
                    Ok(Err(e)) => debug!("{}, keeping relay {}", e, self.relay),
                    Err(e) => warn!("{}", e),
                }
            }
            LinkEvent::SignalRead { peripheral, rssi } => {
                if self.state != ConnectionState::Ready || !self.is_current(peripheral) {
                    trace!("ignoring RSSI of {:?} while {:?}", peripheral, self.state);
                    return;
                }
                match rssi {
                    Ok(v) => {
                        trace!("RSSI {} dBm", v);
                        self.signal = Some(v);
                    }
                    Err(e) => debug!("{}", e),
                }
            }
            LinkEvent::WriteFailed { characteristic, error } => {
                if self.characteristic != Some(characteristic) {
                    debug!("ignoring write failure on stale {:?}", characteristic);
                    return;
                }
                warn!("{}", error);
                if self.config.verify_failed_writes {
                    self.link.read_characteristic(&characteristic);
                }
            }
        }
    }

    fn start(&mut self) {
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnected => {
                if self.adapter_unavailable() {
                    debug!("adapter is {:?}, deferring scan", self.adapter);
                    return;
                }
                self.begin_scan();
            }
            _ => debug!("already started ({:?})", self.state),
        }
    }

    fn adapter_changed(&mut self, new_state: AdapterState) {
        debug!("adapter {:?} -> {:?}", self.adapter, new_state);
        self.adapter = new_state;
        if new_state == AdapterState::PoweredOn {
            if let ConnectionState::Idle | ConnectionState::Disconnected = self.state {
                self.begin_scan();
            }
        } else if self.state != ConnectionState::Idle {
            warn!("adapter is {:?}", new_state);
            self.cancelled = None;
            self.forget_link();
            self.enter(ConnectionState::Disconnected);
        }
    }

    fn entered_background(&mut self) {
        self.background = true;
        if self.state == ConnectionState::Ready {
            info!("host in background, keeping link for {:?}", self.config.grace_period);
            self.enter(ConnectionState::BackgroundPending);
        }
    }

    fn entered_foreground(&mut self) {
        self.background = false;
        match self.state {
            ConnectionState::BackgroundPending => {
                info!("host in foreground, link kept");
                self.enter(ConnectionState::Ready);
            }
            ConnectionState::Scanning => {
                debug!("host in foreground, not connected, rescanning");
                self.link.start_scan(self.config.service);
            }
            _ => {}
        }
    }

    fn request_relay_change(&mut self, on: bool) {
        let characteristic = match (self.state, self.characteristic) {
            (ConnectionState::Ready, Some(c)) => c,
            _ => {
                debug!("not ready ({:?}), dropping relay change to {}", self.state, on);
                return;
            }
        };
        self.relay = on;
        self.link.write_characteristic(&characteristic, relay::encode(on));
    }

    fn timer_fired(&mut self, id: TimerId) {
        if Some(id) == self.poll_timer {
            if let Some(p) = self.peripheral {
                self.link.read_signal_strength(p);
            }
        } else if Some(id) == self.grace_timer {
            info!("background grace period of {:?} elapsed, disconnecting", self.config.grace_period);
            if let Some(p) = self.peripheral {
                self.cancel_link(p);
            }
            self.link_lost();
        } else {
            trace!("discarding stale {:?}", id);
        }
    }

    fn teardown(&mut self) {
        info!("shutting down from {:?}", self.state);
        if self.state == ConnectionState::Scanning {
            self.link.stop_scan();
        }
        if let Some(p) = self.peripheral {
            self.cancel_link(p);
        }
        self.forget_link();
        self.enter(ConnectionState::Idle);
    }

    fn begin_scan(&mut self) {
        info!("scanning for {}", self.config.service);
        self.enter(ConnectionState::Scanning);
        self.link.start_scan(self.config.service);
    }

    fn cancel_link(&mut self, peripheral: PeripheralHandle) {
        self.cancelled = Some(peripheral);
        self.link.disconnect(peripheral);
    }

    /// The single re-entry path for every connection-layer failure.
    fn link_lost(&mut self) {
        self.forget_link();
        self.begin_scan();
    }

    fn forget_link(&mut self) {
        self.peripheral = None;
        self.characteristic = None;
        self.signal = None;
    }

    fn is_current(&self, peripheral: PeripheralHandle) -> bool {
        self.peripheral == Some(peripheral)
    }

    fn adapter_unavailable(&self) -> bool {
        match self.adapter {
            AdapterState::Unknown | AdapterState::Resetting | AdapterState::PoweredOn => false,
            _ => true,
        }
    }

    /// Switches state, cancelling the timer owned by the old state and arming the one owned by
    /// the new state.
    fn enter(&mut self, next: ConnectionState) {
        if next == self.state {
            return;
        }
        debug!("{:?} -> {:?}", self.state, next);
        match self.state {
            ConnectionState::Ready => {
                self.signal = None;
                if let Some(id) = self.poll_timer.take() {
                    self.scheduler.cancel(id);
                }
            }
            ConnectionState::BackgroundPending => {
                if let Some(id) = self.grace_timer.take() {
                    self.scheduler.cancel(id);
                }
            }
            _ => {}
        }
        self.state = next;
        match next {
            ConnectionState::Ready => {
                let id = self.next_timer(TimerKind::SignalPoll);
                self.scheduler.schedule(id, Schedule::Every(self.config.poll_interval));
                self.poll_timer = Some(id);
            }
            ConnectionState::BackgroundPending => {
                let id = self.next_timer(TimerKind::BackgroundGrace);
                self.scheduler.schedule(id, Schedule::Once(self.config.grace_period));
                self.grace_timer = Some(id);
            }
            _ => {}
        }
    }

    fn next_timer(&mut self, kind: TimerKind) -> TimerId {
        self.timer_serial += 1;
        TimerId::new(kind, self.timer_serial)
    }
}
