//! The controller: one queue, one thread, one state machine.
//!
//! Link callbacks, timer firings, lifecycle signals and UI commands are all funneled into a single
//! channel and handled strictly in arrival order, so the state machine never needs a lock.

use log::*;
use static_assertions::*;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::control::{Config, Event, Flow, Machine};
use crate::error::{Error, ErrorKind};
use crate::link::{EventSink, LinkEvent, PeripheralLink};
use crate::presentation::{Presenter, Status, StatusBoard};
use crate::sync::{self, Receiver, Sender};
use crate::timer::{Scheduler, ThreadScheduler};
use crate::uuid::Uuid;

pub struct ControllerBuilder {
    config: Config,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn service(&mut self, v: Uuid) -> &mut Self {
        self.config.service = v;
        self
    }

    pub fn characteristic(&mut self, v: Uuid) -> &mut Self {
        self.config.characteristic = v;
        self
    }

    pub fn poll_interval(&mut self, v: Duration) -> &mut Self {
        self.config.poll_interval = v;
        self
    }

    pub fn grace_period(&mut self, v: Duration) -> &mut Self {
        self.config.grace_period = v;
        self
    }

    pub fn verify_failed_writes(&mut self, v: bool) -> &mut Self {
        self.config.verify_failed_writes = v;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts the event loop. `new_link` receives the sink the link must post its events to.
    pub fn build<L, F>(&self, new_link: F) -> Result<Controller, Error>
    where
        L: PeripheralLink + 'static,
        F: FnOnce(EventSink) -> L + Send + 'static,
    {
        Controller::build(self.config.clone(), new_link)
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

assert_impl_all!(ControllerBuilder: Send, Sync);

/// Handle to a running controller. Dropping it shuts the controller down.
pub struct Controller {
    sender: Sender<Event>,
    board: StatusBoard,
    thread: Option<JoinHandle<()>>,
}

assert_impl_all!(Controller: Send);

impl Controller {
    fn build<L, F>(config: Config, new_link: F) -> Result<Self, Error>
    where
        L: PeripheralLink + 'static,
        F: FnOnce(EventSink) -> L + Send + 'static,
    {
        let (sender, receiver) = sync::channel();
        let board = StatusBoard::new();

        let loop_sender = sender.clone();
        let loop_board = board.clone();
        // The link is created on the loop thread so it needn't be `Send`.
        let thread = thread::Builder::new()
            .name("van-control".into())
            .spawn(move || {
                let link = new_link(EventSink::new(loop_sender.clone()));
                let scheduler = ThreadScheduler::new(loop_sender);
                let machine = Machine::new(config, link, scheduler, loop_board);
                run(machine, receiver);
            })
            .map_err(|e| Error::new(ErrorKind::Other, e.to_string()))?;

        Ok(Self {
            sender,
            board,
            thread: Some(thread),
        })
    }

    /// Explicitly starts scanning. Scanning also starts by itself once the adapter reports
    /// powered on.
    pub fn start(&self) -> Result<(), Error> {
        self.send(Event::Start)
    }

    pub fn entered_background(&self) -> Result<(), Error> {
        self.send(Event::EnteredBackground)
    }

    pub fn entered_foreground(&self) -> Result<(), Error> {
        self.send(Event::EnteredForeground)
    }

    /// Sink for links created outside of `ControllerBuilder::build`, or for injecting events.
    pub fn sink(&self) -> EventSink {
        EventSink::new(self.sender.clone())
    }

    pub fn inject(&self, event: LinkEvent) -> Result<(), Error> {
        self.send(Event::Link(event))
    }

    pub fn presenter(&self) -> Presenter {
        Presenter::new(self.board.clone(), self.sender.clone())
    }

    pub fn status(&self) -> Status {
        self.board.status()
    }

    pub fn subscribe(&self) -> Receiver<Status> {
        self.board.subscribe()
    }

    /// Tears down the connection and waits for the event loop to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, event: Event) -> Result<(), Error> {
        self.sender.send(event).map_err(|_| Error::closed())
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.sender.send(Event::Shutdown);
            if thread.join().is_err() {
                error!("controller event loop panicked");
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<L: PeripheralLink, S: Scheduler>(mut machine: Machine<L, S>, receiver: Receiver<Event>) {
    debug!("controller event loop started");
    for event in receiver.iter() {
        if machine.handle(event) == Flow::Stop {
            break;
        }
    }
    debug!("controller event loop stopped");
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::AdapterState;
    use crate::control::ConnectionState;
    use crate::link::{CharacteristicHandle, PeripheralHandle};
    use std::sync::{Arc, Mutex};

    const BOARD: PeripheralHandle = PeripheralHandle::new(Uuid::from_u128(0xe532));

    /// In-process stand-in for the relay board: answers every command immediately through the
    /// sink, like a peripheral that is always in range.
    struct SimulatedBoard {
        sink: EventSink,
        relay: Arc<Mutex<Vec<u8>>>,
        connections: u64,
        scanning: bool,
    }

    impl PeripheralLink for SimulatedBoard {
        fn start_scan(&mut self, _service: Uuid) {
            if !self.scanning {
                self.scanning = true;
                self.sink.send(LinkEvent::DeviceDiscovered { peripheral: BOARD, rssi: -48 });
            }
        }

        fn stop_scan(&mut self) {
            self.scanning = false;
        }

        fn connect(&mut self, peripheral: PeripheralHandle) {
            self.sink.send(LinkEvent::Connected { peripheral });
        }

        fn disconnect(&mut self, peripheral: PeripheralHandle) {
            self.sink.send(LinkEvent::Disconnected { peripheral, error: None });
        }

        fn discover(&mut self, peripheral: PeripheralHandle, _service: Uuid, characteristic: Uuid) {
            self.connections += 1;
            self.sink.send(LinkEvent::ServicesReady {
                characteristic: CharacteristicHandle::new(peripheral, characteristic, self.connections),
            });
        }

        fn read_characteristic(&mut self, characteristic: &CharacteristicHandle) {
            let value = self.relay.lock().unwrap().clone();
            self.sink.send(LinkEvent::CharacteristicValueUpdated {
                characteristic: *characteristic,
                value: Ok(value),
            });
        }

        fn write_characteristic(&mut self, _characteristic: &CharacteristicHandle, value: &[u8]) {
            *self.relay.lock().unwrap() = value.to_vec();
        }

        fn read_signal_strength(&mut self, peripheral: PeripheralHandle) {
            self.sink.send(LinkEvent::SignalRead { peripheral, rssi: Ok(-52) });
        }
    }

    fn wait_for(rx: &Receiver<Status>, pred: impl Fn(&Status) -> bool) -> Status {
        loop {
            let status = rx.recv_timeout(Duration::from_secs(5)).expect("status not reached");
            if pred(&status) {
                return status;
            }
        }
    }

    fn controller(relay: Arc<Mutex<Vec<u8>>>) -> Controller {
        ControllerBuilder::new()
            .poll_interval(Duration::from_millis(20))
            .grace_period(Duration::from_millis(100))
            .build(move |sink| SimulatedBoard {
                sink,
                relay,
                connections: 0,
                scanning: false,
            })
            .unwrap()
    }

    #[test]
    fn connects_and_toggles_relay() {
        let relay = Arc::new(Mutex::new(b"true".to_vec()));
        let c = controller(relay.clone());
        let rx = c.subscribe();
        c.inject(LinkEvent::AdapterStateChanged { new_state: AdapterState::PoweredOn }).unwrap();

        let status = wait_for(&rx, |s| s.is_connected() && s.relay);
        assert_eq!(status.state, ConnectionState::Ready);
        wait_for(&rx, |s| s.signal == Some(-52));

        let presenter = c.presenter();
        presenter.request_relay_change(false);
        wait_for(&rx, |s| !s.relay);
        c.shutdown();
        assert_eq!(&*relay.lock().unwrap(), b"false");
    }

    #[test]
    fn background_timeout_reconnects() {
        let relay = Arc::new(Mutex::new(b"false".to_vec()));
        let c = controller(relay);
        let rx = c.subscribe();
        c.start().unwrap();
        wait_for(&rx, |s| s.is_connected());

        c.entered_background().unwrap();
        wait_for(&rx, |s| s.state == ConnectionState::BackgroundPending);
        // Grace expiry drops the link; the simulated board is still advertising, so the
        // controller reconnects and, still in background, waits out another grace period.
        wait_for(&rx, |s| s.state == ConnectionState::Scanning);
        wait_for(&rx, |s| s.state == ConnectionState::BackgroundPending);

        c.entered_foreground().unwrap();
        wait_for(&rx, |s| s.is_connected());
    }

    #[test]
    fn commands_fail_after_shutdown_of_loop() {
        let c = controller(Arc::new(Mutex::new(Vec::new())));
        let sink = c.sink();
        let presenter = c.presenter();
        c.shutdown();
        assert!(!sink.send(LinkEvent::Connected { peripheral: BOARD }));
        presenter.request_relay_change(true);
        assert!(!presenter.is_connected());
    }
}
