//! Read-only projection of controller state for a UI layer.
//!
//! The UI renders [`Status`](struct.Status.html) snapshots and sends back exactly one command,
//! [`Presenter::request_relay_change`](struct.Presenter.html#method.request_relay_change).
//! Everything visual, including mapping [`SignalLevel`](enum.SignalLevel.html) to colors, stays in
//! the UI.

use log::*;
use static_assertions::*;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::control::{ConnectionState, Event};
use crate::sync::{self, Receiver, Sender};

/// Snapshot of everything the UI may show.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Status {
    pub state: ConnectionState,
    pub relay: bool,
    pub signal: Option<i32>,
}

assert_impl_all!(Status: Send, Sync);

impl Status {
    pub(in crate) const fn initial() -> Self {
        Self {
            state: ConnectionState::Idle,
            relay: false,
            signal: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn signal_level(&self) -> SignalLevel {
        SignalLevel::from_rssi(self.signal)
    }
}

/// Four-bar signal indicator bucket.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SignalLevel {
    /// No sample, or a sample outside -100..=0 dBm.
    NoSignal,
    VeryWeak,
    Weak,
    Fair,
    Strong,
}

impl SignalLevel {
    pub fn from_rssi(rssi: Option<i32>) -> Self {
        match rssi {
            Some(-100..=-80) => Self::VeryWeak,
            Some(-79..=-61) => Self::Weak,
            Some(-60..=-41) => Self::Fair,
            Some(-40..=0) => Self::Strong,
            _ => Self::NoSignal,
        }
    }

    /// Number of lit bars, 0 to 4.
    pub fn bars(&self) -> u8 {
        *self as u8
    }
}

struct Board {
    status: Status,
    subscribers: Vec<Sender<Status>>,
}

/// Latest published status plus the subscribers interested in changes.
#[derive(Clone)]
pub struct StatusBoard(Arc<Mutex<Board>>);

assert_impl_all!(StatusBoard: Send, Sync);

impl StatusBoard {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Board {
            status: Status::initial(),
            subscribers: Vec::new(),
        })))
    }

    fn lock(&self) -> MutexGuard<Board> {
        // A panicking subscriber can't leave the board half-updated.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> Status {
        self.lock().status
    }

    /// Stores `status` and notifies subscribers if it differs from the previous one.
    pub(in crate) fn publish(&self, status: Status) {
        let mut board = self.lock();
        if board.status == status {
            return;
        }
        trace!("publishing {:?}", status);
        board.status = status;
        board.subscribers.retain(|s| s.send(status).is_ok());
    }

    /// Returns a receiver getting the current status immediately and every change after it.
    pub fn subscribe(&self) -> Receiver<Status> {
        let (tx, rx) = sync::channel();
        let mut board = self.lock();
        if tx.send(board.status).is_ok() {
            board.subscribers.push(tx);
        }
        rx
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// The seam between the controller and a UI.
#[derive(Clone)]
pub struct Presenter {
    board: StatusBoard,
    commands: Sender<Event>,
}

assert_impl_all!(Presenter: Send);

impl Presenter {
    pub(in crate) fn new(board: StatusBoard, commands: Sender<Event>) -> Self {
        Self {
            board,
            commands,
        }
    }

    pub fn status(&self) -> Status {
        self.board.status()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn relay_state(&self) -> bool {
        self.status().relay
    }

    pub fn signal_sample(&self) -> Option<i32> {
        self.status().signal
    }

    pub fn subscribe(&self) -> Receiver<Status> {
        self.board.subscribe()
    }

    /// Asks for the relay to be switched. Dropped silently unless connected.
    pub fn request_relay_change(&self, on: bool) {
        if !self.is_connected() {
            debug!("not connected, dropping relay change to {}", on);
            return;
        }
        if self.commands.send(Event::RequestRelayChange(on)).is_err() {
            debug!("controller stopped, dropping relay change to {}", on);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ready(relay: bool, signal: Option<i32>) -> Status {
        Status {
            state: ConnectionState::Ready,
            relay,
            signal,
        }
    }

    #[test]
    fn signal_levels() {
        let data = &[
            (None, SignalLevel::NoSignal, 0),
            (Some(-101), SignalLevel::NoSignal, 0),
            (Some(-100), SignalLevel::VeryWeak, 1),
            (Some(-80), SignalLevel::VeryWeak, 1),
            (Some(-79), SignalLevel::Weak, 2),
            (Some(-61), SignalLevel::Weak, 2),
            (Some(-60), SignalLevel::Fair, 3),
            (Some(-41), SignalLevel::Fair, 3),
            (Some(-40), SignalLevel::Strong, 4),
            (Some(0), SignalLevel::Strong, 4),
            (Some(1), SignalLevel::NoSignal, 0),
        ];
        for &(rssi, level, bars) in data {
            assert_eq!(SignalLevel::from_rssi(rssi), level, "{:?}", rssi);
            assert_eq!(level.bars(), bars);
        }
    }

    #[test]
    fn connected_only_when_ready() {
        assert!(ready(false, None).is_connected());
        for &state in &[
            ConnectionState::Idle,
            ConnectionState::Scanning,
            ConnectionState::Connecting,
            ConnectionState::Discovering,
            ConnectionState::BackgroundPending,
            ConnectionState::Disconnected,
        ] {
            let status = Status { state, ..Status::initial() };
            assert!(!status.is_connected(), "{:?}", state);
        }
    }

    #[test]
    fn subscribers_see_current_then_changes() {
        let board = StatusBoard::new();
        let rx = board.subscribe();
        assert_eq!(rx.try_recv().unwrap(), Status::initial());

        board.publish(ready(true, None));
        board.publish(ready(true, None));
        board.publish(ready(true, Some(-50)));

        assert_eq!(rx.try_recv().unwrap(), ready(true, None));
        assert_eq!(rx.try_recv().unwrap(), ready(true, Some(-50)));
        assert!(rx.try_recv().is_err());
        assert_eq!(board.status(), ready(true, Some(-50)));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let board = StatusBoard::new();
        drop(board.subscribe());
        board.publish(ready(false, None));
        assert!(board.lock().subscribers.is_empty());
    }

    #[test]
    fn relay_request_forwarded_only_when_connected() {
        let board = StatusBoard::new();
        let (tx, rx) = sync::channel();
        let presenter = Presenter::new(board.clone(), tx);

        presenter.request_relay_change(true);
        assert!(rx.try_recv().is_err());

        board.publish(ready(false, Some(-70)));
        assert!(presenter.is_connected());
        assert_eq!(presenter.signal_sample(), Some(-70));
        presenter.request_relay_change(true);
        match rx.try_recv().unwrap() {
            Event::RequestRelayChange(on) => assert!(on),
            e => panic!("unexpected event {:?}", e),
        }
    }
}
