//! Cancelable scheduled tasks.
//!
//! The state machine arms a timer when it enters the state that needs it and cancels it when it
//! leaves. Each arming gets a fresh [`TimerId`](struct.TimerId.html); a firing is only acted upon
//! if its id is the one the machine currently holds, so a callback that races a cancellation is
//! discarded instead of mutating a later state.

use log::*;
use static_assertions::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::control::Event;
use crate::sync::Sender;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TimerKind {
    /// Repeating RSSI poll, armed while `Ready`.
    SignalPoll,

    /// One-shot background grace deadline, armed while `BackgroundPending`.
    BackgroundGrace,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TimerId {
    kind: TimerKind,
    serial: u64,
}

assert_impl_all!(TimerId: Send, Sync);

impl TimerId {
    pub fn new(kind: TimerKind, serial: u64) -> Self {
        Self {
            kind,
            serial,
        }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Schedule {
    Once(Duration),
    Every(Duration),
}

impl Schedule {
    pub fn period(&self) -> Duration {
        match *self {
            Self::Once(d) | Self::Every(d) => d,
        }
    }

    pub fn is_repeating(&self) -> bool {
        matches!(self, Self::Every(_))
    }
}

/// Delivers `Event::TimerFired(id)` into the controller queue according to `schedule`.
pub trait Scheduler {
    fn schedule(&mut self, id: TimerId, schedule: Schedule);

    /// Stops further firings of `id`. A firing already queued may still arrive.
    fn cancel(&mut self, id: TimerId);
}

/// Scheduler backed by one sleeping thread per armed timer.
pub struct ThreadScheduler {
    sender: Sender<Event>,
    active: HashMap<TimerId, Arc<AtomicBool>>,
}

assert_impl_all!(ThreadScheduler: Send);

impl ThreadScheduler {
    pub(in crate) fn new(sender: Sender<Event>) -> Self {
        Self {
            sender,
            active: HashMap::new(),
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&mut self, id: TimerId, schedule: Schedule) {
        let cancelled = Arc::new(AtomicBool::new(false));
        if let Some(prev) = self.active.insert(id, cancelled.clone()) {
            prev.store(true, Ordering::SeqCst);
        }
        let sender = self.sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("timer-{:?}-{}", id.kind, id.serial))
            .spawn(move || loop {
                thread::sleep(schedule.period());
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }
                if sender.send(Event::TimerFired(id)).is_err() || !schedule.is_repeating() {
                    break;
                }
            });
        if let Err(e) = spawned {
            error!("couldn't spawn timer thread for {:?}: {}", id, e);
            self.active.remove(&id);
        }
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(cancelled) = self.active.remove(&id) {
            cancelled.store(true, Ordering::SeqCst);
        }
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        for (_, cancelled) in self.active.drain() {
            cancelled.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sync;

    #[test]
    fn one_shot_fires_once() {
        let (tx, rx) = sync::channel();
        let mut s = ThreadScheduler::new(tx);
        let id = TimerId::new(TimerKind::BackgroundGrace, 1);
        s.schedule(id, Schedule::Once(Duration::from_millis(10)));

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Event::TimerFired(fired) => assert_eq!(fired, id),
            e => panic!("unexpected event {:?}", e),
        }
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn cancel_stops_repeating_timer() {
        let (tx, rx) = sync::channel();
        let mut s = ThreadScheduler::new(tx);
        let id = TimerId::new(TimerKind::SignalPoll, 7);
        s.schedule(id, Schedule::Every(Duration::from_millis(10)));

        for _ in 0..2 {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                Event::TimerFired(fired) => assert_eq!(fired, id),
                e => panic!("unexpected event {:?}", e),
            }
        }
        s.cancel(id);

        // Firings already queued or in flight are allowed; nothing after that.
        thread::sleep(Duration::from_millis(50));
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
