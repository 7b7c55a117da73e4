use std::sync::mpsc;

// Unbounded: links and timers post from their own threads and a link may post while the
// loop is still inside the call that triggered it.
pub type Sender<T> = mpsc::Sender<T>;
pub type Receiver<T> = mpsc::Receiver<T>;

pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    mpsc::channel()
}
