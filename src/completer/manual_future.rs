use std::future::Future;
use std::marker::Unpin;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use log::error;

enum State<T> {
    Incomplete,
    Waiting(Waker),
    Complete(Option<T>),
}

/// A future that is resolved by hand through its [`ManualFutureCompleter`].
///
/// The completer is consumed by `complete`, so a value can be delivered at
/// most once; transports and the hub call registry rely on this to implement
/// their single-fire completion contracts.
pub struct ManualFuture<T: Unpin> {
    state: Arc<Mutex<State<T>>>,
}

impl<T: Unpin> ManualFuture<T> {
    pub fn new() -> (Self, ManualFutureCompleter<T>) {
        let state = Arc::new(Mutex::new(State::Incomplete));

        (Self { state: state.clone() }, ManualFutureCompleter { state })
    }
}

pub struct ManualFutureCompleter<T: Unpin> {
    state: Arc<Mutex<State<T>>>,
}

impl<T: Unpin> ManualFutureCompleter<T> {
    pub fn complete(self, value: T) {
        let mut state = self.state.lock().unwrap();

        match std::mem::replace(&mut *state, State::Complete(Some(value))) {
            State::Incomplete => {}
            State::Waiting(waker) => waker.wake(),
            State::Complete(_) => unreachable!("completer is consumed on completion"),
        }
    }

    /// Abandons the future without a value. The paired future will never
    /// resolve, so this is only used while tearing the owner down.
    pub fn cancel(self) {
        let mut state = self.state.lock().unwrap();
        *state = State::Complete(None);
    }
}

impl<T: Unpin> Future for ManualFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let mut state = self.state.lock().unwrap();

        match &mut *state {
            s @ State::Incomplete => *s = State::Waiting(cx.waker().clone()),
            State::Waiting(waker) if waker.will_wake(cx.waker()) => {}
            s @ State::Waiting(_) => *s = State::Waiting(cx.waker().clone()),
            State::Complete(value) => match value.take() {
                Some(value) => return Poll::Ready(value),
                None => error!("manual future was cancelled or polled after completion"),
            },
        }

        Poll::Pending
    }
}
