//! Callback-to-future utilities.

use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use futures_channel::oneshot;

use crate::error::{Error, Result};
use crate::request::{Callback, FlashRequest};

/// Sender half of a completion pair.
pub struct CompletionSender {
    tx: oneshot::Sender<FlashRequest>,
}

impl CompletionSender {
    /// Wraps the sender as a driver callback.
    pub fn into_callback(self) -> Callback {
        Box::new(move |request| {
            // Receiver may have been dropped
            let _ = self.tx.send(request);
        })
    }
}

/// Receiver half of a completion pair.
///
/// Resolves to the finished request, or [`Error::Cancelled`] if the request
/// was released without completing.
pub struct CompletionReceiver {
    rx: oneshot::Receiver<FlashRequest>,
}

impl CompletionReceiver {
    /// Takes the request if it already completed.
    pub fn try_take(&mut self) -> Option<Result<FlashRequest>> {
        match self.rx.try_recv() {
            Ok(Some(request)) => Some(Ok(request)),
            Ok(None) => None,
            Err(_) => Some(Err(Error::Cancelled)),
        }
    }
}

impl Future for CompletionReceiver {
    type Output = Result<FlashRequest>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(request)) => Poll::Ready(Ok(request)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create a completion sender/receiver pair.
pub fn completion() -> (CompletionSender, CompletionReceiver) {
    let (tx, rx) = oneshot::channel();
    (CompletionSender { tx }, CompletionReceiver { rx })
}

struct NoopWaker;

impl Wake for NoopWaker {
    fn wake(self: Arc<Self>) {}
}

/// Runs `future` to completion, calling `poll_queue` whenever it is pending.
pub fn block_on<F, P>(future: F, mut poll_queue: P) -> F::Output
where
    F: Future,
    P: FnMut(),
{
    let waker = Waker::from(Arc::new(NoopWaker));
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);

    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => return result,
            Poll::Pending => poll_queue(),
        }
    }
}
