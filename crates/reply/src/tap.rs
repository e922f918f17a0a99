//! Observation of the raw payload on its way to the connection.

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// Sees every payload chunk before any compression, then a finish notification once
/// the payload ended. A payload that fails or gets aborted never finishes.
pub trait Observer: Send {
    fn peek(&mut self, chunk: &Bytes);

    fn finish(&mut self) {}
}

impl<F> Observer for F
where
    F: FnMut(&Bytes) + Send,
{
    fn peek(&mut self, chunk: &Bytes) {
        self(chunk);
    }
}

pin_project! {
    pub(crate) struct Tapped<B> {
        #[pin]
        inner: B,
        observer: Option<Box<dyn Observer>>,
    }
}

impl<B> Tapped<B> {
    pub(crate) fn new(inner: B, observer: Option<Box<dyn Observer>>) -> Self {
        Self { inner, observer }
    }
}

impl<B> Body for Tapped<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let frame = ready!(this.inner.poll_frame(cx));

        if let Some(observer) = this.observer.as_mut() {
            match &frame {
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        observer.peek(data);
                    }
                }
                Some(Err(_)) => {}
                None => {
                    observer.finish();
                    *this.observer = None;
                }
            }
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
