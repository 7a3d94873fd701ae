use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, ReadBuf};

pub(crate) const IO_BUFFER_SIZE: usize = 64 * 1024;

/// A pull-based producer of bytes that can be chained in a [`MultiSourceStream`].
pub trait Source: Send {
    /// Produce the next chunk, at most `limit` bytes long.
    ///
    /// `Ready(None)` is the natural end of the source. Implementations must
    /// not return an empty chunk unless `limit` is zero.
    fn poll_chunk(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        limit: usize,
    ) -> Poll<Option<io::Result<Bytes>>>;

    /// Drop any resources held by the source. Must be idempotent.
    fn release(self: Pin<&mut Self>);

    /// Exact number of bytes this source produces, if known up front.
    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// A boxed, owned [`Source`].
pub type BoxSource = Pin<Box<dyn Source>>;

/// In-memory source, used for multipart boundary text.
#[derive(Debug, Clone)]
pub struct BufferSource {
    buffer: Bytes,
    len: u64,
}

impl BufferSource {
    pub fn new(buffer: impl Into<Bytes>) -> Self {
        let buffer = buffer.into();
        let len = buffer.len() as u64;
        BufferSource { buffer, len }
    }
}

impl Source for BufferSource {
    fn poll_chunk(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        limit: usize,
    ) -> Poll<Option<io::Result<Bytes>>> {
        let this = self.get_mut();
        if this.buffer.is_empty() {
            return Poll::Ready(None);
        }
        let n = limit.min(this.buffer.len());
        Poll::Ready(Some(Ok(this.buffer.split_to(n))))
    }

    fn release(self: Pin<&mut Self>) {
        self.get_mut().buffer.clear();
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Ended,
    Faulted,
    Cancelled,
}

enum StreamState {
    /// Waiting to take the next pending source.
    Idle,
    Active { source: BoxSource, delivered: u64 },
    Done(Terminal),
}

/// Concatenates an ordered list of [`Source`]s into one lazily produced byte
/// stream. Implements [`Stream`], [`AsyncRead`], [`Body`], and [`IntoResponse`].
///
/// Only one source is polled at a time and only when the consumer asks for
/// data. Every source is released exactly once: on its natural end, when
/// another source faults, or when the stream is cancelled or dropped.
pub struct MultiSourceStream {
    pending: VecDeque<BoxSource>,
    state: StreamState,
    remaining: Option<u64>,
}

impl MultiSourceStream {
    pub fn new(sources: impl IntoIterator<Item = BoxSource>) -> Self {
        let pending: VecDeque<BoxSource> = sources.into_iter().collect();
        let remaining = pending
            .iter()
            .map(|source| source.byte_len())
            .sum::<Option<u64>>();
        MultiSourceStream { pending, state: StreamState::Idle, remaining }
    }

    /// Abandon the stream, releasing the current and every pending source.
    /// Calling this more than once, or after the stream ended, does nothing.
    pub fn cancel(&mut self) {
        if let StreamState::Done(terminal) = self.state {
            tracing::trace!(?terminal, "stream already finished");
            return;
        }
        tracing::trace!(pending = self.pending.len(), "cancelling multi-source stream");
        self.teardown(Terminal::Cancelled);
    }

    /// True once the stream ended, faulted, or was cancelled.
    pub fn is_terminated(&self) -> bool {
        matches!(self.state, StreamState::Done(_))
    }

    fn teardown(&mut self, terminal: Terminal) {
        if let StreamState::Active { mut source, .. } =
            std::mem::replace(&mut self.state, StreamState::Done(terminal))
        {
            source.as_mut().release();
        }
        for mut source in self.pending.drain(..) {
            source.as_mut().release();
        }
        self.remaining = Some(0);
    }

    fn fault(&mut self, error: io::Error) -> Poll<Option<io::Result<Bytes>>> {
        tracing::warn!(%error, pending = self.pending.len(), "source faulted, aborting stream");
        self.teardown(Terminal::Faulted);
        Poll::Ready(Some(Err(error)))
    }

    /// Pull the next chunk of at most `limit` bytes.
    pub fn poll_chunk(
        &mut self,
        cx: &mut Context<'_>,
        limit: usize,
    ) -> Poll<Option<io::Result<Bytes>>> {
        let limit = limit.max(1);
        loop {
            match &mut self.state {
                StreamState::Done(_) => return Poll::Ready(None),

                StreamState::Idle => match self.pending.pop_front() {
                    Some(source) => {
                        tracing::trace!(pending = self.pending.len(), "advancing to next source");
                        self.state = StreamState::Active { source, delivered: 0 };
                    }
                    None => {
                        self.state = StreamState::Done(Terminal::Ended);
                        return Poll::Ready(None);
                    }
                },

                StreamState::Active { source, delivered } => {
                    match source.as_mut().poll_chunk(cx, limit) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Some(Err(e))) => return self.fault(e),
                        Poll::Ready(Some(Ok(chunk))) => {
                            if chunk.is_empty() {
                                continue;
                            }
                            *delivered += chunk.len() as u64;
                            if let Some(remaining) = self.remaining.as_mut() {
                                *remaining = remaining.saturating_sub(chunk.len() as u64);
                            }
                            return Poll::Ready(Some(Ok(chunk)));
                        }
                        Poll::Ready(None) => {
                            // a source that ends short of its advertised length closed prematurely
                            if let Some(expected) = source.byte_len() {
                                if *delivered < expected {
                                    let error = io::Error::new(
                                        io::ErrorKind::UnexpectedEof,
                                        format!("source closed after {delivered} of {expected} bytes"),
                                    );
                                    return self.fault(error);
                                }
                            }
                            source.as_mut().release();
                            self.state = StreamState::Idle;
                        }
                    }
                }
            }
        }
    }
}

impl Drop for MultiSourceStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Stream for MultiSourceStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        self.get_mut().poll_chunk(cx, IO_BUFFER_SIZE)
    }
}

impl AsyncRead for MultiSourceStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let limit = buf.remaining();
        if limit == 0 {
            return Poll::Ready(Ok(()));
        }
        match self.get_mut().poll_chunk(cx, limit) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(Ok(())),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Err(e)),
            Poll::Ready(Some(Ok(chunk))) => {
                buf.put_slice(&chunk);
                Poll::Ready(Ok(()))
            }
        }
    }
}

impl Body for MultiSourceStream {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        match self.remaining {
            Some(n) => SizeHint::with_exact(n),
            None => SizeHint::default(),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.is_terminated()
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl IntoResponse for MultiSourceStream {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}
