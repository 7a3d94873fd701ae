use std::future::Future;
use std::io;
use std::mem;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::range::ByteRange;
use crate::stream::{Source, IO_BUFFER_SIZE};

type OpenFuture = Pin<Box<dyn Future<Output = io::Result<File>> + Send>>;

/// Reads the inclusive range `start..=end` of a file.
///
/// The file is not opened until the first poll, and is closed as soon as the
/// range has been read, an error occurs, or the segment is released.
/// Implements [`Source`] and [`Stream`].
pub struct FileSegment {
    state: SegmentState,
    length: u64,
}

enum SegmentState {
    Open { path: PathBuf, start: u64 },
    Opening { open: OpenFuture, start: u64 },
    Seek { file: File, start: u64 },
    Seeking { file: File },
    Reading { file: File, buffer: BytesMut, remaining: u64 },
    Closed,
}

impl FileSegment {
    pub fn new(path: impl Into<PathBuf>, range: ByteRange) -> Self {
        FileSegment {
            state: SegmentState::Open { path: path.into(), start: range.start },
            length: range.len(),
        }
    }

    /// A segment covering a whole file of `size` bytes.
    pub fn whole(path: impl Into<PathBuf>, size: u64) -> Self {
        match size.checked_sub(1) {
            Some(last) => FileSegment::new(path, ByteRange::new(0, last)),
            None => FileSegment { state: SegmentState::Closed, length: 0 },
        }
    }

    fn close(&mut self) {
        // dropping the file handle closes it
        self.state = SegmentState::Closed;
    }

    fn poll_segment(&mut self, cx: &mut Context<'_>, limit: usize) -> Poll<Option<io::Result<Bytes>>> {
        loop {
            match &mut self.state {
                SegmentState::Closed => return Poll::Ready(None),

                SegmentState::Open { path, start } => {
                    let path = mem::take(path);
                    let start = *start;
                    let open: OpenFuture = Box::pin(File::open(path));
                    self.state = SegmentState::Opening { open, start };
                }

                SegmentState::Opening { open, start } => match open.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => {
                        self.close();
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Ready(Ok(file)) => {
                        let start = *start;
                        self.state = SegmentState::Seek { file, start };
                    }
                },

                SegmentState::Seek { file, start } => {
                    if let Err(e) = Pin::new(&mut *file).start_seek(io::SeekFrom::Start(*start)) {
                        self.close();
                        return Poll::Ready(Some(Err(e)));
                    }
                    if let SegmentState::Seek { file, .. } = mem::replace(&mut self.state, SegmentState::Closed) {
                        self.state = SegmentState::Seeking { file };
                    }
                }

                SegmentState::Seeking { file } => match Pin::new(&mut *file).poll_complete(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => {
                        self.close();
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Ready(Ok(_)) => {
                        if let SegmentState::Seeking { file } = mem::replace(&mut self.state, SegmentState::Closed) {
                            let buffer = allocate_buffer();
                            let remaining = self.length;
                            self.state = SegmentState::Reading { file, buffer, remaining };
                        }
                    }
                },

                SegmentState::Reading { file, buffer, remaining } => {
                    if *remaining == 0 {
                        self.close();
                        return Poll::Ready(None);
                    }

                    let uninit = buffer.spare_capacity_mut();

                    // read no more than the caller asked for, the buffer
                    // holds, or the range has left
                    let nbytes = uninit
                        .len()
                        .min(limit)
                        .min(usize::try_from(*remaining).unwrap_or(usize::MAX));

                    let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

                    match Pin::new(&mut *file).poll_read(cx, &mut read_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            self.close();
                            return Poll::Ready(Some(Err(e)));
                        }
                        Poll::Ready(Ok(())) => match read_buf.filled().len() {
                            0 => {
                                // the file shrank underneath us
                                let missing = *remaining;
                                self.close();
                                return Poll::Ready(Some(Err(io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    format!("file ended {missing} bytes before the end of the range"),
                                ))));
                            }
                            n => {
                                // SAFETY: poll_read has filled the buffer with `n`
                                // additional bytes. `buffer.len` should always be
                                // 0 here, but include it for rigorous correctness
                                unsafe { buffer.set_len(buffer.len() + n); }

                                let chunk = mem::replace(buffer, allocate_buffer());

                                // n <= remaining due to the min above
                                *remaining -= n as u64;

                                return Poll::Ready(Some(Ok(chunk.freeze())));
                            }
                        },
                    }
                }
            }
        }
    }
}

impl Source for FileSegment {
    fn poll_chunk(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        limit: usize,
    ) -> Poll<Option<io::Result<Bytes>>> {
        self.get_mut().poll_segment(cx, limit.max(1))
    }

    fn release(self: Pin<&mut Self>) {
        self.get_mut().close();
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.length)
    }
}

impl Stream for FileSegment {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        self.get_mut().poll_segment(cx, IO_BUFFER_SIZE)
    }
}

fn allocate_buffer() -> BytesMut {
    BytesMut::with_capacity(IO_BUFFER_SIZE)
}
