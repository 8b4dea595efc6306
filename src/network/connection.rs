// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::{self, ErrorKind};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::network::FrameCodec;
use crate::protocol::Message;
use crate::{AppError, AppResult};

/// The read side of a connection.
///
/// Bytes are accumulated in `buffer` across reads, so `read_frame` can be
/// dropped half way (e.g. by `tokio::select!`) and called again without
/// losing data.
#[derive(Debug)]
pub struct Connection<R> {
    reader: R,
    buffer: BytesMut,
    codec: FrameCodec,
}

impl<R: AsyncRead + Unpin> Connection<R> {
    pub fn new(reader: R, codec: FrameCodec, buffer_size: usize) -> Connection<R> {
        Connection {
            reader,
            buffer: BytesMut::with_capacity(buffer_size),
            codec,
        }
    }

    /// Reads the next complete message from the connection.
    ///
    /// A frame size error or an undecodable body is returned as an error and the
    /// connection should be closed.
    ///
    /// If the peer closes the connection while a frame is being sent, an error is returned.
    /// If the peer closes the connection gracefully, `None` is returned.
    pub async fn read_frame(&mut self) -> AppResult<Option<Message>> {
        loop {
            if let Some(message) = self.codec.parse(&mut self.buffer)? {
                return Ok(Some(message));
            }
            if 0 == self.reader.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    // peer has closed the connection gracefully
                    Ok(None)
                } else {
                    // peer closed the connection while sending a frame
                    Err(
                        io::Error::new(ErrorKind::ConnectionReset, "connection reset by peer")
                            .into(),
                    )
                };
            }
        }
    }
}

///
/// The write side of a connection.
///
/// Messages are encoded into `pending` first and drained by [`write_pending`],
/// which only advances the buffer by what the socket accepted. Dropping it
/// half way (e.g. by `tokio::select!`) loses nothing, a later call resumes at
/// the exact byte it stopped at.
///
/// [`write_pending`]: MessageWriter::write_pending
#[derive(Debug)]
pub struct MessageWriter<W: AsyncWrite + Unpin> {
    writer: W,
    pending: BytesMut,
    codec: FrameCodec,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W, codec: FrameCodec) -> Self {
        MessageWriter {
            writer,
            pending: BytesMut::with_capacity(4 * 1024),
            codec,
        }
    }

    /// Appends one frame to the pending bytes. Nothing is written yet.
    ///
    /// An encode failure leaves the pending bytes untouched, so the frames
    /// queued before are still intact.
    pub fn queue(&mut self, message: &Message) -> AppResult<()> {
        self.codec.encode_message(message, &mut self.pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Writes every pending byte to the socket. Cancel safe.
    pub async fn write_pending(&mut self) -> AppResult<()> {
        while self.pending.has_remaining() {
            let written = self
                .writer
                .write_buf(&mut self.pending)
                .await
                .map_err(|e| AppError::DetailedIoError(format!("write error: {}", e)))?;
            if written == 0 {
                return Err(io::Error::from(ErrorKind::WriteZero).into());
            }
        }
        self.writer
            .flush()
            .await
            .map_err(|e| AppError::DetailedIoError(format!("flush error: {}", e)))?;
        Ok(())
    }

    /// Queues and writes one message right away.
    pub async fn write_message(&mut self, message: &Message) -> AppResult<()> {
        self.queue(message)?;
        self.write_pending().await
    }

    /// Shuts the socket down, whatever is still pending is abandoned.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.pending.clear();
        self.writer.shutdown().await?;
        Ok(())
    }
}
