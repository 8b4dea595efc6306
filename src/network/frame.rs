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

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::{BinaryFormat, BodyFormat, Message};
use crate::AppError::Incomplete;
use crate::{AppError, AppResult};

const LENGTH_FIELD_SIZE: usize = 4;

/// Length-prefixed framing: `[u32 big-endian body length][body]`.
///
/// A frame is only handed to the body format once all of its bytes are buffered,
/// partial frames stay in the buffer until the next read.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    format: Arc<dyn BodyFormat>,
    max_frame_length: usize,
}

impl FrameCodec {
    pub fn new(format: Arc<dyn BodyFormat>, max_frame_length: usize) -> Self {
        FrameCodec {
            format,
            max_frame_length,
        }
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Returns the body length of the first frame once it is complete.
    ///
    /// An oversized declared length fails before anything is consumed, so bytes
    /// belonging to following frames are never touched.
    pub fn check(&self, buffer: &mut BytesMut) -> AppResult<usize> {
        if buffer.remaining() < LENGTH_FIELD_SIZE {
            return Err(Incomplete);
        }
        let mut length_field = [0u8; LENGTH_FIELD_SIZE];
        length_field.copy_from_slice(&buffer[..LENGTH_FIELD_SIZE]);
        let body_size = u32::from_be_bytes(length_field) as usize;
        if body_size > self.max_frame_length {
            return Err(AppError::FrameError(format!(
                "Frame of length {} is too large, max is {}.",
                body_size, self.max_frame_length
            )));
        }
        if buffer.remaining() < body_size + LENGTH_FIELD_SIZE {
            buffer.reserve(body_size + LENGTH_FIELD_SIZE - buffer.remaining());
            return Err(Incomplete);
        }
        Ok(body_size)
    }

    pub fn parse(&self, buffer: &mut BytesMut) -> AppResult<Option<Message>> {
        match self.check(buffer) {
            Ok(body_size) => {
                buffer.advance(LENGTH_FIELD_SIZE);
                let body = buffer.split_to(body_size);
                self.format.decode(body).map(Some)
            }
            Err(Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn encode_message(&self, message: &Message, dst: &mut BytesMut) -> AppResult<()> {
        let start = dst.len();
        dst.reserve(LENGTH_FIELD_SIZE);
        dst.put_u32(0);
        if let Err(e) = self.format.encode(message, dst) {
            dst.truncate(start);
            return Err(e);
        }
        let body_size = dst.len() - start - LENGTH_FIELD_SIZE;
        if body_size > self.max_frame_length {
            dst.truncate(start);
            return Err(AppError::FrameError(format!(
                "refuse to send a frame of length {}, max is {}",
                body_size, self.max_frame_length
            )));
        }
        dst[start..start + LENGTH_FIELD_SIZE].copy_from_slice(&(body_size as u32).to_be_bytes());
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(Arc::new(BinaryFormat), 1024 * 1024)
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.parse(src)
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = AppError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_message(&item, dst)
    }
}
