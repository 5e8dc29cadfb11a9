//! Framed codec for client connections.
//!
//! Uses LengthDelimitedCodec for framing and the binary message format inside
//! each frame. Works over any AsyncRead/AsyncWrite (pipes, sockets, etc).

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::protocol::Message;
use crate::error::ProtocolError;
use crate::data::io::{WireReader, WireWriter};
use crate::data::{CodecLimits, ValueCodec};

/// Frames messages with a 4-byte length prefix.
pub struct MessageCodec {
    inner: LengthDelimitedCodec,
    values: ValueCodec,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(CodecLimits::default())
    }
}

impl MessageCodec {
    pub fn new(limits: CodecLimits) -> Self {
        Self {
            inner: framing(),
            values: ValueCodec::new(limits),
        }
    }

    /// Decodes one message from a complete frame payload.
    ///
    /// A bad payload fails this call only; the framing stays in sync.
    pub fn decode_frame(&self, frame: &[u8]) -> Result<Message, ProtocolError> {
        let mut r = WireReader::new(frame);
        let message = Message::read(&self.values, &mut r)?;
        r.finish()?;
        Ok(message)
    }
}

/// The 4-byte length-prefixed framing used on every connection.
pub fn framing() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .new_codec()
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(frame) => self
                .decode_frame(&frame)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut w = WireWriter::new();
        item.write(&self.values, &mut w)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let frame = w.finish();
        let frame_len = frame.len();
        tracing::trace!(frame_size_bytes = frame_len, "Encoding frame");
        if frame_len > 100_000 {
            tracing::info!(
                frame_size_bytes = frame_len,
                frame_size_kb = frame_len / 1024,
                "Large frame being encoded"
            );
        }
        self.inner.encode(frame, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{
        CommandBatch, CommandItem, CommandKind, DataCmd, RequestId, SlotId, Status, codes,
    };

    #[test]
    fn codec_roundtrip_batch() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::new();

        let item = CommandItem::new(
            SlotId::PRIMARY,
            CommandKind::Data(DataCmd::EvalData {
                expr: "sum(x)".into(),
            }),
        )
        .with_request_id(RequestId::new(3));
        let message = Message::CommandBatch(CommandBatch {
            busy: false,
            items: vec![item],
        });
        codec.encode(message.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, message);
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_waits_for_whole_frame() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::StatusReply(Status::error(codes::EVAL_FAILED, "oops")), &mut buf)
            .unwrap();

        let mut partial = buf.split_to(buf.len() - 2);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.unsplit(buf);
        assert!(matches!(
            codec.decode(&mut partial).unwrap(),
            Some(Message::StatusReply(_))
        ));
    }

    #[test]
    fn codec_rejects_garbage() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::new();
        codec
            .inner
            .encode(tokio_util::bytes::Bytes::from_static(&[0xee]), &mut buf)
            .unwrap();
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn codec_rejects_trailing_bytes() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::new();
        codec
            .inner
            .encode(tokio_util::bytes::Bytes::from_static(&[0x01, 0x00]), &mut buf)
            .unwrap();
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn bad_frame_leaves_framing_in_sync() {
        let codec = MessageCodec::default();
        let mut framing = framing();
        let mut buf = BytesMut::new();
        framing
            .encode(tokio_util::bytes::Bytes::from_static(&[0x7f]), &mut buf)
            .unwrap();
        let mut ping = MessageCodec::default();
        ping.encode(Message::Ping, &mut buf).unwrap();

        let bad = framing.decode(&mut buf).unwrap().unwrap();
        let err = codec.decode_frame(&bad).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownTag { .. }));

        let good = framing.decode(&mut buf).unwrap().unwrap();
        assert_eq!(codec.decode_frame(&good).unwrap(), Message::Ping);
        assert!(buf.is_empty());
    }
}
