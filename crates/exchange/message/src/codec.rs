//! Length-prefixed protobuf framing for [`Message`].

use asynchronous_codec::{Decoder, Encoder};
use bytes::BytesMut;

use crate::{Message, MessageError, proto};

/// Maximum size of a single frame (block payload plus overhead).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Errors raised while framing messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Protocol-level error (oversized frame, invalid protobuf, etc.)
    #[error("protocol error: {0}")]
    Protocol(String),
    /// IO error during read/write
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Frame decoded but failed validation
    #[error(transparent)]
    Message(#[from] MessageError),
}

impl From<quick_protobuf_codec::Error> for CodecError {
    fn from(error: quick_protobuf_codec::Error) -> Self {
        CodecError::Protocol(error.to_string())
    }
}

/// Codec turning a byte stream into validated [`Message`]s and back.
pub struct MessageCodec(quick_protobuf_codec::Codec<proto::Message>);

impl MessageCodec {
    /// Create a codec accepting frames up to `max_packet_size` bytes.
    pub fn new(max_packet_size: usize) -> Self {
        Self(quick_protobuf_codec::Codec::new(max_packet_size))
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl Encoder for MessageCodec {
    type Item<'a> = Message;
    type Error = CodecError;

    fn encode(&mut self, item: Self::Item<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.0.encode(item.into(), dst).map_err(Into::into)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.0.decode(src)? {
            Some(frame) => Ok(Some(Message::try_from(frame)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asynchronous_codec::Framed;
    use assert_matches::assert_matches;
    use cairn_primitives::{Block, BlockKey};
    use futures::{SinkExt, TryStreamExt, io::Cursor};

    #[test]
    fn test_partial_frame_waits_for_more() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::get_block(9, BlockKey::from("abc")), &mut buf)
            .unwrap();

        let mut partial = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(buf);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.id(), 9);
        assert_eq!(decoded.key().as_str(), "abc");
    }

    #[test]
    fn test_malformed_frame_rejected() {
        let mut inner = quick_protobuf_codec::Codec::<proto::Message>::new(MAX_MESSAGE_SIZE);
        let mut buf = BytesMut::new();
        inner
            .encode(
                proto::Message {
                    type_pb: Some(proto::mod_Message::MessageType::WANT_BLOCK),
                    id: Some(1),
                    key: None,
                    ..Default::default()
                },
                &mut buf,
            )
            .unwrap();

        let mut codec = MessageCodec::default();
        assert_matches!(
            codec.decode(&mut buf),
            Err(CodecError::Message(MessageError::Malformed { field: "key" }))
        );
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = BytesMut::new();
        let block = Block::new(vec![0u8; 1024]);
        MessageCodec::default()
            .encode(Message::block(1, block), &mut buf)
            .unwrap();

        let mut small = MessageCodec::new(64);
        assert_matches!(small.decode(&mut buf), Err(CodecError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_framed_stream() {
        let block = Block::new(&b"framed payload"[..]);
        let sent = vec![
            Message::want_block(1, block.key().clone(), vec![block.key().clone()]),
            Message::block(1, block.clone()),
        ];

        let mut framed = Framed::new(Cursor::new(Vec::new()), MessageCodec::default());
        for msg in sent.clone() {
            framed.send(msg).await.unwrap();
        }

        let bytes = framed.into_inner().into_inner();
        let framed = Framed::new(Cursor::new(bytes), MessageCodec::default());
        let received: Vec<Message> = framed.try_collect().await.unwrap();

        assert_eq!(received, sent);
        assert_eq!(received[1].delivered_block(), Some(block));
    }
}
