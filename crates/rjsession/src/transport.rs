//! Drives one client slot over an established byte stream.
//!
//! Each client message is answered by exactly one message: a batch from the
//! exchange, or a status reply when the exchange refused the call or the
//! message could not be decoded.

use std::sync::Arc;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::bridge::codec::{self, MessageCodec};
use crate::bridge::protocol::{Message, SlotId, Status, codes};
use crate::data::CodecLimits;
use crate::exchange::CommandExchange;

/// Serves `slot` until the client hangs up or the session stops.
pub async fn serve_slot<T>(
    exchange: Arc<CommandExchange>,
    slot: SlotId,
    io: T,
    limits: CodecLimits,
) -> anyhow::Result<()>
where
    T: AsyncRead + AsyncWrite,
{
    let (read_half, write_half) = tokio::io::split(io);
    let mut reader = FramedRead::new(read_half, codec::framing());
    let decoder = MessageCodec::new(limits);
    let mut writer = FramedWrite::new(write_half, MessageCodec::new(limits));

    let client = match exchange.connect(slot).await {
        Ok(client) => client,
        Err(status) => {
            writer.send(Message::StatusReply(status)).await?;
            return Ok(());
        }
    };

    let result = async {
        while let Some(frame) = reader.next().await {
            let frame = frame.with_context(|| format!("failed to read from {slot}"))?;
            let message = match decoder.decode_frame(&frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!(%slot, error = %e, "Malformed client message");
                    writer
                        .send(Message::StatusReply(e.into()))
                        .await
                        .with_context(|| format!("failed to write to {slot}"))?;
                    continue;
                }
            };
            let reply = match message {
                Message::Ping => Message::StatusReply(Status::ok()),
                Message::FileExchange { name, data } => {
                    debug!(%slot, name, size = data.len(), "File exchange");
                    Message::FileExchange { name, data }
                }
                Message::CommandBatch(batch) => {
                    match exchange.submit_from_client(slot, client, batch.items).await {
                        Ok(batch) => Message::CommandBatch(batch),
                        Err(status) => Message::StatusReply(status),
                    }
                }
                Message::StatusReply(status) => {
                    warn!(%slot, %status, "Ignoring status reply from client");
                    continue;
                }
            };
            let stopped =
                matches!(&reply, Message::StatusReply(status) if status.code == codes::STOPPED);
            writer
                .send(reply)
                .await
                .with_context(|| format!("failed to write to {slot}"))?;
            if stopped {
                info!(%slot, "Session stopped, closing connection");
                break;
            }
        }
        anyhow::Ok(())
    }
    .await;

    exchange.disconnect(slot, client);
    result
}
