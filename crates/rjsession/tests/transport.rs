//! Serving a slot over a byte stream.

mod common;

use std::sync::Arc;

use common::test_config;
use futures::{SinkExt, StreamExt};
use rjsession::bridge::protocol::codes;
use rjsession::data::value::List;
use rjsession::{
    CodecLimits, CommandBatch, CommandExchange, CommandItem, CommandKind, DataCmd, Message,
    MessageCodec, Severity, SlotId, Status, Value, serve_slot,
};
use tokio_util::codec::{FramedRead, FramedWrite};

#[tokio::test]
async fn oversized_assignment_is_refused_without_dropping_the_client() {
    let exchange = CommandExchange::start(&test_config()).unwrap();
    let limits = CodecLimits {
        max_list_length: 2,
        ..CodecLimits::default()
    };
    let (server_io, client_io) = tokio::io::duplex(4096);
    let server = tokio::spawn(serve_slot(
        Arc::clone(&exchange),
        SlotId::PRIMARY,
        server_io,
        limits,
    ));
    let (r, w) = tokio::io::split(client_io);
    let mut rx = FramedRead::new(r, MessageCodec::default());
    let mut tx = FramedWrite::new(w, MessageCodec::default());

    let assign = CommandItem::new(
        SlotId::PRIMARY,
        CommandKind::Data(DataCmd::AssignData {
            target: "xs".into(),
            value: Value::List(List::new(vec![Value::Null, Value::Null, Value::Null])),
        }),
    );
    tx.send(Message::CommandBatch(CommandBatch {
        busy: false,
        items: vec![assign],
    }))
    .await
    .unwrap();
    let Message::StatusReply(status) = rx.next().await.unwrap().unwrap() else {
        panic!("expected a status reply");
    };
    assert_eq!(status.severity, Severity::Error);
    assert_eq!(status.code, codes::PROTOCOL);
    assert!(status.message.unwrap().contains("list length"));

    // still attached: the first poll syncs the busy flag
    tx.send(Message::CommandBatch(CommandBatch::default()))
        .await
        .unwrap();
    assert_eq!(
        rx.next().await.unwrap().unwrap(),
        Message::CommandBatch(CommandBatch::default())
    );
    tx.send(Message::Ping).await.unwrap();
    assert_eq!(
        rx.next().await.unwrap().unwrap(),
        Message::StatusReply(Status::ok())
    );

    drop((rx, tx));
    server.await.unwrap().unwrap();
    exchange.shutdown();
}
