use std::net::SocketAddr;

use futures::{sink::Sink, stream::Stream, SinkExt, StreamExt};
use tokio::sync::mpsc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension, TypedHeader,
};

use tracing::{debug, info, info_span, trace, Instrument};

use crate::broadcast::{self, Payload, Registry};

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(registry): Extension<Registry>,
) -> impl IntoResponse {
    if let Some(TypedHeader(user_agent)) = user_agent {
        info!("`{}`@`{addr}` connected", user_agent.as_str());
    } else {
        info!("`{addr}` connected");
    }

    ws.on_upgrade(move |socket| {
        let span = info_span!("Viewer", %addr);

        handle_websocket(socket, registry).instrument(span)
    })
}

/// Viewers have nothing to say, so this only waits for them to leave.
pub(crate) async fn read<S>(mut receiver: S)
where
    S: Unpin,
    S: Stream<Item = Result<Message, axum::Error>>,
{
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                trace!(%text, "client sent text, ignoring");
            }
            Message::Binary(_) => {
                debug!("client sent binary data, ignoring");
            }
            Message::Ping(_) => {
                debug!("socket ping");
            }
            Message::Pong(_) => {
                debug!("socket pong");
            }
            Message::Close(_) => {
                debug!("client disconnected");
            }
        }
    }

    debug!("no more stuff");
}

pub(crate) async fn write(
    mut sender: impl Sink<Message> + Unpin,
    mut payloads: mpsc::UnboundedReceiver<Payload>,
) {
    while let Some(payload) = payloads.recv().await {
        if sender.send(Message::Text(payload.to_string())).await.is_err() {
            debug!("client disconnected");
            return;
        }
        trace!("Record flushed");
    }
}

pub(crate) async fn handle_websocket(websocket: WebSocket, registry: Registry) {
    let (stream_sender, stream_receiver) = websocket.split();

    let (sink, payloads) = broadcast::Sink::new();
    let id = sink.id();
    registry.attach(sink).await;

    let mut read_handle = tokio::spawn(read(stream_receiver).instrument(info_span!("Read")));
    let mut write_handle =
        tokio::spawn(write(stream_sender, payloads).instrument(info_span!("Write")));

    tokio::select! {
        _ = &mut read_handle => debug!("Read task joined"),
        _ = &mut write_handle => debug!("Write task joined"),
    }

    registry.detach(id).await;

    // This ensures the underlying TCP connection gets closed,
    // which signals the peer that the session is over.
    read_handle.abort();
    write_handle.abort();
}
