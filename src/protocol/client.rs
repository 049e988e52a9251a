// ABOUTME: WebSocket client implementation for the Snapcast stream protocol
// ABOUTME: Handles connection, handshake, and framing of binary transport messages

use crate::error::Error;
use crate::protocol::messages::Hello;
use crate::protocol::wire::{self, Frame, FrameBody, TimeValue};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for the stream protocol
pub struct ProtocolClient;

impl ProtocolClient {
    /// Connect to a stream server and send the hello handshake.
    ///
    /// The server does not answer the hello directly; it starts pushing server
    /// settings and the codec header, which the reader yields like any other frame.
    pub async fn connect(
        url: &str,
        hello: Hello,
        sent: TimeValue,
    ) -> Result<(FrameWriter, FrameReader), Error> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let (sink, stream) = ws_stream.split();
        let mut writer = FrameWriter { sink, next_id: 0 };
        writer.send(FrameBody::Hello(hello), sent).await?;

        log::info!("Connected to {}", url);
        Ok((writer, FrameReader { stream }))
    }
}

/// Sending half of a connection; assigns frame ids
pub struct FrameWriter {
    sink: SplitSink<WsStream, WsMessage>,
    next_id: u16,
}

impl FrameWriter {
    /// Send a body stamped with `sent`, returning the id it was given
    pub async fn send(&mut self, body: FrameBody, sent: TimeValue) -> Result<u16, Error> {
        self.next_id = self.next_id.wrapping_add(1);
        let mut frame = Frame::new(body)?;
        frame.header.id = self.next_id;
        frame.header.sent = sent;

        let bytes = wire::encode(&frame)?;
        self.sink
            .send(WsMessage::Binary(bytes))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        Ok(frame.header.id)
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<(), Error> {
        self.sink
            .close()
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }
}

/// Receiving half of a connection
pub struct FrameReader {
    stream: SplitStream<WsStream>,
}

impl FrameReader {
    /// Wait for the next frame. `Ok(None)` means the server closed the connection.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        while let Some(msg) = self.stream.next().await {
            match msg.map_err(|e| Error::WebSocket(e.to_string()))? {
                WsMessage::Binary(data) => return wire::decode(Bytes::from(data)).map(Some),
                WsMessage::Close(_) => return Ok(None),
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
                WsMessage::Text(text) => {
                    return Err(Error::Protocol(format!(
                        "Unexpected text message on stream socket: {} bytes",
                        text.len()
                    )))
                }
            }
        }
        Ok(None)
    }
}
