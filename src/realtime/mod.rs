//! WebSocket capability handle passed to `ws` route handlers.
//!
//! The connection layer owns the socket and the frame codec. It hands the
//! router a [`Websocket`] whose two channel ends carry decoded [`Message`]s;
//! [`Websocket::channel`] builds a connected pair for it.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::context::Parameters;
use crate::router::{MessageType, WsOptions};

/// A decoded WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
    Close,
}

impl Message {
    fn payload_len(&self) -> usize {
        match self {
            Message::Text(s) => s.len(),
            Message::Binary(b) => b.len(),
            Message::Close => 0,
        }
    }

    // Present the payload the way the route asked for it.
    fn convert(self, message_type: MessageType) -> Self {
        match (message_type, self) {
            (MessageType::String, Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => Message::Text(text.to_owned()),
                Err(_) => Message::Binary(bytes),
            },
            (MessageType::Buffer | MessageType::ArrayBuffer, Message::Text(text)) => {
                Message::Binary(Bytes::from(text))
            }
            (_, other) => other,
        }
    }
}

/// Errors raised when writing to a [`Websocket`].
#[derive(Debug, Error)]
pub enum WebsocketError {
    #[error("websocket connection is closed")]
    Closed,

    #[error("message of {len} bytes exceeds max_payload_length of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },
}

/// The server side of an open WebSocket connection.
///
/// Carries the parameters bound by the `ws` route match and the route's
/// [`WsOptions`], which the connection layer reads to configure idle timeouts
/// and backpressure.
#[derive(Debug)]
pub struct Websocket {
    params: Parameters,
    options: WsOptions,
    outbound: mpsc::Sender<Message>,
    inbound: mpsc::Receiver<Message>,
}

/// The connection-layer side of a [`Websocket::channel`] pair.
#[derive(Debug)]
pub struct WebsocketPeer {
    /// Messages the handler sent.
    pub outbound: mpsc::Receiver<Message>,
    /// Feed decoded client messages to the handler.
    pub inbound: mpsc::Sender<Message>,
}

impl Websocket {
    /// Wraps existing channel ends.
    pub fn new(outbound: mpsc::Sender<Message>, inbound: mpsc::Receiver<Message>) -> Self {
        Self {
            params: Parameters::new(),
            options: WsOptions::default(),
            outbound,
            inbound,
        }
    }

    /// Creates a connected handle/peer pair with `buffer` slots in each
    /// direction. A `buffer` of zero is raised to one.
    pub fn channel(buffer: usize) -> (Self, WebsocketPeer) {
        let buffer = buffer.max(1);
        let (out_tx, out_rx) = mpsc::channel(buffer);
        let (in_tx, in_rx) = mpsc::channel(buffer);
        (
            Self::new(out_tx, in_rx),
            WebsocketPeer {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }

    pub(crate) fn bind(&mut self, params: Parameters, options: WsOptions) {
        self.params = params;
        self.options = options;
    }

    /// Parameters bound by the matched `ws` route.
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Options of the matched `ws` route.
    pub fn options(&self) -> &WsOptions {
        &self.options
    }

    /// Queue a message for the client.
    ///
    /// # Errors
    ///
    /// - [`WebsocketError::PayloadTooLarge`]: the payload exceeds the route's
    ///   `max_payload_length`.
    /// - [`WebsocketError::Closed`]: the connection layer dropped its end.
    pub async fn send(&self, message: Message) -> Result<(), WebsocketError> {
        let len = message.payload_len();
        let max = self.options.max_payload_length;
        if len > max {
            return Err(WebsocketError::PayloadTooLarge { len, max });
        }
        self.outbound
            .send(message)
            .await
            .map_err(|_| WebsocketError::Closed)
    }

    /// Receive the next client message, converted to the route's `message_type`.
    ///
    /// Returns `None` once the connection layer has closed the inbound side.
    pub async fn recv(&mut self) -> Option<Message> {
        let message_type = self.options.message_type;
        self.inbound
            .recv()
            .await
            .map(|message| message.convert(message_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_buffer_channel_still_carries_messages() {
        let (ws, mut peer) = Websocket::channel(0);
        ws.send(Message::Close).await.unwrap();
        assert_eq!(peer.outbound.recv().await, Some(Message::Close));
    }

    #[tokio::test]
    async fn round_trip_through_peer() {
        let (mut ws, mut peer) = Websocket::channel(4);
        peer.inbound.send(Message::Text("ping".into())).await.unwrap();
        assert_eq!(ws.recv().await, Some(Message::Text("ping".into())));

        ws.send(Message::Text("pong".into())).await.unwrap();
        assert_eq!(peer.outbound.recv().await, Some(Message::Text("pong".into())));

        drop(peer);
        assert_eq!(ws.recv().await, None);
        assert!(matches!(
            ws.send(Message::Close).await,
            Err(WebsocketError::Closed)
        ));
    }

    #[tokio::test]
    async fn recv_converts_to_message_type() {
        let (mut ws, peer) = Websocket::channel(4);
        peer.inbound
            .send(Message::Binary(Bytes::from_static(b"hi")))
            .await
            .unwrap();
        // default message type is String
        assert_eq!(ws.recv().await, Some(Message::Text("hi".into())));

        let options = WsOptions {
            message_type: MessageType::Buffer,
            ..WsOptions::default()
        };
        ws.bind(Parameters::new(), options);
        peer.inbound.send(Message::Text("yo".into())).await.unwrap();
        assert_eq!(ws.recv().await, Some(Message::Binary(Bytes::from_static(b"yo"))));
    }

    #[tokio::test]
    async fn send_enforces_payload_limit() {
        let (mut ws, _peer) = Websocket::channel(1);
        let options = WsOptions {
            max_payload_length: 4,
            ..WsOptions::default()
        };
        ws.bind(Parameters::new(), options);
        let err = ws.send(Message::Text("too long".into())).await.unwrap_err();
        assert!(matches!(err, WebsocketError::PayloadTooLarge { len: 8, max: 4 }));
    }
}
