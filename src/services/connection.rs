use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;

use crate::models::messages::WsEnvelope;

enum Sink {
    Live(SplitSink<WebSocket, Message>),
    #[cfg(test)]
    Detached,
}

/// Write half of a client socket with serialized access.
///
/// Broadcasts, timers and the dispatcher all write to the same peer; the
/// mutex guarantees one frame at a time. Reads are not guarded: only the
/// owning dispatcher task consumes the stream half.
pub struct SafeConn {
    sink: Mutex<Sink>,
}

impl SafeConn {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        SafeConn {
            sink: Mutex::new(Sink::Live(sink)),
        }
    }

    /// A connection with no socket behind it; every write fails as if the
    /// peer were gone. Unit-test stand-in only.
    #[cfg(test)]
    pub fn detached() -> Self {
        SafeConn {
            sink: Mutex::new(Sink::Detached),
        }
    }

    /// Encode the envelope and send it as one text frame. An error means
    /// the peer is gone; callers owning room membership react by evicting
    /// the connection.
    pub async fn write_json(&self, envelope: &WsEnvelope) -> Result<(), axum::Error> {
        let text = serde_json::to_string(envelope).map_err(axum::Error::new)?;
        let mut sink = self.sink.lock().await;
        match &mut *sink {
            Sink::Live(sink) => sink.send(Message::Text(text)).await,
            #[cfg(test)]
            Sink::Detached => Err(axum::Error::new(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "detached connection",
            ))),
        }
    }

    /// Close the write half, nudging the peer's read loop to finish.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Sink::Live(sink) = &mut *sink {
            let _ = sink.close().await;
        }
    }
}
