//! Transport seam between the connection state machine and the socket

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use potato_core::{Error, Result};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::debug;

/// Outbound half: accepts encoded text frames
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half: yields text frames until the peer closes
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An open text-frame transport
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens transports. The production implementation is
/// [`TungsteniteConnector`]; [`super::memory::MemoryConnector`] runs in-process.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the opening handshake. Resolving `Ok` means the transport is open.
    async fn connect(&self, url: &str) -> Result<Transport>;
}

/// `tokio-tungstenite` WebSocket connector (ws and wss)
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Transport> {
        let (ws, response) = tokio_tungstenite::connect_async(url).await?;
        debug!("WebSocket handshake completed with status {}", response.status());

        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(Error::from)
            .with(|text: String| future::ready(Ok::<_, Error>(WsMessage::Text(text.into()))));

        // Ping/pong is answered by tungstenite; only text frames reach the gateway
        let stream = read.filter_map(|frame| {
            future::ready(match frame {
                Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(WsMessage::Binary(_)) => {
                    debug!("Ignoring binary gateway frame");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(Error::from(e))),
            })
        });

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
