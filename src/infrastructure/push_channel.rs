// STOMP push-channel client feeding live updates to the dashboard
//
// Frames travel as WebSocket messages on the broker's raw-WebSocket endpoint
// (`/websocket/websocket` next to the SockJS path).
use crate::application::live_updates::LiveUpdateSource;
use crate::domain::events::{EventError, LiveUpdateEvent};
use crate::infrastructure::config::PushSettings;
use crate::infrastructure::stomp::Frame;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

const THERMOSTAT_SUBSCRIPTION: &str = "tstat-updates";
const WEATHER_SUBSCRIPTION: &str = "weather-updates";

#[derive(Debug, Clone)]
pub struct StompPushChannel {
    settings: PushSettings,
}

/// Why a session ended
enum SessionEnd {
    /// The event consumer went away, stop for good
    ReceiverClosed,
    /// The broker closed the connection
    Disconnected,
}

impl StompPushChannel {
    pub fn new(settings: PushSettings) -> Self {
        Self { settings }
    }

    fn connect_frame(&self) -> Frame {
        let host = match &self.settings.virtual_host {
            Some(host) => host.clone(),
            None => self
                .settings
                .url
                .parse::<Uri>()
                .ok()
                .and_then(|uri| uri.host().map(str::to_string))
                .unwrap_or_else(|| "localhost".to_string()),
        };
        let mut frame = Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", &host)
            .header("heart-beat", "0,0");
        if let Some(login) = &self.settings.login {
            frame = frame.header("login", login);
        }
        if let Some(passcode) = &self.settings.passcode {
            frame = frame.header("passcode", passcode);
        }
        frame
    }

    async fn session(&self, tx: &mpsc::Sender<LiveUpdateEvent>) -> Result<SessionEnd> {
        let url = &self.settings.url;
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to connect to push channel at {}", url))?;
        tracing::info!(%url, "Connected to push channel");

        run_session(socket, self.connect_frame(), &self.settings, tx).await
    }
}

/// Send one frame as a text message
async fn write_frame<S>(socket: &mut WebSocketStream<S>, frame: &Frame) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    frame.encode(&mut buf);
    let text = String::from_utf8(buf.to_vec()).context("STOMP frame is not valid UTF-8")?;
    socket.send(Message::Text(text)).await?;
    Ok(())
}

/// Read messages until a frame is complete. `Ok(None)` means the peer closed.
///
/// A message may carry several frames, or heart-beat EOLs only, so bytes are
/// accumulated in `buf` across calls.
async fn read_frame<S>(socket: &mut WebSocketStream<S>, buf: &mut BytesMut) -> Result<Option<Frame>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        if let Some(frame) = Frame::decode(buf)? {
            return Ok(Some(frame));
        }
        match socket.next().await {
            Some(Ok(Message::Text(text))) => buf.extend_from_slice(text.as_bytes()),
            Some(Ok(Message::Binary(data))) => buf.extend_from_slice(&data),
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => {}
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed))
            | Some(Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake))) => return Ok(None),
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Handshake, subscribe to both topics, then forward MESSAGE frames.
async fn run_session<S>(
    mut socket: WebSocketStream<S>,
    connect: Frame,
    settings: &PushSettings,
    tx: &mpsc::Sender<LiveUpdateEvent>,
) -> Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(8 * 1024);

    write_frame(&mut socket, &connect).await?;
    match read_frame(&mut socket, &mut buf).await? {
        Some(frame) if frame.command == "CONNECTED" => {
            tracing::debug!(version = frame.get("version").unwrap_or("1.0"), "STOMP session established");
        }
        Some(frame) if frame.command == "ERROR" => {
            anyhow::bail!(
                "Push channel refused connection: {}",
                frame.get("message").unwrap_or("no message")
            );
        }
        Some(frame) => anyhow::bail!("Unexpected {} frame during handshake", frame.command),
        None => return Ok(SessionEnd::Disconnected),
    }

    for (id, topic) in [
        (THERMOSTAT_SUBSCRIPTION, &settings.thermostat_topic),
        (WEATHER_SUBSCRIPTION, &settings.weather_topic),
    ] {
        let subscribe = Frame::new("SUBSCRIBE")
            .header("id", id)
            .header("destination", topic)
            .header("ack", "auto");
        write_frame(&mut socket, &subscribe).await?;
        tracing::info!(topic = %topic, "Subscribed to push topic");
    }

    while let Some(frame) = read_frame(&mut socket, &mut buf).await? {
        match frame.command.as_str() {
            "MESSAGE" => {
                let Some(event) = decode_message(&frame, settings) else {
                    continue;
                };
                if tx.send(event).await.is_err() {
                    return Ok(SessionEnd::ReceiverClosed);
                }
            }
            "ERROR" => {
                anyhow::bail!(
                    "Push channel error: {}",
                    frame.get("message").unwrap_or("no message")
                );
            }
            other => tracing::debug!(command = other, "Ignoring frame"),
        }
    }

    Ok(SessionEnd::Disconnected)
}

/// Route a MESSAGE frame to its decoder. Malformed payloads are logged and
/// dropped.
fn decode_message(frame: &Frame, settings: &PushSettings) -> Option<LiveUpdateEvent> {
    let subscription = frame.get("subscription");
    let destination = frame.get("destination");

    let decoded: Result<LiveUpdateEvent, EventError> =
        if subscription == Some(THERMOSTAT_SUBSCRIPTION) || destination == Some(settings.thermostat_topic.as_str()) {
            LiveUpdateEvent::from_thermostat_payload(&frame.body)
        } else if subscription == Some(WEATHER_SUBSCRIPTION) || destination == Some(settings.weather_topic.as_str()) {
            LiveUpdateEvent::from_weather_payload(&frame.body)
        } else {
            tracing::debug!(?subscription, ?destination, "Message for unknown subscription");
            return None;
        };

    match decoded {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(
                ?destination,
                payload = %String::from_utf8_lossy(&frame.body),
                "Dropping push message: {}",
                e
            );
            None
        }
    }
}

#[async_trait]
impl LiveUpdateSource for StompPushChannel {
    async fn run(&self, tx: mpsc::Sender<LiveUpdateEvent>) -> Result<()> {
        let delay = Duration::from_secs(self.settings.reconnect_delay_secs);
        loop {
            match self.session(&tx).await {
                Ok(SessionEnd::ReceiverClosed) => return Ok(()),
                Ok(SessionEnd::Disconnected) => tracing::warn!("Push channel disconnected"),
                Err(e) => tracing::error!("Push channel session failed: {:#}", e),
            }
            if tx.is_closed() {
                return Ok(());
            }
            tracing::info!(delay_secs = delay.as_secs(), "Reconnecting to push channel");
            tokio::time::sleep(delay).await;
        }
    }
}
