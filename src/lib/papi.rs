//! Client for the Pythonista API websocket.
//!
//! The bot subscribes to the discord.py moderation log and forwards every event it receives
//! to a channel. The connection is retried with [ExponentialBackoff] whenever it drops.

use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tracing::instrument;

use super::backoff::ExponentialBackoff;
use crate::error::PapiError;

const WS_URL: &str = "wss://api.pythonista.gg/v1/websocket";

/// The only subscription the bot cares about.
pub const DPY_MODLOG: &str = "dpy_modlog";

/// Opcodes sent by the API.
mod op {
    pub const HELLO: u64 = 0;
    pub const EVENT: u64 = 1;
    pub const NOTIFICATION: u64 = 2;
}

/// Opcode we send to subscribe.
const OP_SUBSCRIBE: &str = "subscribe";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Kinds of moderation actions in the discord.py guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationEvent {
    Ban,
    Kick,
    Mute,
    Unban,
    Helpblock,
}

impl ModerationEvent {
    /// Past tense used in the mod log embed.
    pub fn prose(self) -> &'static str {
        match self {
            ModerationEvent::Ban => "banned",
            ModerationEvent::Kick => "kicked",
            ModerationEvent::Mute => "muted",
            ModerationEvent::Unban => "unbanned",
            ModerationEvent::Helpblock => "helpblocked",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ModerationEvent::Ban => "Ban",
            ModerationEvent::Kick => "Kick",
            ModerationEvent::Mute => "Mute",
            ModerationEvent::Unban => "Unban",
            ModerationEvent::Helpblock => "Helpblock",
        }
    }
}

impl TryFrom<u8> for ModerationEvent {
    type Error = PapiError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ModerationEvent::Ban),
            2 => Ok(ModerationEvent::Kick),
            3 => Ok(ModerationEvent::Mute),
            4 => Ok(ModerationEvent::Unban),
            5 => Ok(ModerationEvent::Helpblock),
            other => Err(PapiError::UnknownEventType(other)),
        }
    }
}

/// A moderation action taken in the discord.py guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModLogPayload {
    pub moderation_event_type: u8,
    pub guild_id: u64,
    pub target_id: u64,
    pub author_id: u64,
    #[serde(default)]
    pub reason: String,
    /// ISO-8601
    pub event_time: String,
}

impl ModLogPayload {
    pub fn event(&self) -> Result<ModerationEvent, PapiError> {
        ModerationEvent::try_from(self.moderation_event_type)
    }
}

/// The envelope events come in, both over the websocket and the `/dpy/modlog` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModLogEnvelope {
    #[serde(default)]
    pub subscription: String,
    #[serde(default)]
    pub application: Option<u64>,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<u64>,
    pub payload: ModLogPayload,
}

/// An event forwarded to the rest of the bot.
#[derive(Debug, Clone, PartialEq)]
pub enum PapiEvent {
    DpyModlog(ModLogEnvelope),
    /// A subscription we don't know how to handle.
    Other { subscription: String, data: Value },
}

impl PapiEvent {
    /// Sort an EVENT frame by its subscription.
    pub fn from_event(data: Value) -> Result<Self, PapiError> {
        let subscription = data["subscription"].as_str().unwrap_or_default().to_string();
        if subscription == DPY_MODLOG {
            Ok(PapiEvent::DpyModlog(serde_json::from_value(data)?))
        } else {
            Ok(PapiEvent::Other { subscription, data })
        }
    }
}

/// A decoded frame received from the API.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Hello { user_id: Option<u64> },
    Event(Value),
    SubscriptionAdded(Vec<String>),
    SubscriptionRemoved(Vec<String>),
    /// The API didn't understand something we sent.
    UnknownOpSent(Value),
    /// A notification type we don't know.
    Notification(String),
    /// An opcode we don't know.
    Unknown(Option<u64>),
}

impl Frame {
    pub fn decode(text: &str) -> Result<Self, PapiError> {
        let data: Value = serde_json::from_str(text)?;

        let frame = match data["op"].as_u64() {
            Some(op::HELLO) => Frame::Hello {
                user_id: data["user_id"].as_u64(),
            },
            Some(op::EVENT) => Frame::Event(data),
            Some(op::NOTIFICATION) => {
                let subscriptions = || {
                    data["subscriptions"]
                        .as_array()
                        .map(|subs| {
                            subs.iter()
                                .filter_map(|s| s.as_str().map(str::to_owned))
                                .collect()
                        })
                        .unwrap_or_default()
                };
                match data["type"].as_str().unwrap_or_default() {
                    "subscription_added" => Frame::SubscriptionAdded(subscriptions()),
                    "subscription_removed" => Frame::SubscriptionRemoved(subscriptions()),
                    "unknown_op" => Frame::UnknownOpSent(data["received"].clone()),
                    other => Frame::Notification(other.to_string()),
                }
            }
            other => Frame::Unknown(other),
        };
        Ok(frame)
    }
}

/// Message asking for the moderation log.
fn subscribe_message() -> String {
    json!({
        "op": OP_SUBSCRIBE,
        "subscriptions": [DPY_MODLOG],
    })
    .to_string()
}

/// Why a session ended.
enum SessionEnd {
    /// The server closed the connection, reconnect.
    Closed,
    /// We were asked to stop.
    Shutdown,
}

/// Keeps a subscription to the Pythonista API alive.
pub struct PapiClient {
    token: String,
    events: mpsc::Sender<PapiEvent>,
    shutdown: watch::Receiver<bool>,
    backoff: ExponentialBackoff,
}

impl PapiClient {
    pub fn new(
        token: String,
        events: mpsc::Sender<PapiEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            token,
            events,
            shutdown,
            backoff: ExponentialBackoff::default(),
        }
    }

    /// Connect, and keep reconnecting, until shutdown or the token is rejected.
    #[instrument(name = "papi", skip_all)]
    pub async fn run(mut self) {
        loop {
            let socket = match self.connect().await {
                Some(socket) => socket,
                None => return,
            };

            match self.session(socket).await {
                Ok(SessionEnd::Shutdown) => return,
                Ok(SessionEnd::Closed) => {
                    tracing::debug!("Pythonista API closed the websocket.");
                }
                Err(e) => tracing::error!("Pythonista API websocket failed: {e}"),
            }

            if !self.wait_to_retry().await {
                return;
            }
        }
    }

    /// Try to connect until it works. `None` means give up.
    async fn connect(&mut self) -> Option<Socket> {
        loop {
            if *self.shutdown.borrow() {
                return None;
            }

            match self.try_connect().await {
                Ok(socket) => return Some(socket),
                Err(PapiError::Forbidden) => {
                    tracing::error!(
                        "Unable to connect to Pythonista API Websocket, due to an incorrect token."
                    );
                    return None;
                }
                Err(e @ PapiError::InvalidToken(_)) => {
                    tracing::error!("Unable to connect to Pythonista API Websocket: {e}");
                    return None;
                }
                Err(e) => tracing::error!("Unable to connect to Pythonista API Websocket: {e}."),
            }

            if !self.wait_to_retry().await {
                return None;
            }
        }
    }

    /// Sleep for the next backoff delay. `false` if shutdown was requested meanwhile.
    async fn wait_to_retry(&mut self) -> bool {
        let delay = self.backoff.delay();
        tracing::warn!(
            "Retrying Pythonista API Websocket connection in \"{:.2}\" seconds.",
            delay.as_secs_f32()
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.changed() => false,
        }
    }

    async fn try_connect(&self) -> Result<Socket, PapiError> {
        let mut request = WS_URL.into_client_request()?;
        request
            .headers_mut()
            .insert("Authorization", auth_header(&self.token)?);

        match tokio_tungstenite::connect_async(request).await {
            Ok((socket, _)) => Ok(socket),
            Err(WsError::Http(response)) if response.status() == StatusCode::FORBIDDEN => {
                Err(PapiError::Forbidden)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Subscribe and forward frames until the connection closes.
    async fn session(&mut self, mut socket: Socket) -> Result<SessionEnd, PapiError> {
        socket.send(Message::Text(subscribe_message())).await?;

        loop {
            let message = tokio::select! {
                message = socket.next() => message,
                _ = self.shutdown.changed() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    if let Err(e) = socket.close(Some(frame)).await {
                        tracing::debug!("Closing the Pythonista API websocket failed: {e}");
                    }
                    return Ok(SessionEnd::Shutdown);
                }
            };

            let text = match message {
                None | Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Closed),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                // Pings are answered by tungstenite.
                Some(Ok(_)) => continue,
            };

            match Frame::decode(&text) {
                Ok(frame) => self.handle(frame).await,
                Err(e) => tracing::warn!("Couldn't decode a Pythonista API frame: {e}"),
            }
        }
    }

    async fn handle(&self, frame: Frame) {
        match frame {
            Frame::Hello { user_id } => {
                tracing::debug!("Received HELLO from Pythonista API: user={user_id:?}")
            }
            Frame::Event(data) => match PapiEvent::from_event(data) {
                Ok(event) => {
                    if self.events.send(event).await.is_err() {
                        tracing::warn!("Nobody is listening to Pythonista API events.");
                    }
                }
                Err(e) => tracing::warn!("Malformed Pythonista API event: {e}"),
            },
            Frame::SubscriptionAdded(subs) => tracing::debug!(
                "Pythonista API added our subscription, currently subscribed: `{}`",
                subs.join(", ")
            ),
            Frame::SubscriptionRemoved(subs) => tracing::info!(
                "Pythonista API removed our subscription, currently subscribed: `{}`",
                subs.join(", ")
            ),
            Frame::UnknownOpSent(received) => {
                tracing::info!("We sent an UNKNOWN OP to Pythonista API: `{received}`")
            }
            Frame::Notification(kind) => {
                tracing::info!("Received an unknown notification from Pythonista API: {kind}")
            }
            Frame::Unknown(_) => tracing::info!("Received an UNKNOWN OP from Pythonista API."),
        }
    }
}

/// The token as an `Authorization` header.
fn auth_header(token: &str) -> Result<HeaderValue, PapiError> {
    Ok(HeaderValue::from_str(token)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_must_fit_in_a_header() {
        assert!(auth_header("abc.def").is_ok());
        assert!(matches!(
            auth_header("bad\ntoken"),
            Err(PapiError::InvalidToken(_))
        ));
    }

    const MODLOG_EVENT: &str = r#"{
        "op": 1,
        "subscription": "dpy_modlog",
        "application": 1,
        "application_name": "dpy",
        "user_id": 5,
        "payload": {
            "moderation_event_type": 2,
            "guild_id": 336642139381301249,
            "target_id": 80088516616269824,
            "author_id": 80528701850124288,
            "reason": "spam",
            "event_time": "2023-03-01T12:00:00+00:00"
        }
    }"#;

    #[test]
    fn decodes_hello() {
        let frame = Frame::decode(r#"{"op": 0, "user_id": 99}"#).unwrap();
        assert_eq!(frame, Frame::Hello { user_id: Some(99) });
    }

    #[test]
    fn decodes_notifications() {
        let added = Frame::decode(
            r#"{"op": 2, "type": "subscription_added", "subscriptions": ["dpy_modlog", "other"]}"#,
        )
        .unwrap();
        assert_eq!(
            added,
            Frame::SubscriptionAdded(vec!["dpy_modlog".into(), "other".into()])
        );

        let unknown = Frame::decode(r#"{"op": 2, "type": "unknown_op", "received": "subscribe"}"#)
            .unwrap();
        assert_eq!(unknown, Frame::UnknownOpSent(json!("subscribe")));
    }

    #[test]
    fn unknown_ops_are_not_errors() {
        assert_eq!(Frame::decode(r#"{"op": 42}"#).unwrap(), Frame::Unknown(Some(42)));
        assert_eq!(Frame::decode(r#"{}"#).unwrap(), Frame::Unknown(None));
        assert!(Frame::decode("not json").is_err());
    }

    #[test]
    fn modlog_events_are_typed() {
        let Frame::Event(data) = Frame::decode(MODLOG_EVENT).unwrap() else {
            panic!("expected an event");
        };
        let PapiEvent::DpyModlog(envelope) = PapiEvent::from_event(data).unwrap() else {
            panic!("expected a modlog event");
        };
        assert_eq!(envelope.payload.reason, "spam");
        assert_eq!(envelope.payload.event().unwrap(), ModerationEvent::Kick);
        assert_eq!(envelope.payload.event().unwrap().prose(), "kicked");
    }

    #[test]
    fn other_subscriptions_pass_through() {
        let event = PapiEvent::from_event(json!({"op": 1, "subscription": "new_thing"})).unwrap();
        assert!(matches!(event, PapiEvent::Other { subscription, .. } if subscription == "new_thing"));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(matches!(
            ModerationEvent::try_from(9),
            Err(PapiError::UnknownEventType(9))
        ));
    }

    #[test]
    fn subscribe_message_shape() {
        let sent: Value = serde_json::from_str(&subscribe_message()).unwrap();
        assert_eq!(sent, json!({"op": "subscribe", "subscriptions": ["dpy_modlog"]}));
    }
}
