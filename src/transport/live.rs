//! Live API WebSocket transport.
//!
//! Implements the bidirectional generate-content protocol: a JSON `setup`
//! frame carrying the persona, a `setupComplete` acknowledgement, then
//! base64 PCM media chunks in both directions. Only the audio capability is
//! implemented; tool calls and text turns are outside this crate's scope.

use crate::audio::codec::EncodedFrame;
use crate::error::{Result, VoxlinkError};
use crate::persona::Persona;
use crate::transport::{Connection, RealtimeTransport, ServerMessage, TransportEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite};

// --- Wire shapes (camelCase JSON) ---

#[derive(Serialize)]
struct SetupFrame {
    setup: SetupBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupBody {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: Content,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    speech_config: SpeechConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputFrame {
    realtime_input: RealtimeInput,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerFrame {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    interrupted: Option<bool>,
}

#[derive(Deserialize)]
struct ModelTurn {
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: Option<String>,
}

/// One parsed inbound frame.
enum Parsed {
    SetupComplete,
    Content(ServerMessage),
    Ignored,
}

fn parse_server_frame(text: &str) -> std::result::Result<Parsed, serde_json::Error> {
    let frame: ServerFrame = serde_json::from_str(text)?;

    if frame.setup_complete.is_some() {
        return Ok(Parsed::SetupComplete);
    }

    if let Some(content) = frame.server_content {
        let audio = content
            .model_turn
            .and_then(|turn| turn.parts)
            .unwrap_or_default()
            .into_iter()
            .find_map(|part| part.inline_data.and_then(|inline| inline.data));
        let interrupted = content.interrupted.unwrap_or(false);

        if audio.is_some() || interrupted {
            return Ok(Parsed::Content(ServerMessage { audio, interrupted }));
        }
    }

    Ok(Parsed::Ignored)
}

fn build_setup_frame(model: &str, persona: &Persona) -> SetupFrame {
    // The wire expects the resource-qualified model name
    let model = if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    };

    SetupFrame {
        setup: SetupBody {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: persona.voice.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: persona.system_instruction(),
                }],
            },
        },
    }
}

/// WebSocket transport to the hosted realtime audio service.
pub struct LiveTransport {
    api_key: String,
    model: String,
    endpoint: String,
}

impl LiveTransport {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: crate::defaults::LIVE_ENDPOINT.to_string(),
        }
    }

    /// Override the endpoint (for proxies or test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl RealtimeTransport for LiveTransport {
    async fn connect(&self, persona: &Persona) -> Result<Connection> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);

        let (ws, _response) =
            connect_async(&url)
                .await
                .map_err(|e| VoxlinkError::Handshake {
                    message: format!("websocket connect failed: {}", e),
                })?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let setup = build_setup_frame(&self.model, persona);
        let setup_text =
            serde_json::to_string(&setup).map_err(|e| VoxlinkError::Handshake {
                message: format!("setup serialization failed: {}", e),
            })?;
        ws_tx
            .send(tungstenite::Message::Text(setup_text.into()))
            .await
            .map_err(|e| VoxlinkError::Handshake {
                message: format!("setup send failed: {}", e),
            })?;

        let (out_tx, mut out_rx) = mpsc::channel::<EncodedFrame>(64);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(64);

        // Outbound: forward encoded frames until the session drops the sender
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let wrapped = RealtimeInputFrame {
                    realtime_input: RealtimeInput {
                        media_chunks: vec![MediaChunk {
                            mime_type: frame.mime_type,
                            data: frame.data,
                        }],
                    },
                };
                let text = match serde_json::to_string(&wrapped) {
                    Ok(t) => t,
                    Err(e) => {
                        log::error!("outbound frame serialization failed: {}", e);
                        continue;
                    }
                };
                if ws_tx
                    .send(tungstenite::Message::Text(text.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            ws_tx.close().await.ok();
        });

        // Inbound: parse frames into transport events
        tokio::spawn(async move {
            let mut opened = false;
            while let Some(message) = ws_rx.next().await {
                let message = match message {
                    Ok(m) => m,
                    Err(e) => {
                        event_tx
                            .send(TransportEvent::Error(format!("websocket error: {}", e)))
                            .await
                            .ok();
                        return;
                    }
                };

                let text = match message {
                    tungstenite::Message::Text(t) => t.to_string(),
                    tungstenite::Message::Binary(bytes) => {
                        match String::from_utf8(bytes.to_vec()) {
                            Ok(t) => t,
                            Err(_) => {
                                log::warn!("dropping non-utf8 binary frame");
                                continue;
                            }
                        }
                    }
                    tungstenite::Message::Close(frame) => {
                        let reason = frame
                            .map(|f| format!("{} {}", f.code, f.reason))
                            .unwrap_or_else(|| "closed by remote".to_string());
                        event_tx.send(TransportEvent::Closed { reason }).await.ok();
                        return;
                    }
                    _ => continue,
                };

                match parse_server_frame(&text) {
                    Ok(Parsed::SetupComplete) => {
                        if !opened {
                            opened = true;
                            if event_tx.send(TransportEvent::Opened).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Parsed::Content(msg)) => {
                        if event_tx.send(TransportEvent::Message(msg)).await.is_err() {
                            return;
                        }
                    }
                    Ok(Parsed::Ignored) => {}
                    Err(e) => {
                        log::warn!("unparseable server frame: {}", e);
                    }
                }
            }
            event_tx
                .send(TransportEvent::Closed {
                    reason: "stream ended".to_string(),
                })
                .await
                .ok();
        });

        Ok(Connection {
            outbound: out_tx,
            events: event_rx,
        })
    }
}
