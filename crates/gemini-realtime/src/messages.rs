//! Wire codec for the live protocol.
//!
//! Outbound messages are serialized to JSON text. Inbound frames carry no
//! discriminator: a frame is parsed once into a generic document and then
//! tested against each known shape in [`INBOUND_SHAPES`] order. The first
//! shape that matches wins and later shapes are never tried. Frames that fail
//! to parse or match nothing yield `None`.
//!
//! # Outbound
//!
//! - `setup` - model, generation config, system instruction
//! - `clientContent` - text turns
//! - `realtimeInput` - base64 audio / video chunks
//!
//! # Inbound
//!
//! - `setupComplete`
//! - `serverContent.modelTurn.parts[].inlineData` (model audio)
//! - `serverContent.interrupted`
//! - `serverContent.outputTranscription`

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::{MediaChunkLayout, ResponseModality};

/// Mime type used for video frames.
pub const VIDEO_MIME_TYPE: &str = "image/jpeg";

/// Speaker of a text turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// Setup payload carried by [`OutboundMessage::Setup`].
#[derive(Debug, Clone, PartialEq)]
pub struct SetupPayload {
    pub model: String,
    pub response_modalities: Vec<ResponseModality>,
    pub voice_name: String,
    pub language_code: String,
    pub temperature: Option<f32>,
    pub system_instruction: String,
}

/// A message the client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Setup(SetupPayload),
    TextInput {
        role: Role,
        text: String,
    },
    AudioInput {
        mime_type: String,
        data: Bytes,
        layout: MediaChunkLayout,
    },
    VideoInput {
        data: Bytes,
        layout: MediaChunkLayout,
    },
}

/// A recognized inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    SetupComplete,
    /// Decoded model audio; empty when the turn carried no usable parts.
    AudioOutput {
        audio: Bytes,
        transcription: Option<String>,
    },
    Interrupted,
    OutputTranscription(String),
}

// =============================================================================
// Outbound wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum ClientMessage {
    Setup(Setup),
    ClientContent(ClientContent),
    RealtimeInput(RealtimeInput),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: WireGenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    response_modalities: Vec<ResponseModality>,
    speech_config: SpeechConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
    language_code: String,
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
struct SystemInstruction {
    parts: Vec<InstructionPart>,
    role: Role,
}

#[derive(Serialize)]
struct InstructionPart {
    thought: bool,
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientContent {
    turns: Vec<Turn>,
    turn_complete: bool,
}

#[derive(Serialize)]
struct Turn {
    role: Role,
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum RealtimeInput {
    MediaChunks(Vec<Blob>),
    Audio(Blob),
    Video(Blob),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

impl Blob {
    fn new(mime_type: String, data: &[u8]) -> Self {
        Self {
            mime_type,
            data: BASE64_STANDARD.encode(data),
        }
    }
}

fn realtime_input(
    blob: Blob,
    layout: MediaChunkLayout,
    typed: fn(Blob) -> RealtimeInput,
) -> ClientMessage {
    let input = match layout {
        MediaChunkLayout::MediaChunks => RealtimeInput::MediaChunks(vec![blob]),
        MediaChunkLayout::Typed => typed(blob),
    };
    ClientMessage::RealtimeInput(input)
}

impl From<&OutboundMessage> for ClientMessage {
    fn from(message: &OutboundMessage) -> Self {
        match message {
            OutboundMessage::Setup(setup) => ClientMessage::Setup(Setup {
                model: setup.model.clone(),
                generation_config: WireGenerationConfig {
                    response_modalities: setup.response_modalities.clone(),
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: setup.voice_name.clone(),
                            },
                        },
                        language_code: setup.language_code.clone(),
                    },
                    temperature: setup.temperature,
                },
                system_instruction: SystemInstruction {
                    parts: vec![InstructionPart {
                        thought: false,
                        text: setup.system_instruction.clone(),
                    }],
                    role: Role::Model,
                },
            }),
            OutboundMessage::TextInput { role, text } => {
                ClientMessage::ClientContent(ClientContent {
                    turns: vec![Turn {
                        role: *role,
                        parts: vec![TextPart { text: text.clone() }],
                    }],
                    turn_complete: true,
                })
            }
            OutboundMessage::AudioInput {
                mime_type,
                data,
                layout,
            } => realtime_input(
                Blob::new(mime_type.clone(), data),
                *layout,
                RealtimeInput::Audio,
            ),
            OutboundMessage::VideoInput { data, layout } => realtime_input(
                Blob::new(VIDEO_MIME_TYPE.to_string(), data),
                *layout,
                RealtimeInput::Video,
            ),
        }
    }
}

/// Serialize an outbound message to its JSON text form.
pub fn encode(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ClientMessage::from(message))
}

// =============================================================================
// Inbound shapes
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetupCompleteShape {
    #[allow(dead_code)]
    setup_complete: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioOutputShape {
    server_content: AudioServerContent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioServerContent {
    model_turn: ModelTurn,
    #[serde(default)]
    output_transcription: Option<Transcription>,
}

#[derive(Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<ServerPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerPart {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterruptedShape {
    server_content: InterruptedContent,
}

#[derive(Deserialize)]
struct InterruptedContent {
    interrupted: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptionShape {
    server_content: TranscriptionContent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptionContent {
    output_transcription: Transcription,
}

#[derive(Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

type ShapeMatcher = fn(&Value) -> Option<InboundMessage>;

/// Inbound shapes in priority order.
pub const INBOUND_SHAPES: &[(&str, ShapeMatcher)] = &[
    ("setup_complete", match_setup_complete),
    ("audio_output", match_audio_output),
    ("interrupted", match_interrupted),
    ("output_transcription", match_output_transcription),
];

fn match_setup_complete(doc: &Value) -> Option<InboundMessage> {
    SetupCompleteShape::deserialize(doc)
        .ok()
        .map(|_| InboundMessage::SetupComplete)
}

fn match_audio_output(doc: &Value) -> Option<InboundMessage> {
    let shape = AudioOutputShape::deserialize(doc).ok()?;
    let content = shape.server_content;

    let mut audio = Vec::new();
    for blob in content.model_turn.parts.iter().filter_map(|p| p.inline_data.as_ref()) {
        match BASE64_STANDARD.decode(&blob.data) {
            Ok(bytes) => audio.extend_from_slice(&bytes),
            Err(e) => debug!(error = %e, "Skipping undecodable inline data"),
        }
    }

    let transcription = content
        .output_transcription
        .map(|t| t.text)
        .filter(|text| !text.is_empty());

    Some(InboundMessage::AudioOutput {
        audio: Bytes::from(audio),
        transcription,
    })
}

fn match_interrupted(doc: &Value) -> Option<InboundMessage> {
    let shape = InterruptedShape::deserialize(doc).ok()?;
    shape
        .server_content
        .interrupted
        .then_some(InboundMessage::Interrupted)
}

fn match_output_transcription(doc: &Value) -> Option<InboundMessage> {
    let shape = TranscriptionShape::deserialize(doc).ok()?;
    let text = shape.server_content.output_transcription.text;
    (!text.is_empty()).then_some(InboundMessage::OutputTranscription(text))
}

/// Decode a raw frame against the known inbound shapes.
pub fn decode(frame: &[u8]) -> Option<InboundMessage> {
    let doc: Value = serde_json::from_slice(frame).ok()?;
    INBOUND_SHAPES.iter().find_map(|(_, matcher)| matcher(&doc))
}
