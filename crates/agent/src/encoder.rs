//! Dialogue → wire request encoding.
//!
//! Pure and deterministic: the same turns and preamble always produce the
//! same request. Unsupported attachments are dropped here, not reported.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;
use zaibridge_core::dialogue::{AssistantTurn, Attachment, ToolResultTurn, Turn, UserTurn};
use zaibridge_core::wire::{
    ContentPart, MediaSource, SystemBlock, WireMessage, WireRequest, WireRole,
};

const PDF_MIME: &str = "application/pdf";

/// Encode a dialogue and its system preamble into a streaming request.
///
/// Sampling parameters and tools are attached afterwards with
/// [`WireRequest::with_sampling`] and [`WireRequest::with_tools`].
pub fn encode(turns: &[Turn], preamble: &[String]) -> WireRequest {
    let messages = turns.iter().map(encode_turn).collect();
    let system = preamble.iter().map(SystemBlock::cached_text).collect();
    WireRequest::new(messages, system)
}

fn encode_turn(turn: &Turn) -> WireMessage {
    match turn {
        Turn::User(user) => encode_user(user),
        Turn::Assistant(assistant) => encode_assistant(assistant),
        Turn::ToolResults(results) => encode_tool_results(results),
    }
}

fn encode_user(turn: &UserTurn) -> WireMessage {
    let mut content = Vec::with_capacity(turn.attachments.len() + 1);
    if !turn.text.is_empty() {
        content.push(ContentPart::Text {
            text: turn.text.clone(),
        });
    }
    content.extend(turn.attachments.iter().filter_map(encode_attachment));

    WireMessage {
        role: WireRole::User,
        content,
    }
}

fn encode_attachment(attachment: &Attachment) -> Option<ContentPart> {
    let mime = attachment.mime_type.as_str();
    if mime.starts_with("image/") {
        Some(ContentPart::Image {
            source: MediaSource::base64(mime, STANDARD.encode(&attachment.data)),
        })
    } else if mime == PDF_MIME {
        Some(ContentPart::Document {
            source: MediaSource::base64(PDF_MIME, STANDARD.encode(&attachment.data)),
        })
    } else {
        debug!(mime_type = %mime, "Dropping unsupported attachment");
        None
    }
}

fn encode_assistant(turn: &AssistantTurn) -> WireMessage {
    let mut content = Vec::with_capacity(turn.tool_calls.len() + 1);
    if !turn.text.is_empty() {
        content.push(ContentPart::Text {
            text: turn.text.clone(),
        });
    }
    content.extend(turn.tool_calls.iter().map(|call| ContentPart::ToolUse {
        id: call.id.clone(),
        name: call.name.clone(),
        input: call.args.clone(),
    }));

    WireMessage {
        role: WireRole::Assistant,
        content,
    }
}

fn encode_tool_results(turn: &ToolResultTurn) -> WireMessage {
    WireMessage {
        role: WireRole::User,
        content: turn
            .results
            .iter()
            .map(|r| ContentPart::ToolResult {
                tool_use_id: r.call_id.clone(),
                content: r.result.to_wire_text(),
                is_error: r.is_error,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zaibridge_core::dialogue::{ToolCallRequest, ToolResult};

    #[test]
    fn user_only_dialogue_keeps_count_and_order() {
        let turns = vec![Turn::user("one"), Turn::user("two"), Turn::user("three")];
        let req = encode(&turns, &[]);
        assert_eq!(req.messages.len(), 3);
        for (msg, expected) in req.messages.iter().zip(["one", "two", "three"]) {
            assert_eq!(msg.role, WireRole::User);
            assert_eq!(
                msg.content,
                vec![ContentPart::Text {
                    text: expected.into()
                }]
            );
        }
    }

    #[test]
    fn unsupported_attachments_are_dropped() {
        let turns = vec![Turn::User(UserTurn {
            text: "what's in these?".into(),
            attachments: vec![
                Attachment::new("image/png", vec![0x89, b'P', b'N', b'G']),
                Attachment::new("application/zip", vec![b'P', b'K']),
            ],
        })];
        let req = encode(&turns, &[]);
        let content = &req.messages[0].content;
        assert_eq!(content.len(), 2);
        match &content[1] {
            ContentPart::Image { source } => {
                assert_eq!(source.kind, "base64");
                assert_eq!(source.media_type, "image/png");
                assert_eq!(source.data, STANDARD.encode([0x89, b'P', b'N', b'G']));
            }
            other => panic!("expected image part, got {other:?}"),
        }
    }

    #[test]
    fn pdf_becomes_document_and_empty_text_is_omitted() {
        let turns = vec![Turn::User(UserTurn {
            text: String::new(),
            attachments: vec![Attachment::new("application/pdf", b"%PDF-1.7".to_vec())],
        })];
        let req = encode(&turns, &[]);
        let content = &req.messages[0].content;
        assert_eq!(content.len(), 1);
        assert!(matches!(
            &content[0],
            ContentPart::Document { source } if source.media_type == "application/pdf"
        ));
    }

    #[test]
    fn assistant_tool_calls_are_verbatim() {
        let args = json!({"name": "kitchen light", "brightness": 40});
        let turns = vec![Turn::Assistant(AssistantTurn {
            text: "Dimming it now.".into(),
            tool_calls: vec![ToolCallRequest {
                id: "toolu_01".into(),
                name: "HassLightSet".into(),
                args: args.clone(),
            }],
        })];
        let req = encode(&turns, &[]);
        let msg = &req.messages[0];
        assert_eq!(msg.role, WireRole::Assistant);
        assert_eq!(msg.content.len(), 2);
        assert_eq!(
            msg.content[1],
            ContentPart::ToolUse {
                id: "toolu_01".into(),
                name: "HassLightSet".into(),
                input: args,
            }
        );
    }

    #[test]
    fn empty_assistant_turn_encodes_with_no_parts() {
        let req = encode(&[Turn::Assistant(AssistantTurn::default())], &[]);
        assert_eq!(req.messages.len(), 1);
        assert!(req.messages[0].content.is_empty());
    }

    #[test]
    fn tool_results_share_one_user_message() {
        let turns = vec![Turn::ToolResults(ToolResultTurn::new(vec![
            ToolResult::success("a", "ok"),
            ToolResult {
                call_id: "b".into(),
                result: json!({"state": "on"}).into(),
                is_error: false,
            },
            ToolResult::error("c", "entity not found"),
        ]))];
        let req = encode(&turns, &[]);
        assert_eq!(req.messages.len(), 1);
        let msg = &req.messages[0];
        assert_eq!(msg.role, WireRole::User);
        assert_eq!(msg.content.len(), 3);
        assert_eq!(
            msg.content[1],
            ContentPart::ToolResult {
                tool_use_id: "b".into(),
                content: r#"{"state":"on"}"#.into(),
                is_error: false,
            }
        );
        assert!(matches!(
            &msg.content[2],
            ContentPart::ToolResult { is_error: true, .. }
        ));
    }

    #[test]
    fn preamble_segments_become_cached_system_blocks() {
        let preamble = vec!["You are a home assistant.".to_string(), "User: Ada".to_string()];
        let req = encode(&[Turn::user("hi")], &preamble);
        assert_eq!(req.system.len(), 2);
        assert_eq!(req.system[0].text, "You are a home assistant.");
        assert_eq!(req.system[1].text, "User: Ada");
        assert!(req.system.iter().all(|b| b.cache_control.kind == "ephemeral"));
        assert!(req.stream);
    }

    #[test]
    fn encoding_is_deterministic() {
        let turns = vec![
            Turn::user("lights?"),
            Turn::Assistant(AssistantTurn {
                text: String::new(),
                tool_calls: vec![ToolCallRequest {
                    id: "t1".into(),
                    name: "GetState".into(),
                    args: json!({"area": "kitchen"}),
                }],
            }),
            Turn::ToolResults(ToolResultTurn::new(vec![ToolResult::success("t1", "on")])),
        ];
        let preamble = vec!["ctx".to_string()];
        let a = serde_json::to_string(&encode(&turns, &preamble)).unwrap();
        let b = serde_json::to_string(&encode(&turns, &preamble)).unwrap();
        assert_eq!(a, b);
    }
}
