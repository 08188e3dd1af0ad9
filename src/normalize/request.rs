use serde::de::DeserializeOwned;
use serde_json::error::Category;

use crate::protocol::{
    ChatCompletionMessage, ChatCompletionRequest, ContentPart as WirePart, EmbeddingRequest,
    MessageContent, MessageRole, ToolDefinition,
};

use super::errors::{Collector, ValidationError};
use super::media::{decode_base64, parse_image_data_uri};
use super::types::{
    ChatMessage, ContentPart, NormalizedChatRequest, NormalizedEmbeddingRequest, Role,
    SamplingParams, ToolDescriptor,
};

const MAX_STOP_SEQUENCES: usize = 4;
const MAX_CHOICES: i64 = 8;
const MAX_TOOL_NAME_LEN: usize = 64;
/// Largest output dimensionality any catalogue embedding model offers.
const MAX_EMBEDDING_DIMENSIONS: i64 = 3072;
const FILE_MIME_TYPE: &str = "application/pdf";

/// Parse and validate a chat completion body.
pub fn parse_chat(body: &[u8]) -> Result<NormalizedChatRequest, ValidationError> {
    normalize_chat(decode_body(body)?)
}

/// Parse and validate an embedding body.
pub fn parse_embedding(body: &[u8]) -> Result<NormalizedEmbeddingRequest, ValidationError> {
    normalize_embedding(decode_body(body)?)
}

/// Deserialize a JSON body, locating type and shape errors by field path.
/// Syntax errors are reported against `body`.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ValidationError> {
    let mut de = serde_json::Deserializer::from_slice(body);
    let value = serde_path_to_error::deserialize(&mut de).map_err(|err| {
        let path = err.path().to_string();
        let field = match err.inner().classify() {
            Category::Data if path != "." => path,
            _ => "body".to_string(),
        };
        ValidationError::single(field, without_position(err.inner()))
    })?;
    de.end()
        .map_err(|err| ValidationError::single("body", without_position(&err)))?;
    Ok(value)
}

fn without_position(err: &serde_json::Error) -> String {
    let text = err.to_string();
    match text.rsplit_once(" at line ") {
        Some((message, _)) => message.to_string(),
        None => text,
    }
}

pub fn normalize_chat(req: ChatCompletionRequest) -> Result<NormalizedChatRequest, ValidationError> {
    let mut errs = Collector::default();

    if req.model.trim().is_empty() {
        errs.push("model", "must not be empty");
    }

    if req.messages.is_empty() {
        errs.push("messages", "must contain at least one message");
    }

    let mut messages = Vec::with_capacity(req.messages.len());
    for (idx, message) in req.messages.into_iter().enumerate() {
        if let Some(m) = normalize_message(idx, message, &mut errs) {
            messages.push(m);
        }
    }
    if !req_has_conversation(&messages) && !messages.is_empty() {
        errs.push("messages", "must include at least one user or assistant message");
    }

    if req.stream == Some(true) {
        errs.push("stream", "streaming responses are not supported");
    }

    let sampling = SamplingParams {
        temperature: check_range(&mut errs, "temperature", req.temperature, 0.0, 2.0),
        top_p: check_range(&mut errs, "top_p", req.top_p, 0.0, 1.0),
        presence_penalty: check_range(&mut errs, "presence_penalty", req.presence_penalty, -2.0, 2.0),
        frequency_penalty: check_range(
            &mut errs,
            "frequency_penalty",
            req.frequency_penalty,
            -2.0,
            2.0,
        ),
        max_tokens: match req.max_tokens {
            Some(v) if v < 1 || v > i64::from(u32::MAX) => {
                errs.push("max_tokens", "must be a positive integer");
                None
            }
            other => other.map(|v| v as u32),
        },
        n: match req.n {
            Some(v) if !(1..=MAX_CHOICES).contains(&v) => {
                errs.push("n", format!("must be between 1 and {MAX_CHOICES}"));
                None
            }
            other => other.map(|v| v as u32),
        },
        stop: normalize_stop(req.stop.map(|s| s.into_vec()), &mut errs),
    };

    let tools = req
        .tools
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(idx, tool)| normalize_tool(idx, tool, &mut errs))
        .collect();

    errs.finish(NormalizedChatRequest {
        model: req.model,
        messages,
        sampling,
        tools,
        user: req.user,
    })
}

pub fn normalize_embedding(
    req: EmbeddingRequest,
) -> Result<NormalizedEmbeddingRequest, ValidationError> {
    let mut errs = Collector::default();

    if req.model.trim().is_empty() {
        errs.push("model", "must not be empty");
    }

    let inputs = req.input.into_vec();
    if inputs.is_empty() {
        errs.push("input", "must contain at least one item");
    }
    for (idx, text) in inputs.iter().enumerate() {
        if text.trim().is_empty() {
            errs.push(format!("input[{idx}]"), "must not be empty");
        }
    }

    if let Some(format) = req.encoding_format.as_deref() {
        if format != "float" {
            errs.push("encoding_format", "only 'float' is supported");
        }
    }

    let dimensions = match req.dimensions {
        Some(d) if !(1..=MAX_EMBEDDING_DIMENSIONS).contains(&d) => {
            errs.push(
                "dimensions",
                format!("must be between 1 and {MAX_EMBEDDING_DIMENSIONS}"),
            );
            None
        }
        other => other.map(|d| d as u32),
    };

    errs.finish(NormalizedEmbeddingRequest {
        model: req.model,
        inputs,
        dimensions,
        input_type: req.input_type,
    })
}

fn req_has_conversation(messages: &[ChatMessage]) -> bool {
    messages.iter().any(|m| m.role != Role::System)
}

fn normalize_message(
    idx: usize,
    message: ChatCompletionMessage,
    errs: &mut Collector,
) -> Option<ChatMessage> {
    let role = match message.role {
        MessageRole::System => Role::System,
        MessageRole::User => Role::User,
        MessageRole::Assistant => Role::Assistant,
    };
    let content = message.content;
    let path = format!("messages[{idx}].content");

    let parts = match content {
        MessageContent::Text(text) => {
            if text.trim().is_empty() && role == Role::User {
                errs.push(path, "must not be empty");
                return None;
            }
            vec![ContentPart::Text(text)]
        }
        MessageContent::Parts(parts) => {
            if parts.is_empty() {
                errs.push(path, "must contain at least one part");
                return None;
            }
            let before = errs.count();
            let converted: Vec<ContentPart> = parts
                .into_iter()
                .enumerate()
                .filter_map(|(pidx, part)| {
                    normalize_part(&format!("{path}[{pidx}]"), role, part, &mut *errs)
                })
                .collect();
            if errs.count() != before {
                return None;
            }
            converted
        }
    };

    Some(ChatMessage { role, parts })
}

fn normalize_part(
    path: &str,
    role: Role,
    part: WirePart,
    errs: &mut Collector,
) -> Option<ContentPart> {
    match part {
        WirePart::Text { text } => {
            if text.trim().is_empty() && role == Role::User {
                errs.push(format!("{path}.text"), "must not be empty");
                return None;
            }
            Some(ContentPart::Text(text))
        }
        WirePart::ImageUrl { image_url } => {
            if role != Role::User {
                errs.push(
                    format!("{path}.type"),
                    format!("{} messages accept text parts only", role.as_str()),
                );
                return None;
            }
            match parse_image_data_uri(&image_url.url) {
                Ok((format, data)) => Some(ContentPart::Image { format, data }),
                Err(e) => {
                    errs.push(format!("{path}.image_url.url"), e.to_string());
                    None
                }
            }
        }
        WirePart::File { file } => {
            if role != Role::User {
                errs.push(
                    format!("{path}.type"),
                    format!("{} messages accept text parts only", role.as_str()),
                );
                return None;
            }
            match decode_base64(&file.file_data) {
                Ok(data) => Some(ContentPart::File {
                    mime_type: FILE_MIME_TYPE.into(),
                    data,
                }),
                Err(e) => {
                    errs.push(format!("{path}.file.file_data"), e.to_string());
                    None
                }
            }
        }
    }
}

fn check_range(
    errs: &mut Collector,
    field: &str,
    value: Option<f64>,
    min: f64,
    max: f64,
) -> Option<f32> {
    let v = value?;
    if !v.is_finite() || v < min || v > max {
        errs.push(field, format!("must be between {min} and {max}"));
        return None;
    }
    Some(v as f32)
}

fn normalize_stop(stop: Option<Vec<String>>, errs: &mut Collector) -> Vec<String> {
    let stop = stop.unwrap_or_default();
    if stop.len() > MAX_STOP_SEQUENCES {
        errs.push(
            "stop",
            format!("must contain at most {MAX_STOP_SEQUENCES} sequences"),
        );
    }
    for (idx, s) in stop.iter().enumerate() {
        if s.is_empty() {
            errs.push(format!("stop[{idx}]"), "must not be empty");
        }
    }
    stop
}

fn normalize_tool(idx: usize, tool: ToolDefinition, errs: &mut Collector) -> Option<ToolDescriptor> {
    let path = format!("tools[{idx}]");
    if tool.kind != "function" {
        errs.push(format!("{path}.type"), "only 'function' tools are supported");
        return None;
    }
    let name = tool.function.name;
    let valid_name = !name.is_empty()
        && name.len() <= MAX_TOOL_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_name {
        errs.push(
            format!("{path}.function.name"),
            "must be 1-64 characters of a-z, A-Z, 0-9, '_' or '-'",
        );
        return None;
    }
    let parameters = tool
        .function
        .parameters
        .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}));
    if !parameters.is_object() {
        errs.push(
            format!("{path}.function.parameters"),
            "must be a JSON schema object",
        );
        return None;
    }
    Some(ToolDescriptor {
        name,
        description: tool.function.description,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::types::ImageFormat;

    fn chat(body: serde_json::Value) -> Result<NormalizedChatRequest, ValidationError> {
        parse_chat(body.to_string().as_bytes())
    }

    #[test]
    fn test_minimal_chat_request() {
        let req = chat(serde_json::json!({
            "model": "claude_3_5_sonnet",
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .unwrap();
        assert_eq!(req.model, "claude_3_5_sonnet");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(req.sampling, SamplingParams::default());
    }

    #[test]
    fn test_empty_messages_rejected() {
        let err = chat(serde_json::json!({"model": "m", "messages": []})).unwrap_err();
        assert!(err.has_field("messages"));
    }

    #[test]
    fn test_system_only_rejected() {
        let err = chat(serde_json::json!({
            "model": "m",
            "messages": [{"role": "system", "content": "rules"}]
        }))
        .unwrap_err();
        assert!(err.has_field("messages"));
    }

    #[test]
    fn test_out_of_range_parameters_all_reported() {
        let err = chat(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 2.5,
            "top_p": -0.1,
            "max_tokens": 0,
            "presence_penalty": 3.0,
            "stop": ["a", "b", "c", "d", "e"]
        }))
        .unwrap_err();
        for field in ["temperature", "top_p", "max_tokens", "presence_penalty", "stop"] {
            assert!(err.has_field(field), "missing error for {field}: {err}");
        }
    }

    #[test]
    fn test_boundary_values_accepted() {
        let req = chat(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 2.0,
            "top_p": 0.0,
            "stop": "END"
        }))
        .unwrap();
        assert_eq!(req.sampling.temperature, Some(2.0));
        assert_eq!(req.sampling.top_p, Some(0.0));
        assert_eq!(req.sampling.stop, vec!["END"]);
    }

    #[test]
    fn test_image_part_decoded() {
        let req = chat(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "what is this"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,aGVsbG8="}}
            ]}]
        }))
        .unwrap();
        assert_eq!(
            req.messages[0].parts[1],
            ContentPart::Image {
                format: ImageFormat::Png,
                data: b"hello".to_vec()
            }
        );
    }

    #[test]
    fn test_undecodable_image_names_field() {
        let err = chat(serde_json::json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "be nice"},
                {"role": "user", "content": [
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,@@@"}}
                ]}
            ]
        }))
        .unwrap_err();
        assert!(err.has_field("messages[1].content[0].image_url.url"));
    }

    #[test]
    fn test_file_part_in_system_message_rejected() {
        let err = chat(serde_json::json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": [{"type": "file", "file": {"file_data": "JVBERg=="}}]},
                {"role": "user", "content": "hi"}
            ]
        }))
        .unwrap_err();
        assert!(err.has_field("messages[0].content[0].type"));
    }

    #[test]
    fn test_blank_user_text_rejected() {
        let err = chat(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "   "}]
        }))
        .unwrap_err();
        assert!(err.has_field("messages[0].content"));
    }

    #[test]
    fn test_stream_rejected() {
        let err = chat(serde_json::json!({
            "model": "m",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap_err();
        assert!(err.has_field("stream"));
    }

    #[test]
    fn test_malformed_json_reports_body() {
        let err = parse_chat(b"{\"model\": ").unwrap_err();
        assert!(err.has_field("body"));
    }

    #[test]
    fn test_wrong_type_names_field() {
        let err = chat(serde_json::json!({
            "model": "m",
            "temperature": "hot",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].field, "temperature");
        assert!(err.errors[0].constraint.contains("expected f64"));
        assert!(!err.errors[0].constraint.contains("line"));
    }

    #[test]
    fn test_unknown_part_type_names_message_content() {
        let err = chat(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": [{"type": "video"}]}]
        }))
        .unwrap_err();
        assert_eq!(err.errors[0].field, "messages[0].content");
        assert!(err.errors[0].constraint.contains("content parts"));
    }

    #[test]
    fn test_unknown_role_names_field() {
        let err = chat(serde_json::json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "robot", "content": "beep"}
            ]
        }))
        .unwrap_err();
        assert_eq!(err.errors[0].field, "messages[1].role");
    }

    #[test]
    fn test_bad_stop_shape_names_field() {
        let err = chat(serde_json::json!({
            "model": "m",
            "stop": 7,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap_err();
        assert_eq!(err.errors[0].field, "stop");
        assert_eq!(err.errors[0].constraint, "a string or an array of strings");
    }

    #[test]
    fn test_tools_normalized() {
        let req = chat(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "weather?"}],
            "tools": [{"type": "function", "function": {
                "name": "get_weather",
                "description": "Current weather",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
            }}]
        }))
        .unwrap();
        assert_eq!(req.tools.len(), 1);
        assert_eq!(req.tools[0].name, "get_weather");
    }

    #[test]
    fn test_bad_tool_name() {
        let err = chat(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "x"}],
            "tools": [{"type": "function", "function": {"name": "has space"}}]
        }))
        .unwrap_err();
        assert!(err.has_field("tools[0].function.name"));
    }

    #[test]
    fn test_embedding_single_input() {
        let req = parse_embedding(br#"{"model":"cohere_english_v3","input":"hello"}"#).unwrap();
        assert_eq!(req.inputs, vec!["hello"]);
        assert_eq!(req.dimensions, None);
    }

    #[test]
    fn test_embedding_validation() {
        let err = parse_embedding(
            br#"{"model":"m","input":["ok",""],"encoding_format":"base64","dimensions":0}"#,
        )
        .unwrap_err();
        assert!(err.has_field("input[1]"));
        assert!(err.has_field("encoding_format"));
        assert!(err.has_field("dimensions"));
    }

    #[test]
    fn test_embedding_dimensions_bounded() {
        let req = parse_embedding(br#"{"model":"m","input":"x","dimensions":3072}"#).unwrap();
        assert_eq!(req.dimensions, Some(3072));

        for dims in ["3073", "4294967295"] {
            let body = format!(r#"{{"model":"m","input":"x","dimensions":{dims}}}"#);
            let err = parse_embedding(body.as_bytes()).unwrap_err();
            assert!(err.has_field("dimensions"));
        }
    }

    #[test]
    fn test_embedding_input_wrong_type() {
        let err = parse_embedding(br#"{"model":"m","input":42}"#).unwrap_err();
        assert_eq!(err.errors[0].field, "input");
        assert_eq!(err.errors[0].constraint, "a string or an array of strings");
    }

    #[test]
    fn test_embedding_empty_list() {
        let err = parse_embedding(br#"{"model":"m","input":[]}"#).unwrap_err();
        assert!(err.has_field("input"));
    }
}
