use crate::error::BridgeError;
use crate::protocol::openai_chat::OpenAiChatRequest;

pub(crate) fn parse_openai_chat_request_wire(
    body: &bytes::Bytes,
) -> Result<OpenAiChatRequest, BridgeError> {
    let request: OpenAiChatRequest = serde_json::from_slice(body).map_err(|e| {
        BridgeError::InvalidRequest(format!("Invalid OpenAI Chat request body: {e}"))
    })?;
    if request.messages.is_empty() {
        return Err(BridgeError::InvalidRequest(
            "messages must contain at least one message".to_string(),
        ));
    }
    Ok(request)
}
