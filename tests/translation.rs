use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use z2api_rs::config::ThinkingMode;
use z2api_rs::fc::{extract_tool_invocations, strip_tool_json};
use z2api_rs::protocol::openai_chat::encoder::ChunkEncoder;
use z2api_rs::stream::sse::DONE_FRAME;
use z2api_rs::stream::{
    collect_response, raw_event_stream, sse_chunk_stream, transform_thinking_content,
    DeliveryMode, FullAssembler, PhaseAccumulator, ResponseMeta, StreamAssembler,
};

const SCAN_LIMIT: usize = 200_000;

const MIXED_BODY: &str = concat!(
    "data: {\"data\":{\"phase\":\"thinking\",\"delta_content\":\"<details type=\\\"reasoning\\\">\\n> weigh options\"}}\n\n",
    ": keep-alive\n\n",
    "data: {\"data\":{\"phase\":\"thinking\",\"delta_content\":\"\\n> pick one</details>\"}}\n\n",
    "data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\"Ans\"}}\n\n",
    "data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\"wer \\u00e9t\\u00e9\"}}\n\n",
    "data: {\"data\":{\"phase\":\"done\",\"done\":true,\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":4}}}\n\n",
);

fn chunked(body: &str, size: usize) -> Vec<Result<Bytes, std::io::Error>> {
    body.as_bytes()
        .chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

fn stream_assembler(tool_mode: bool, thinking: ThinkingMode) -> StreamAssembler {
    StreamAssembler::new(
        ChunkEncoder::new("chatcmpl-fixed", "glm-4.5", 1_700_000_000),
        PhaseAccumulator::new(DeliveryMode::Incremental, thinking, tool_mode),
        SCAN_LIMIT,
    )
}

async fn stream_frames(
    parts: Vec<Result<Bytes, std::io::Error>>,
    assembler: StreamAssembler,
) -> Vec<String> {
    sse_chunk_stream(raw_event_stream(futures_util::stream::iter(parts)), assembler)
        .map(|b| String::from_utf8(b.to_vec()).expect("utf8 frame"))
        .collect()
        .await
}

async fn collect(body: &str, tool_mode: bool) -> Value {
    let assembler = FullAssembler::new(
        PhaseAccumulator::new(DeliveryMode::Collect, ThinkingMode::Strip, tool_mode),
        SCAN_LIMIT,
    );
    let meta = ResponseMeta {
        id: "chatcmpl-fixed".into(),
        model: "glm-4.5".into(),
        created: 1_700_000_000,
    };
    let events = raw_event_stream(futures_util::stream::iter(chunked(body, body.len())));
    let response = collect_response(events, assembler, &meta).await;
    serde_json::to_value(&response).expect("serialize response")
}

#[test]
fn test_strip_mode_example() {
    let out = transform_thinking_content(
        "<details><summary>x</summary>hi</details>",
        ThinkingMode::Strip,
    );
    assert_eq!(out, "hi");
}

#[tokio::test]
async fn test_byte_chunking_does_not_change_output() {
    let whole = stream_frames(
        chunked(MIXED_BODY, MIXED_BODY.len()),
        stream_assembler(false, ThinkingMode::Strip),
    )
    .await;
    for size in [1, 2, 7, 64] {
        let split = stream_frames(
            chunked(MIXED_BODY, size),
            stream_assembler(false, ThinkingMode::Strip),
        )
        .await;
        assert_eq!(split, whole, "chunk size {size}");
    }
    assert_eq!(whole.last().map(String::as_str), Some(DONE_FRAME));
    assert!(whole.iter().any(|f| f.contains("\"content\":\"wer été\"")));
}

#[tokio::test]
async fn test_repeated_terminal_frames_emit_single_done() {
    let body = concat!(
        "data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\"x\",\"done\":true}}\n\n",
        "data: {\"data\":{\"phase\":\"done\"}}\n\n",
        "data: [DONE]\n\n",
        "data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\"late\"}}\n\n",
    );
    let frames = stream_frames(
        chunked(body, 5),
        stream_assembler(false, ThinkingMode::Think),
    )
    .await;
    assert_eq!(frames.iter().filter(|f| *f == DONE_FRAME).count(), 1);
    assert_eq!(
        frames
            .iter()
            .filter(|f| f.contains("\"finish_reason\":\"stop\""))
            .count(),
        1
    );
    assert!(!frames.iter().any(|f| f.contains("late")));
}

#[test]
fn test_strip_and_extract_are_complementary() {
    let with_call = "Checking now.\n```json\n{\"tool_calls\":[{\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"lookup\",\"arguments\":{\"q\":\"rust\"}}}]}\n```\nDone.";
    let calls = extract_tool_invocations(with_call, SCAN_LIMIT).expect("calls");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].function.name, "lookup");
    let stripped = strip_tool_json(with_call, SCAN_LIMIT);
    assert!(!stripped.contains("tool_calls"));
    assert!(stripped.contains("Checking now."));
    assert!(extract_tool_invocations(&stripped, SCAN_LIMIT).is_none());

    let plain = "  Nothing to call here.  ";
    assert!(extract_tool_invocations(plain, SCAN_LIMIT).is_none());
    assert_eq!(strip_tool_json(plain, SCAN_LIMIT), "Nothing to call here.");
}

#[tokio::test]
async fn test_collected_tool_call_has_null_content() {
    let body = concat!(
        "data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\"{\\\"tool_calls\\\":[{\\\"function\\\":{\\\"name\\\":\\\"ping\\\",\\\"arguments\\\":\\\"{}\\\"}}]}\"}}\n\n",
        "data: {\"data\":{\"phase\":\"done\"}}\n\n",
    );
    let response = collect(body, true).await;
    let choice = &response["choices"][0];
    assert_eq!(choice["finish_reason"], "tool_calls");
    assert!(choice["message"]["content"].is_null());
    let call = &choice["message"]["tool_calls"][0];
    assert_eq!(call["function"]["name"], "ping");
    assert_eq!(call["function"]["arguments"], "{}");
    assert!(call["id"].as_str().is_some_and(|id| id.starts_with("call_")));
    assert_eq!(response["usage"]["total_tokens"], 0);
}

#[tokio::test]
async fn test_collected_text_without_tools_keeps_reasoning() {
    let response = collect(MIXED_BODY, false).await;
    let message = &response["choices"][0]["message"];
    assert_eq!(message["content"], "Answer été");
    // Each thinking delta is trimmed on its own before concatenation.
    assert_eq!(message["reasoning_content"], "weigh optionspick one");
    assert_eq!(response["usage"]["total_tokens"], 7);
    assert_eq!(response["object"], "chat.completion");
}
