use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;

use bytes::Bytes;
use futures_util::StreamExt;
use z2api_rs::auth::{authenticate, build_allowed_key_set};
use z2api_rs::config::{
    AppConfig, ClientAuthConfig, FeaturesConfig, ServerConfig, ThinkingMode, UpstreamConfig,
};
use z2api_rs::fc::{extract_tool_invocations, strip_tool_json};
use z2api_rs::protocol::openai_chat::encoder::ChunkEncoder;
use z2api_rs::stream::{
    raw_event_stream, sse_chunk_stream, transform_thinking_content, DeliveryMode,
    PhaseAccumulator, SseLineDecoder, StreamAssembler,
};

const SCAN_LIMIT: usize = 200_000;

fn config_with_keys(keys: &[&str]) -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        upstream: UpstreamConfig {
            base_url: "http://127.0.0.1:19001/api/chat/completions".to_string(),
            api_token: "upstream-secret".to_string(),
            default_model: "glm-4.5".to_string(),
            models: vec!["glm-4.5".to_string()],
            model_aliases: BTreeMap::new(),
            headers: BTreeMap::new(),
            enable_thinking: true,
        },
        client_authentication: ClientAuthConfig {
            allowed_keys: keys.iter().map(ToString::to_string).collect(),
        },
        features: FeaturesConfig::default(),
    }
}

fn answer_stream_body(frames: usize) -> String {
    let mut body = String::with_capacity(frames * 96);
    for i in 0..frames {
        body.push_str("data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"answer\",\"delta_content\":\"token ");
        body.push_str(&i.to_string());
        body.push_str("\"}}\n\n");
    }
    body.push_str("data: {\"type\":\"chat:completion\",\"data\":{\"phase\":\"done\",\"done\":true}}\n\n");
    body
}

fn tool_answer(filler_bytes: usize) -> String {
    let mut text = "a".repeat(filler_bytes);
    text.push_str("\n```json\n{\"tool_calls\":[{\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"get_weather\",\"arguments\":{\"city\":\"London\"}}}]}\n```");
    text
}

fn bench_sse_decoder(c: &mut Criterion) {
    let body = answer_stream_body(256);
    let bytes = body.as_bytes();

    c.bench_function("sse_decode_256_frames_single_chunk", |b| {
        b.iter(|| {
            let mut decoder = SseLineDecoder::new();
            black_box(decoder.feed(black_box(bytes)).len())
        });
    });

    c.bench_function("sse_decode_256_frames_64b_chunks", |b| {
        b.iter(|| {
            let mut decoder = SseLineDecoder::new();
            let mut out = Vec::with_capacity(8);
            let mut total = 0;
            for chunk in bytes.chunks(64) {
                decoder.feed_into(black_box(chunk), &mut out);
                total += out.len();
                out.clear();
            }
            black_box(total)
        });
    });
}

fn bench_stream_translation(c: &mut Criterion) {
    let body = Bytes::from(answer_stream_body(256));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    c.bench_function("sse_chunk_stream_256_frames", |b| {
        b.iter(|| {
            let source = futures_util::stream::iter(vec![Ok::<Bytes, std::io::Error>(
                body.clone(),
            )]);
            let assembler = StreamAssembler::new(
                ChunkEncoder::new("chatcmpl-bench", "glm-4.5", 1),
                PhaseAccumulator::new(DeliveryMode::Incremental, ThinkingMode::Think, false),
                SCAN_LIMIT,
            );
            let frames = runtime.block_on(
                sse_chunk_stream(raw_event_stream(source), assembler).count(),
            );
            black_box(frames)
        });
    });
}

fn bench_thinking_transform(c: &mut Criterion) {
    let delta = "<details type=\"reasoning\" done=\"false\">\n<summary>Thinking</summary>\n> first step\n> second step</details>";
    c.bench_function("thinking_transform_think", |b| {
        b.iter(|| black_box(transform_thinking_content(black_box(delta), ThinkingMode::Think)));
    });
    c.bench_function("thinking_transform_plain_delta", |b| {
        b.iter(|| {
            black_box(transform_thinking_content(
                black_box("just a plain reasoning token"),
                ThinkingMode::Strip,
            ))
        });
    });
}

fn bench_tool_extraction(c: &mut Criterion) {
    let small = tool_answer(64);
    let large = tool_answer(64 * 1024);
    let no_tools = "b".repeat(64 * 1024);

    c.bench_function("extract_tool_calls_fenced_small", |b| {
        b.iter(|| black_box(extract_tool_invocations(black_box(&small), SCAN_LIMIT)));
    });
    c.bench_function("extract_tool_calls_fenced_64k", |b| {
        b.iter(|| black_box(extract_tool_invocations(black_box(&large), SCAN_LIMIT)));
    });
    c.bench_function("extract_tool_calls_miss_64k", |b| {
        b.iter(|| black_box(extract_tool_invocations(black_box(&no_tools), SCAN_LIMIT)));
    });
    c.bench_function("strip_tool_json_64k", |b| {
        b.iter(|| black_box(strip_tool_json(black_box(&large), SCAN_LIMIT)));
    });
}

fn bench_authentication(c: &mut Criterion) {
    let single = build_allowed_key_set(&config_with_keys(&["client-key"]));
    let multiple = build_allowed_key_set(&config_with_keys(&["k1", "k2", "k3", "client-key"]));
    let mut headers = http::HeaderMap::new();
    headers.insert(
        "authorization",
        "Bearer client-key".parse().expect("header"),
    );

    c.bench_function("auth_single_key", |b| {
        b.iter(|| black_box(authenticate(black_box(&headers), &single).is_ok()));
    });
    c.bench_function("auth_multiple_keys", |b| {
        b.iter(|| black_box(authenticate(black_box(&headers), &multiple).is_ok()));
    });
}

criterion_group!(
    benches,
    bench_sse_decoder,
    bench_stream_translation,
    bench_thinking_transform,
    bench_tool_extraction,
    bench_authentication
);
criterion_main!(benches);
