//! Streaming response rewriter
//!
//! Parses server-sent-event frames out of response body chunks, splices the
//! request's latency telemetry into the backend's `usage` object and
//! re-emits frames within the per-chunk byte limit. Malformed payloads pass
//! through untouched; the data path never fails on a rewrite.

use serde_json::json;
use tracing::warn;

use llm_inference_director_core::{RequestContext, Usage};

/// Sentinel payload that terminates an SSE stream
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data: ";
const FRAME_SEPARATOR: &str = "\n\n";

/// Rewrite one streaming body chunk.
///
/// Frames are `\n\n`-delimited. `data:` frames carrying a JSON object with a
/// `usage` object get the telemetry keys spliced in; the `[DONE]` sentinel
/// and frames without `usage` are re-emitted unchanged; non-`data:` lines
/// are dropped.
pub fn rewrite_streaming_chunk(chunk: &str, ctx: &RequestContext) -> String {
    let mut out = String::with_capacity(chunk.len());
    for frame in chunk.split(FRAME_SEPARATOR) {
        if frame.is_empty() {
            continue;
        }
        let Some(payload) = frame.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        if payload.trim() == DONE_SENTINEL {
            out.push_str(DATA_PREFIX);
            out.push_str(DONE_SENTINEL);
            out.push_str(FRAME_SEPARATOR);
            continue;
        }
        out.push_str(DATA_PREFIX);
        match inject_telemetry(payload, ctx) {
            Some(rewritten) => out.push_str(&rewritten),
            None => out.push_str(payload),
        }
        out.push_str(FRAME_SEPARATOR);
    }
    out
}

// Splice telemetry into the payload's usage object. None means "emit the
// original payload": the payload is not JSON, has no usage object, or failed
// to re-serialize.
fn inject_telemetry(payload: &str, ctx: &RequestContext) -> Option<String> {
    let mut value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(error) => {
            warn!(%error, "passing through unparseable SSE payload");
            return None;
        }
    };

    let usage = value.get_mut("usage")?.as_object_mut()?;
    usage.insert("ttft_ms".to_string(), json!(ctx.ttft_ms));
    usage.insert(
        "predicted_ttft_ms".to_string(),
        json!(ctx.predicted_ttft_ms),
    );
    usage.insert(
        "tpot_observations_ms".to_string(),
        json!(ctx.tpot_observations_ms),
    );
    usage.insert(
        "predicted_tpot_observations_ms".to_string(),
        json!(ctx.predicted_tpot_observations_ms),
    );
    usage.insert("avg_tpot_ms".to_string(), json!(ctx.avg_tpot_ms));
    usage.insert(
        "avg_predicted_tpot_ms".to_string(),
        json!(ctx.avg_predicted_tpot_ms),
    );

    serde_json::to_string(&value).ok()
}

/// Extract the backend's `usage` object from a chunk carrying the `[DONE]`
/// sentinel. Chunks without the sentinel return `None`.
pub fn capture_usage(chunk: &str) -> Option<Usage> {
    if !chunk.contains(DONE_SENTINEL) {
        return None;
    }
    for frame in chunk.split(FRAME_SEPARATOR) {
        let Some(payload) = frame.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        if payload.trim() == DONE_SENTINEL {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
            continue;
        };
        let Some(usage_value) = value.get("usage") else {
            continue;
        };
        if !usage_value.is_object() {
            continue;
        }
        if let Ok(usage) = serde_json::from_value::<Usage>(usage_value.clone()) {
            return Some(usage);
        }
    }
    None
}

/// Split `body` into chunks of at most `limit` bytes on char boundaries.
///
/// An empty body yields a single empty chunk so the end-of-stream marker
/// still has a frame to ride on.
pub fn chunk_body(body: &str, limit: usize) -> Vec<String> {
    if body.len() <= limit {
        return vec![body.to_string()];
    }
    let mut chunks = Vec::new();
    let mut rest = body;
    while rest.len() > limit {
        let mut cut = limit;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // Limit smaller than one char: emit the char whole.
            cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    chunks.push(rest.to_string());
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_inference_director_core::Clock;

    fn context_with_telemetry() -> RequestContext {
        let clock = Clock::new();
        let mut ctx = RequestContext::new(clock.now());
        ctx.ttft_ms = 120;
        ctx.predicted_ttft_ms = 110.0;
        ctx.push_tpot_observation(30.0);
        ctx.push_predicted_tpot(28.0);
        ctx
    }

    #[test]
    fn test_usage_frame_gets_telemetry() {
        let ctx = context_with_telemetry();
        let chunk = "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":4,\"total_tokens\":7}}\n\ndata: [DONE]\n\n";
        let rewritten = rewrite_streaming_chunk(chunk, &ctx);

        let first = rewritten.split("\n\n").next().unwrap();
        let value: serde_json::Value =
            serde_json::from_str(first.strip_prefix("data: ").unwrap()).unwrap();
        let usage = value.get("usage").unwrap();
        assert_eq!(usage["ttft_ms"], 120);
        assert_eq!(usage["predicted_ttft_ms"], 110.0);
        assert_eq!(usage["tpot_observations_ms"], serde_json::json!([30.0]));
        assert_eq!(
            usage["predicted_tpot_observations_ms"],
            serde_json::json!([28.0])
        );
        assert_eq!(usage["avg_tpot_ms"], 30.0);
        assert_eq!(usage["avg_predicted_tpot_ms"], 28.0);
        assert_eq!(usage["prompt_tokens"], 3);
        assert!(rewritten.ends_with("data: [DONE]\n\n"));
    }

    #[test]
    fn test_frames_without_usage_pass_through() {
        let ctx = context_with_telemetry();
        let chunk = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n";
        assert_eq!(rewrite_streaming_chunk(chunk, &ctx), chunk);
    }

    #[test]
    fn test_rewrite_is_idempotent_without_usage() {
        let ctx = context_with_telemetry();
        let chunk = "data: {\"choices\":[]}\n\ndata: [DONE]\n\n";
        let once = rewrite_streaming_chunk(chunk, &ctx);
        let twice = rewrite_streaming_chunk(&once, &ctx);
        assert_eq!(once, twice);
        assert_eq!(once, chunk);
    }

    #[test]
    fn test_malformed_payload_passes_through() {
        let ctx = context_with_telemetry();
        let chunk = "data: {not json}\n\n";
        assert_eq!(rewrite_streaming_chunk(chunk, &ctx), chunk);
    }

    #[test]
    fn test_non_data_lines_are_dropped() {
        let ctx = context_with_telemetry();
        let chunk = ": keep-alive\n\ndata: [DONE]\n\n";
        assert_eq!(rewrite_streaming_chunk(chunk, &ctx), "data: [DONE]\n\n");
    }

    #[test]
    fn test_non_object_usage_passes_through() {
        let ctx = context_with_telemetry();
        let chunk = "data: {\"usage\":null}\n\n";
        assert_eq!(rewrite_streaming_chunk(chunk, &ctx), chunk);
    }

    #[test]
    fn test_capture_usage_requires_done_sentinel() {
        let with_usage =
            "data: {\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":4,\"total_tokens\":7}}\n\n";
        assert!(capture_usage(with_usage).is_none());

        let terminal = format!("{with_usage}data: [DONE]\n\n");
        let usage = capture_usage(&terminal).unwrap();
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.completion_tokens, 4);
        assert_eq!(usage.total_tokens, 7);
    }

    #[test]
    fn test_capture_usage_skips_frames_without_usage() {
        let chunk = "data: {\"choices\":[]}\n\ndata: [DONE]\n\n";
        assert!(capture_usage(chunk).is_none());
    }

    #[test]
    fn test_chunk_body_respects_limit() {
        let body = "abcdefghij";
        let chunks = chunk_body(body, 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
        assert!(chunks.iter().all(|c| c.len() <= 4));
        assert_eq!(chunks.concat(), body);
    }

    #[test]
    fn test_chunk_body_keeps_char_boundaries() {
        let body = "ééééé"; // two bytes per char
        let chunks = chunk_body(body, 3);
        for chunk in &chunks {
            assert!(chunk.len() <= 3);
        }
        assert_eq!(chunks.concat(), body);
    }

    #[test]
    fn test_chunk_body_empty_input() {
        assert_eq!(chunk_body("", 1024), vec![String::new()]);
    }
}
