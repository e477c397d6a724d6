use anyhow::{anyhow, Result};
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use crate::providers::traits::TokenStream;

/// Splits a server-sent-events byte stream into `data:` payloads.
///
/// Network chunks can end mid-line (or mid UTF-8 sequence), so bytes are
/// held until a newline arrives.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() && data != "[DONE]" {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }

    /// Whatever is left once the connection closes.
    pub fn finish(&mut self) -> Vec<String> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        self.pending.push(b'\n');
        self.push(&[])
    }
}

/// Concatenates the text parts of the first Gemini candidate.
pub fn gemini_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    Some(text)
}

/// Turns a Gemini `alt=sse` response body into a token stream.
pub fn gemini_sse_stream(response: reqwest::Response) -> TokenStream {
    struct State {
        bytes: futures::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
        buffer: SseBuffer,
        queued: VecDeque<String>,
        done: bool,
    }

    let state = State {
        bytes: response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed(),
        buffer: SseBuffer::default(),
        queued: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.queued.pop_front() {
                let item = serde_json::from_str::<Value>(&payload)
                    .map_err(|e| anyhow!("Invalid stream chunk: {}", e))
                    .and_then(|json| {
                        if let Some(error) = json.get("error") {
                            return Err(anyhow!("API returned error: {}", error));
                        }
                        Ok(gemini_text(&json).unwrap_or_default())
                    });
                match item {
                    Ok(text) if text.is_empty() => continue,
                    other => return Some((other, state)),
                }
            }

            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.buffer.push(&chunk);
                    state.queued.extend(payloads);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(anyhow!("Stream interrupted: {}", e)), state));
                }
                None => {
                    state.done = true;
                    let payloads = state.buffer.finish();
                    state.queued.extend(payloads);
                }
            }
        }
    })
    .boxed()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(anyhow!(
            "Vector dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        ));
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}
