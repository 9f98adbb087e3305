//! Answer generation providers.
//!
//! Both providers stream: [`OllamaGenerator`] reads newline-delimited JSON
//! from `/api/chat`, [`OpenAIGenerator`] reads server-sent events from
//! `/v1/chat/completions`. A non-streaming answer is the concatenation of
//! the stream (see [`Generator::generate`]).

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::{future, Stream, StreamExt, TryStreamExt};
use std::sync::Arc;

use notes_rag_core::generate::{FragmentStream, Generator};

use crate::config::GenerationConfig;
use crate::http;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

// ============ Ollama ============

pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    url: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http::streaming_client(config.timeout_secs)?,
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
        });
        let endpoint = http::endpoint(&self.url, "/api/chat");
        let response = http::send_with_retry(
            || self.client.post(&endpoint).json(&body),
            0,
            "Ollama",
        )
        .await
        .map_err(|e| anyhow!("{:#} (is Ollama running at {}?)", e, self.url))?;

        let fragments = response_lines(response)
            .try_filter_map(|line| future::ready(parse_ollama_line(&line)));
        Ok(Box::pin(stop_after_error(fragments)))
    }
}

/// One NDJSON object → its `message.content`, if non-empty.
fn parse_ollama_line(line: &str) -> Result<Option<String>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let json: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| anyhow!("Invalid Ollama stream line: {}", e))?;
    if let Some(error) = json.get("error").and_then(|e| e.as_str()) {
        bail!("Ollama error: {}", error);
    }
    Ok(json
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(str::to_string))
}

// ============ OpenAI ============

/// Chat completions over SSE. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    model: String,
    url: String,
    api_key: String,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http::streaming_client(config.timeout_secs)?,
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
        });
        let endpoint = http::endpoint(&self.url, "/v1/chat/completions");
        let response = http::send_with_retry(
            || {
                self.client
                    .post(&endpoint)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            },
            0,
            "OpenAI",
        )
        .await?;

        let fragments = response_lines(response)
            .try_take_while(|line| {
                future::ready(Ok::<bool, anyhow::Error>(line.trim() != "data: [DONE]"))
            })
            .try_filter_map(|line| future::ready(parse_sse_line(&line)));
        Ok(Box::pin(stop_after_error(fragments)))
    }
}

/// One SSE line → `choices[0].delta.content`, if present.
fn parse_sse_line(line: &str) -> Result<Option<String>> {
    let payload = match line.trim().strip_prefix("data:") {
        Some(payload) => payload.trim(),
        None => return Ok(None),
    };
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }
    let json: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| anyhow!("Invalid OpenAI stream event: {}", e))?;
    if let Some(message) = json.pointer("/error/message").and_then(|m| m.as_str()) {
        bail!("OpenAI error: {}", message);
    }
    Ok(json
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(str::to_string))
}

// ============ Streaming plumbing ============

/// Split a response body into lines without the trailing `\r\n`.
fn response_lines(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    let bytes = Box::pin(response.bytes_stream());
    futures::stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, mut done)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    return Some((Ok(text), (bytes, buffer, done)));
                }
                if done {
                    if buffer.is_empty() {
                        return None;
                    }
                    let text = String::from_utf8_lossy(&buffer).trim_end().to_string();
                    buffer.clear();
                    return Some((Ok(text), (bytes, buffer, done)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        return Some((
                            Err(anyhow!("answer stream interrupted: {}", e)),
                            (bytes, Vec::new(), true),
                        ))
                    }
                    None => done = true,
                }
            }
        },
    )
}

/// End the stream right after its first error.
fn stop_after_error<S>(stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<String>> + Send,
{
    stream.scan(false, |failed, item| {
        if *failed {
            return future::ready(None);
        }
        *failed = item.is_err();
        future::ready(Some(item))
    })
}

/// Build the configured [`Generator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notes_rag_core::generate::collect_fragments;

    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Serve one `/api/chat` request, sending each fragment as its own
    /// NDJSON chunk after waiting `gap`.
    async fn slow_ollama(fragments: Vec<&'static str>, gap: Duration) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\n\
                      transfer-encoding: chunked\r\nconnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for fragment in fragments {
                tokio::time::sleep(gap).await;
                let line = format!("{{\"message\":{{\"content\":\"{}\"}}}}\n", fragment);
                let chunk = format!("{:x}\r\n{}\r\n", line.len(), line);
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });
        format!("http://{}", addr)
    }

    fn ollama_at(url: String, timeout_secs: u64) -> OllamaGenerator {
        OllamaGenerator::new(&GenerationConfig {
            url: Some(url),
            timeout_secs,
            ..GenerationConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_stream_may_outlast_timeout() {
        let url = slow_ollama(vec!["a", "b", "c", "d"], Duration::from_millis(400)).await;
        let answer = ollama_at(url, 1).generate("q").await.unwrap();
        assert_eq!(answer, "abcd");
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let url = slow_ollama(vec!["a", "b"], Duration::from_millis(2500)).await;
        let err = ollama_at(url, 1).generate("q").await.unwrap_err();
        assert!(err.to_string().contains("answer stream interrupted"));
    }

    #[test]
    fn test_parse_ollama_line() {
        let line = r#"{"model":"m","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        assert_eq!(parse_ollama_line(line).unwrap(), Some("Hel".to_string()));
        let last = r#"{"model":"m","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(parse_ollama_line(last).unwrap(), None);
        assert_eq!(parse_ollama_line("   ").unwrap(), None);
        assert!(parse_ollama_line(r#"{"error":"model not found"}"#).is_err());
    }

    #[test]
    fn test_parse_sse_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), Some("lo".to_string()));
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), None);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), None);
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only).unwrap(), None);
    }

    #[tokio::test]
    async fn test_stop_after_error() {
        let items = vec![
            Ok("a".to_string()),
            Err(anyhow!("boom")),
            Ok("b".to_string()),
        ];
        let stream = stop_after_error(futures::stream::iter(items));
        let collected: Vec<Result<String>> = stream.collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected[1].is_err());
    }

    #[tokio::test]
    async fn test_ndjson_fragments_concatenate() {
        let lines = vec![
            Ok(r#"{"message":{"content":"The "}}"#.to_string()),
            Ok(r#"{"message":{"content":"answer."}}"#.to_string()),
            Ok(r#"{"message":{"content":""},"done":true}"#.to_string()),
        ];
        let fragments = futures::stream::iter(lines)
            .try_filter_map(|line| future::ready(parse_ollama_line(&line)));
        let answer = collect_fragments(Box::pin(stop_after_error(fragments)))
            .await
            .unwrap();
        assert_eq!(answer, "The answer.");
    }
}
