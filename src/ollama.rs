use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct GenerateChunk {
    pub response: String,
    pub done: bool,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Start a streaming generation. The returned stream yields fragments in
    /// the order the backend produced them; it is finite and consumed once.
    pub async fn generate_stream(&self, model: &str, prompt: &str) -> Result<FragmentStream> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: true,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Ollama request failed with status: {}. Make sure Ollama is running with: ollama serve",
                response.status()
            ));
        }

        Ok(FragmentStream {
            bytes: response.bytes_stream().boxed(),
            decoder: ChunkDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        })
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }
}

/// Text fragments decoded from a streaming `/api/generate` response.
pub struct FragmentStream {
    bytes: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    decoder: ChunkDecoder,
    pending: VecDeque<GenerateChunk>,
    done: bool,
}

impl FragmentStream {
    /// The next fragment, or `None` once the backend reported `done` (or the
    /// connection closed). A decode or transport error ends the stream.
    pub async fn next(&mut self) -> Option<Result<String>> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                if chunk.done {
                    self.done = true;
                }
                if !chunk.response.is_empty() {
                    return Some(Ok(chunk.response));
                }
                continue;
            }

            if self.done {
                return None;
            }

            match self.bytes.next().await {
                Some(Ok(bytes)) => match self.decoder.feed(&bytes) {
                    Ok(chunks) => self.pending.extend(chunks),
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

/// Incremental NDJSON decoder. Ollama writes one JSON object per line, but
/// HTTP chunk boundaries land anywhere, even inside a multi-byte character,
/// so raw bytes are buffered and only complete lines are UTF-8 decoded.
#[derive(Default)]
struct ChunkDecoder {
    buffer: Vec<u8>,
}

impl ChunkDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<GenerateChunk>> {
        self.buffer.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            chunks.push(serde_json::from_slice(line)?);
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_lines() {
        let mut decoder = ChunkDecoder::default();
        let chunks = decoder
            .feed(b"{\"response\":\"Hel\",\"done\":false}\n{\"response\":\"lo\",\"done\":false}\n")
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].response, "Hel");
        assert_eq!(chunks[1].response, "lo");
    }

    #[test]
    fn holds_partial_line_until_newline_arrives() {
        let mut decoder = ChunkDecoder::default();
        let first = decoder.feed(b"{\"response\":\"Hi\",\"do").unwrap();
        assert!(first.is_empty());

        let second = decoder.feed(b"ne\":false}\n").unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].response, "Hi");
        assert!(!second[0].done);
    }

    #[test]
    fn fragment_survives_split_inside_a_multibyte_character() {
        // "é" is 0xC3 0xA9; the chunk boundary falls between the two bytes.
        let line = "{\"response\":\"caf\u{e9}\",\"done\":false}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = ChunkDecoder::default();
        let first = decoder.feed(&line[..split]).unwrap();
        assert!(first.is_empty());

        let second = decoder.feed(&line[split..]).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].response, "caf\u{e9}");
    }

    #[test]
    fn final_chunk_carries_done_flag() {
        let mut decoder = ChunkDecoder::default();
        let chunks = decoder.feed(b"{\"response\":\"\",\"done\":true}\n").unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].done);
        assert!(chunks[0].response.is_empty());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut decoder = ChunkDecoder::default();
        let chunks = decoder
            .feed(b"\n{\"response\":\"a\",\"done\":false}\n\n")
            .unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn malformed_line_is_an_error() {
        let mut decoder = ChunkDecoder::default();
        assert!(decoder.feed(b"not json\n").is_err());
    }

    #[test]
    fn extra_fields_are_ignored() {
        let mut decoder = ChunkDecoder::default();
        let chunks = decoder
            .feed(b"{\"model\":\"llama3.2\",\"response\":\"x\",\"done\":false,\"created_at\":\"now\"}\n")
            .unwrap();
        assert_eq!(chunks[0].response, "x");
    }
}
