use async_trait::async_trait;

use super::{ChunkConnector, ChunkSource, VecSource};
use crate::errors::TransportError;

/// Replays recorded stream text, split into chunks of at most `chunk_size`
/// bytes. Every attempt sees the same chunks.
#[derive(Debug, Clone)]
pub struct ReplayConnector {
    chunks: Vec<String>,
}

impl ReplayConnector {
    pub fn new(text: &str, chunk_size: usize) -> Self {
        Self {
            chunks: split_chunks(text, chunk_size),
        }
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }
}

#[async_trait]
impl ChunkConnector for ReplayConnector {
    async fn connect(&self, _attempt: u32) -> Result<Box<dyn ChunkSource>, TransportError> {
        Ok(Box::new(VecSource::new(self.chunks.clone())))
    }
}

/// Split `text` into pieces of at most `size` bytes without cutting a
/// character. A character wider than `size` gets a chunk of its own.
pub fn split_chunks(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let mut end = size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head.to_string());
        rest = tail;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ascii() {
        assert_eq!(split_chunks("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(split_chunks("", 3), Vec::<String>::new());
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "aé€😀b";
        for size in 1..8 {
            let chunks = split_chunks(text, size);
            assert_eq!(chunks.concat(), text);
            assert!(chunks.iter().all(|c| !c.is_empty()));
        }
    }

    #[test]
    fn test_zero_size_is_one_char() {
        assert_eq!(split_chunks("ab", 0), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_each_attempt_replays_everything() {
        let connector = ReplayConnector::new("hello world", 4);
        for attempt in 0..2 {
            let mut source = connector.connect(attempt).await.unwrap();
            let mut text = String::new();
            while let Some(chunk) = source.next_chunk().await.unwrap() {
                text.push_str(&chunk);
            }
            assert_eq!(text, "hello world");
        }
    }
}
