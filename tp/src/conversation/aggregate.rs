//! Stream aggregation
//!
//! Turns the engine's fragment stream into progressive snapshots and one final
//! text. Fragments are opaque: they are concatenated in arrival order with no
//! assumption about token or sentence boundaries.

use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};

use super::messages::TurnError;
use crate::engine::ChunkStream;

/// Prefix of every assistant turn synthesized from a failure
pub const ERROR_PREFIX: &str = "Sorry, I encountered an error: ";

/// User-visible content for a failed turn
pub fn error_content(err: &TurnError) -> String {
    format!("{ERROR_PREFIX}{err}")
}

/// Consumes engine streams, bounding each wait for the next fragment
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamAggregator {
    chunk_timeout: Option<Duration>,
}

impl StreamAggregator {
    pub fn new(chunk_timeout: Option<Duration>) -> Self {
        Self { chunk_timeout }
    }

    /// Longest wait for the engine, per call and per chunk
    pub fn chunk_timeout(&self) -> Option<Duration> {
        self.chunk_timeout
    }

    /// Begin consuming one run's stream
    pub fn run(&self, stream: ChunkStream) -> Aggregation {
        debug!(chunk_timeout = ?self.chunk_timeout, "run: called");
        Aggregation {
            stream,
            text: String::new(),
            chunk_timeout: self.chunk_timeout,
            chunks: 0,
        }
    }
}

/// One run in progress
pub struct Aggregation {
    stream: ChunkStream,
    text: String,
    chunk_timeout: Option<Duration>,
    chunks: usize,
}

impl Aggregation {
    /// Wait for the next fragment and return the text accumulated so far
    ///
    /// `Ok(None)` once the stream is exhausted. An engine failure or a timeout
    /// ends the run; the partial text is not part of the error.
    pub async fn next_snapshot(&mut self) -> Result<Option<&str>, TurnError> {
        let next = match self.chunk_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(chunks = self.chunks, ?limit, "next_snapshot: timed out waiting for chunk");
                    return Err(TurnError::Timeout(limit));
                }
            },
            None => self.stream.next().await,
        };

        match next {
            Some(Ok(chunk)) => {
                self.chunks += 1;
                self.text.push_str(&chunk);
                Ok(Some(self.text.as_str()))
            }
            Some(Err(e)) => {
                debug!(chunks = self.chunks, error = %e, "next_snapshot: engine failed mid-stream");
                Err(TurnError::Engine(e))
            }
            None => {
                debug!(chunks = self.chunks, len = self.text.len(), "next_snapshot: stream exhausted");
                Ok(None)
            }
        }
    }

    /// Text accumulated so far
    pub fn snapshot(&self) -> &str {
        &self.text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Drain the rest of the stream and return the full text
    pub async fn finish(mut self) -> Result<String, TurnError> {
        while self.next_snapshot().await?.is_some() {}
        Ok(self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use proptest::prelude::*;

    fn stream_of(items: Vec<Result<String, EngineError>>) -> ChunkStream {
        futures::stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_snapshots_accumulate() {
        let mut agg = StreamAggregator::default().run(stream_of(vec![
            Ok("Par".to_string()),
            Ok("is".to_string()),
            Ok("!".to_string()),
        ]));

        assert_eq!(agg.next_snapshot().await.unwrap(), Some("Par"));
        assert_eq!(agg.next_snapshot().await.unwrap(), Some("Paris"));
        assert_eq!(agg.next_snapshot().await.unwrap(), Some("Paris!"));
        assert_eq!(agg.next_snapshot().await.unwrap(), None);
        assert_eq!(agg.chunk_count(), 3);
        assert_eq!(agg.snapshot(), "Paris!");
    }

    #[tokio::test]
    async fn test_engine_failure_is_reported() {
        let agg = StreamAggregator::default().run(stream_of(vec![
            Ok("partial".to_string()),
            Err(EngineError::Failed("flight search unavailable".to_string())),
        ]));

        let err = agg.finish().await.unwrap_err();
        assert!(matches!(err, TurnError::Engine(_)));
        assert_eq!(
            error_content(&err),
            "Sorry, I encountered an error: flight search unavailable"
        );
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let stalled = futures::stream::pending::<Result<String, EngineError>>().boxed();
        let agg = StreamAggregator::new(Some(Duration::from_millis(20))).run(stalled);

        let err = agg.finish().await.unwrap_err();
        assert!(matches!(err, TurnError::Timeout(d) if d == Duration::from_millis(20)));
        assert!(error_content(&err).starts_with(ERROR_PREFIX));
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let agg = StreamAggregator::default().run(stream_of(vec![]));
        assert_eq!(agg.finish().await.unwrap(), "");
    }

    proptest! {
        #[test]
        fn prop_final_text_is_concatenation(chunks in proptest::collection::vec(".{0,8}", 0..16)) {
            let expected: String = chunks.concat();
            let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
            let text = rt.block_on(async {
                let items = chunks.into_iter().map(Ok).collect();
                StreamAggregator::new(Some(Duration::from_secs(5))).run(stream_of(items)).finish().await
            }).unwrap();
            prop_assert_eq!(text, expected);
        }
    }
}
