//! Line buffering for streamed HTTP bodies.
//!
//! Providers emit newline-delimited records (NDJSON for Ollama, SSE for
//! OpenAI) but network chunks do not respect line boundaries.

use askdoc_core::{AppError, AppResult};
use futures::{Stream, StreamExt};

/// Convert a byte stream into a stream of complete, non-blank lines.
///
/// A trailing line without a newline is emitted when the body ends.
pub(crate) fn stream_lines<S, B>(byte_stream: S) -> impl Stream<Item = AppResult<String>> + Send
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]>,
{
    futures::stream::unfold(
        (Box::pin(byte_stream), String::new(), false),
        |(mut stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(newline_pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline_pos).collect();
                    let line = line.trim_end_matches(['\r', '\n']).to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(bytes.as_ref()));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(AppError::Llm(format!("Stream read error: {}", e))),
                            (stream, buffer, true),
                        ));
                    }
                    None => {
                        if buffer.trim().is_empty() {
                            return None;
                        }
                        let remaining = std::mem::take(&mut buffer);
                        return Some((Ok(remaining), (stream, buffer, true)));
                    }
                }
            }
        },
    )
}
