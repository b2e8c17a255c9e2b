//! Decoding of newline-delimited streaming responses
//!
//! The Open Match gateway renders server streams as one JSON object per line,
//! each either `{"result": ...}` or `{"error": {...}}`.

use super::messages::StreamFrame;
use crate::error::{MatchmakingError, Result};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;

/// Boxed stream of decoded results
pub type ResultStream<T> = BoxStream<'static, Result<T>>;

/// Decode a single frame
pub fn decode_frame<T: DeserializeOwned>(line: &[u8]) -> Result<T> {
    let frame: StreamFrame<T> = serde_json::from_slice(line).map_err(|e| {
        MatchmakingError::RemoteStream {
            message: format!("malformed stream frame: {}", e),
        }
    })?;

    if let Some(error) = frame.error {
        return Err(MatchmakingError::RemoteStream {
            message: format!("{} (http {})", error.message, error.http_code),
        }
        .into());
    }

    frame.result.ok_or_else(|| {
        MatchmakingError::RemoteStream {
            message: "stream frame carries neither result nor error".to_string(),
        }
        .into()
    })
}

/// Decode every frame of a fully buffered body
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>> {
    body.split(|b| *b == b'\n')
        .filter(|line| !is_blank(line))
        .map(decode_frame)
        .collect()
}

/// Turn a chunked byte stream into a stream of decoded frames.
///
/// Frames may span chunks. A transport error ends the stream after being yielded.
pub fn decode_stream<S, B, E, T>(bytes: S) -> ResultStream<T>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
{
    let state = (bytes.boxed(), Vec::<u8>::new(), false);

    stream::unfold(state, |(mut bytes, mut buffer, mut done)| async move {
        loop {
            if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if is_blank(&line) {
                    continue;
                }
                return Some((decode_frame(&line), (bytes, buffer, done)));
            }

            if done {
                if is_blank(&buffer) {
                    return None;
                }
                let line = std::mem::take(&mut buffer);
                return Some((decode_frame(&line), (bytes, buffer, done)));
            }

            match bytes.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    buffer.clear();
                    let error = anyhow::Error::new(e).context("stream transport failed");
                    return Some((Err(error), (bytes, buffer, true)));
                }
                None => done = true,
            }
        }
    })
    .boxed()
}

/// Decode a streamed HTTP response
pub fn decode_response<T>(response: reqwest::Response) -> ResultStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    decode_stream(response.bytes_stream())
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        n: u32,
    }

    fn chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, std::io::Error>> {
        let owned: Vec<_> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    #[test]
    fn test_decode_body() {
        let body = b"{\"result\":{\"n\":1}}\n\n{\"result\":{\"n\":2}}\n";
        let items: Vec<Item> = decode_body(body).unwrap();
        assert_eq!(items, vec![Item { n: 1 }, Item { n: 2 }]);
    }

    #[test]
    fn test_error_frame() {
        let err = decode_frame::<Item>(br#"{"error":{"grpc_code":2,"http_code":500,"message":"mmf failed"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("mmf failed"));
    }

    #[test]
    fn test_frame_without_result_or_error() {
        let err = decode_frame::<Item>(b"{}").unwrap_err();
        assert!(err.to_string().contains("neither result nor error"));

        let err = decode_frame::<Item>(br#"{"error":{"http_code":503,"message":"unavailable"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let stream = decode_stream::<_, _, _, Item>(chunks(&[
            "{\"result\":{\"n\"",
            ":1}}\n{\"resu",
            "lt\":{\"n\":2}}",
        ]));

        let items: Vec<Item> = stream.try_collect().await.unwrap();
        assert_eq!(items, vec![Item { n: 1 }, Item { n: 2 }]);
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"{\"result\":{\"n\":1}}\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "reset")),
            Ok(b"{\"result\":{\"n\":2}}\n".to_vec()),
        ];
        let mut stream = decode_stream::<_, _, _, Item>(stream::iter(parts));

        assert_eq!(stream.next().await.unwrap().unwrap(), Item { n: 1 });
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
