//! Chunked byte-range delivery from media files on disk.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::Stream;
use futures::stream::{self, BoxStream};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::config::StreamingConfig;
use crate::range::RangeWindow;

/// Fallback MIME type when the storage path has no recognizable extension.
const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Errors that can occur opening or draining a media stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The media file is absent. A race against the content lookup;
    /// retryable by the client, not fatal to the process.
    #[error("Media resource not found: {locator}")]
    NotFound { locator: String },

    #[error("Media I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Response framing derived from the byte window.
///
/// A strict sub-range is served as `206 Partial Content` with a
/// `Content-Range` header; the full window as `200 OK` without one.
/// `Accept-Ranges: bytes` is always advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFraming {
    pub partial: bool,
    pub start: u64,
    pub end: u64,
    pub total: u64,
    pub content_type: String,
}

impl ResponseFraming {
    fn for_window(window: RangeWindow, content_type: String) -> Self {
        Self {
            partial: window.is_partial(),
            start: window.start,
            end: window.end,
            total: window.total,
            content_type,
        }
    }

    /// Window size in bytes; the `Content-Length` of the response.
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value, present only on partial responses.
    pub fn content_range(&self) -> Option<String> {
        self.partial
            .then(|| format!("bytes {}-{}/{}", self.start, self.end, self.total))
    }
}

/// An open, ready-to-drain media stream.
///
/// The chunk stream is lazy, finite, and non-restartable; dropping it
/// mid-drain releases the underlying file handle without error.
pub struct MediaStream {
    framing: ResponseFraming,
    chunks: BoxStream<'static, Result<Bytes, std::io::Error>>,
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("framing", &self.framing)
            .finish_non_exhaustive()
    }
}

impl MediaStream {
    pub fn framing(&self) -> &ResponseFraming {
        &self.framing
    }

    /// Consumes the handle, yielding the body chunk stream.
    pub fn into_chunks(self) -> BoxStream<'static, Result<Bytes, std::io::Error>> {
        self.chunks
    }
}

/// Opens media files and produces framed byte-range streams.
pub struct MediaStreamer {
    media_root: PathBuf,
    chunk_size: usize,
}

impl MediaStreamer {
    pub fn new(config: &StreamingConfig) -> Self {
        Self {
            media_root: config.media_root.clone(),
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Opens the media file at `locator` positioned on `window`.
    ///
    /// Relative locators resolve against the configured media root;
    /// absolute locators are used as-is.
    ///
    /// # Errors
    ///
    /// - `StreamError::NotFound` - File is absent at the resolved path
    /// - `StreamError::Io` - File cannot be opened or positioned
    pub async fn open(&self, locator: &str, window: RangeWindow) -> Result<MediaStream, StreamError> {
        let path = self.resolve(locator);
        debug!(path = %path.display(), start = window.start, end = window.end, "Opening media stream");

        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StreamError::NotFound {
                    locator: locator.to_string(),
                });
            }
            Err(e) => return Err(StreamError::Io(e)),
        };

        file.seek(SeekFrom::Start(window.start)).await?;

        let framing = ResponseFraming::for_window(window, content_type_for(&path));
        let chunks = Box::pin(chunk_stream(file, window.size(), self.chunk_size));

        Ok(MediaStream { framing, chunks })
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.media_root.join(path)
        }
    }
}

/// Determines the response content type from the storage path extension.
fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Lazy chunk stream emitting exactly `remaining` bytes from `file`.
///
/// The byte accounting doubles as the close-time invariant: hitting EOF
/// with bytes still owed yields a terminal error so the response is
/// visibly aborted, never silently truncated.
fn chunk_stream(
    file: File,
    remaining: u64,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    stream::unfold(
        Some((file, remaining)),
        move |state| async move {
            let (mut file, remaining) = state?;
            if remaining == 0 {
                return None;
            }

            let target = remaining.min(chunk_size as u64) as usize;
            let mut buffer = vec![0u8; target];

            match file.read(&mut buffer).await {
                Ok(0) => {
                    warn!(missing = remaining, "Media file ended before the window was served");
                    Some((
                        Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!("media file ended with {remaining} bytes still owed"),
                        )),
                        None,
                    ))
                }
                Ok(read) => {
                    buffer.truncate(read);
                    Some((
                        Ok(Bytes::from(buffer)),
                        Some((file, remaining - read as u64)),
                    ))
                }
                Err(e) => Some((Err(e), None)),
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use futures::StreamExt;
    use tempfile::TempDir;

    use super::*;

    fn streamer_for(root: &TempDir, chunk_size: usize) -> MediaStreamer {
        MediaStreamer::new(&StreamingConfig {
            media_root: root.path().to_path_buf(),
            chunk_size,
        })
    }

    fn write_media(root: &TempDir, name: &str, data: &[u8]) {
        let mut file = std::fs::File::create(root.path().join(name)).unwrap();
        file.write_all(data).unwrap();
    }

    async fn drain(stream: MediaStream) -> Result<Vec<u8>, std::io::Error> {
        let mut chunks = stream.into_chunks();
        let mut collected = Vec::new();
        while let Some(chunk) = chunks.next().await {
            collected.extend_from_slice(&chunk?);
        }
        Ok(collected)
    }

    #[tokio::test]
    async fn test_full_window_emits_entire_file() {
        let root = TempDir::new().unwrap();
        let data: Vec<u8> = (0..=255).cycle().take(1000).map(|b| b as u8).collect();
        write_media(&root, "movie.mp4", &data);

        let streamer = streamer_for(&root, 64);
        let stream = streamer
            .open("movie.mp4", RangeWindow::full(1000))
            .await
            .unwrap();

        assert!(!stream.framing().partial);
        assert_eq!(stream.framing().content_length(), 1000);
        assert_eq!(stream.framing().content_range(), None);
        assert_eq!(stream.framing().content_type, "video/mp4");

        assert_eq!(drain(stream).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_partial_window_emits_exact_slice() {
        let root = TempDir::new().unwrap();
        let data: Vec<u8> = (0..1000u64).map(|b| (b % 251) as u8).collect();
        write_media(&root, "movie.mp4", &data);

        let streamer = streamer_for(&root, 30);
        let window = RangeWindow {
            start: 500,
            end: 699,
            total: 1000,
        };
        let stream = streamer.open("movie.mp4", window).await.unwrap();

        assert!(stream.framing().partial);
        assert_eq!(stream.framing().content_length(), 200);
        assert_eq!(
            stream.framing().content_range().as_deref(),
            Some("bytes 500-699/1000")
        );

        assert_eq!(drain(stream).await.unwrap(), &data[500..=699]);
    }

    #[tokio::test]
    async fn test_emitted_byte_count_matches_window_size() {
        let root = TempDir::new().unwrap();
        write_media(&root, "movie.mkv", &vec![7u8; 4096]);

        let streamer = streamer_for(&root, 100);
        for (start, end) in [(0, 0), (0, 4095), (1, 4095), (100, 299), (4095, 4095)] {
            let window = RangeWindow {
                start,
                end,
                total: 4096,
            };
            let stream = streamer.open("movie.mkv", window).await.unwrap();
            let body = drain(stream).await.unwrap();
            assert_eq!(body.len() as u64, end - start + 1, "window {start}-{end}");
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let root = TempDir::new().unwrap();
        let streamer = streamer_for(&root, 64);

        let result = streamer.open("ghost.mp4", RangeWindow::full(10)).await;
        match result {
            Err(StreamError::NotFound { locator }) => assert_eq!(locator, "ghost.mp4"),
            other => panic!("Expected NotFound, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_short_file_yields_terminal_error_not_silence() {
        let root = TempDir::new().unwrap();
        // The content service believes the file has 1000 bytes; only 400
        // made it to disk.
        write_media(&root, "movie.mp4", &vec![1u8; 400]);

        let streamer = streamer_for(&root, 128);
        let stream = streamer
            .open("movie.mp4", RangeWindow::full(1000))
            .await
            .unwrap();

        let mut chunks = stream.into_chunks();
        let mut served = 0usize;
        let mut saw_error = false;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => served += bytes.len(),
                Err(e) => {
                    assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof);
                    saw_error = true;
                }
            }
        }

        assert_eq!(served, 400);
        assert!(saw_error, "shortfall must surface as an error");
    }

    #[tokio::test]
    async fn test_early_drop_releases_stream_cleanly() {
        let root = TempDir::new().unwrap();
        write_media(&root, "movie.mp4", &vec![9u8; 2048]);

        let streamer = streamer_for(&root, 16);
        let stream = streamer
            .open("movie.mp4", RangeWindow::full(2048))
            .await
            .unwrap();

        let mut chunks = stream.into_chunks();
        let first = chunks.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 16);
        // Consumer disconnects here; dropping the stream is the whole test.
        drop(chunks);
    }

    #[tokio::test]
    async fn test_absolute_locator_bypasses_media_root() {
        let root = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        write_media(&elsewhere, "direct.webm", &vec![3u8; 64]);

        let streamer = streamer_for(&root, 32);
        let locator = elsewhere.path().join("direct.webm");
        let stream = streamer
            .open(locator.to_str().unwrap(), RangeWindow::full(64))
            .await
            .unwrap();

        assert_eq!(stream.framing().content_type, "video/webm");
        assert_eq!(drain(stream).await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_unknown_extension_defaults_to_mp4() {
        let root = TempDir::new().unwrap();
        write_media(&root, "movie.stream", &vec![5u8; 10]);

        let streamer = streamer_for(&root, 8);
        let stream = streamer
            .open("movie.stream", RangeWindow::full(10))
            .await
            .unwrap();

        assert_eq!(stream.framing().content_type, "video/mp4");
    }
}
