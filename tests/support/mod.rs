//! Shared helpers for engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use down_core::{DownError, DownResult, Source, SourceResponse};
use futures::stream::{self, StreamExt};
use url::Url;

/// One step of a scripted response body
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver these bytes
    Data(Bytes),
    /// Fail the read with an I/O error
    Fail(&'static str),
    /// Never deliver anything again
    Stall,
    /// Wait this long, then continue with the next step
    Delay(Duration),
}

/// In-memory [`Source`] that replays a fixed script for every URL
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    content_length: Option<u64>,
    steps: Vec<Step>,
    chunk_delay: Duration,
    open_delay: Duration,
    open_error: Option<(u16, &'static str)>,
    opened: Arc<Mutex<Vec<Url>>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            content_length: None,
            steps,
            chunk_delay: Duration::ZERO,
            open_delay: Duration::ZERO,
            open_error: None,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Body of `total` bytes split into chunks of `chunk` bytes, with a matching length
    pub fn sized(total: usize, chunk: usize) -> Self {
        let data = pattern(total);
        let steps = data
            .chunks(chunk)
            .map(|c| Step::Data(Bytes::copy_from_slice(c)))
            .collect();
        Self::new(steps).with_content_length(Some(total as u64))
    }

    pub fn with_content_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_open_error(mut self, status: u16, message: &'static str) -> Self {
        self.open_error = Some((status, message));
        self
    }

    pub fn opened(&self) -> Vec<Url> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Source for ScriptedSource {
    async fn open(&self, url: &Url) -> DownResult<SourceResponse> {
        self.opened.lock().unwrap().push(url.clone());

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if let Some((status, message)) = self.open_error {
            return Err(DownError::server_error(status, message));
        }

        let delay = self.chunk_delay;
        let body = stream::iter(self.steps.clone())
            .then(move |step| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                step
            })
            .flat_map(|step| match step {
                Step::Data(bytes) => stream::once(async move { Ok::<_, DownError>(bytes) }).boxed(),
                Step::Fail(message) => {
                    stream::once(async move { Err(DownError::IoError(std::io::Error::other(message))) })
                        .boxed()
                }
                Step::Stall => stream::pending::<DownResult<Bytes>>().boxed(),
                Step::Delay(pause) => stream::once(tokio::time::sleep(pause))
                    .filter_map(|_| async { None::<DownResult<Bytes>> })
                    .boxed(),
            })
            .boxed();

        Ok(SourceResponse {
            content_length: self.content_length,
            body,
        })
    }
}

/// Serves `/<seed>/<len>.bin` as `seeded_pattern(len, seed)` in slow chunks
#[derive(Debug, Clone)]
pub struct PatternSource {
    chunk: usize,
    delay: Duration,
}

impl PatternSource {
    pub fn new(chunk: usize, delay: Duration) -> Self {
        Self { chunk, delay }
    }

    pub fn url(seed: u8, len: usize) -> String {
        format!("http://pattern.test/{}/{}.bin", seed, len)
    }
}

#[async_trait]
impl Source for PatternSource {
    async fn open(&self, url: &Url) -> DownResult<SourceResponse> {
        let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
        let seed: u8 = segments[0].parse().unwrap();
        let len: usize = segments[1].trim_end_matches(".bin").parse().unwrap();

        let data = seeded_pattern(len, seed);
        let delay = self.delay;
        let chunks: Vec<Bytes> = data.chunks(self.chunk).map(Bytes::copy_from_slice).collect();
        let body = stream::iter(chunks)
            .then(move |chunk| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, DownError>(chunk)
            })
            .boxed();

        Ok(SourceResponse {
            content_length: Some(len as u64),
            body,
        })
    }
}

/// Deterministic test payload of `len` bytes
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Same payload, but distinct per `seed`
pub fn seeded_pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i % 251) as u8).wrapping_add(seed))
        .collect()
}
