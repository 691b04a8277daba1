//! Replay client
//!
//! Answers every script with the same pre-fetched annotated CSV result.
//! Used to run the full query path offline and in tests.

use super::{AnnotatedCsvRows, Rows, StoreClient, StoreResult};
use async_trait::async_trait;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// A store session backed by a saved result
#[derive(Debug)]
pub struct ReplayClient {
    body: Vec<u8>,
    submitted: Mutex<Vec<String>>,
}

impl ReplayClient {
    /// Replay the given annotated CSV text
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Replay a result file
    pub fn from_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }

    /// Scripts submitted so far, oldest first
    pub fn submitted(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl StoreClient for ReplayClient {
    fn name(&self) -> &str {
        "replay"
    }

    async fn query(&self, _org: &str, script: &str) -> StoreResult<Rows> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(script.to_string());
        let rows = AnnotatedCsvRows::new(Cursor::new(self.body.clone()));
        Ok(Box::new(rows))
    }
}
