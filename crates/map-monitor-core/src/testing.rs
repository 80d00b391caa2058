//! Scripted fakes for the pipeline's external collaborators.
//!
//! Pair these with `map_state::fakes` to run the whole pipeline in-process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::completion::{CompletionProvider, CompletionRequest};
use crate::error::{CompletionError, FetchError, NotifyError};
use crate::fetcher::PageFetcher;
use crate::notify::{NotificationChannel, NotificationMessage};

/// Serves canned page content per URL. Unknown URLs fail with a transport
/// error.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, Result<String, String>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, content: &str) -> Self {
        self.pages.insert(url.to_string(), Ok(content.to_string()));
        self
    }

    pub fn failing(mut self, url: &str, error: &str) -> Self {
        self.pages.insert(url.to_string(), Err(error.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url) {
            Some(Ok(content)) => Ok(content.clone()),
            Some(Err(e)) => Err(FetchError::Transport(e.clone())),
            None => Err(FetchError::Transport(format!("no scripted page for {url}"))),
        }
    }
}

/// Replies according to which scripted needle appears in the prompt.
///
/// Since page content is embedded in the prompt, giving each page a unique
/// marker lets one provider answer per listing.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    replies: Vec<(String, Result<String, String>)>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_when(mut self, needle: &str, reply: &str) -> Self {
        self.replies.push((needle.to_string(), Ok(reply.to_string())));
        self
    }

    pub fn fail_when(mut self, needle: &str, error: &str) -> Self {
        self.replies.push((needle.to_string(), Err(error.to_string())));
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let prompt = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        match self
            .replies
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
        {
            Some((_, Ok(reply))) => Ok(reply.clone()),
            Some((_, Err(e))) => Err(CompletionError::Transport(e.clone())),
            None => Err(CompletionError::EmptyResponse),
        }
    }
}

/// Records every message it is asked to send.
#[derive(Debug)]
pub struct RecordingChannel {
    name: String,
    fail: bool,
    attempts: AtomicUsize,
    messages: Mutex<Vec<NotificationMessage>>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            attempts: AtomicUsize::new(0),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// A channel whose every send fails.
    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Messages successfully "delivered".
    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NotifyError::Transport {
                channel: self.name.clone(),
                detail: "scripted failure".to_string(),
            });
        }
        if let Ok(mut sent) = self.messages.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}
