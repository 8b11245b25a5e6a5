//! Scripted in-memory storage client for pool tests

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use storage::{FileSource, Result, StorageClient, StorageError, UploadReceipt};

/// Canned upload response for one attempt.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Ok(&'static str),
    Quota,
    Auth,
    Transient,
    /// Never completes within any sane timeout
    Hang,
}

impl Reply {
    fn into_result(self, token: &str) -> Result<UploadReceipt> {
        match self {
            Reply::Ok(link) => Ok(UploadReceipt {
                link: link.to_string(),
                content_id: Some(format!("content-{token}")),
            }),
            Reply::Quota => Err(StorageError::Quota("error-trafficLimit".into())),
            Reply::Auth => Err(StorageError::Auth("error-auth".into())),
            Reply::Transient => Err(StorageError::Transient("connection reset".into())),
            Reply::Hang => unreachable!("hang is handled before conversion"),
        }
    }
}

/// Storage client driven by per-token scripts.
///
/// Each token has a queue of upload replies; the last reply repeats once the
/// queue is down to one. Identity and usage lookups come from fixed maps.
#[derive(Default)]
pub(crate) struct ScriptedStorage {
    uploads: Mutex<HashMap<String, VecDeque<Reply>>>,
    identities: Mutex<HashMap<String, Result<String>>>,
    usage: Mutex<HashMap<String, Result<Value>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn uploads(self, token: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.uploads
            .lock()
            .unwrap()
            .insert(token.to_string(), replies.into_iter().collect());
        self
    }

    pub(crate) fn identity(self, token: &str, result: Result<String>) -> Self {
        self.identities
            .lock()
            .unwrap()
            .insert(token.to_string(), result);
        self
    }

    pub(crate) fn usage(self, account_id: &str, result: Result<Value>) -> Self {
        self.set_usage(account_id, result);
        self
    }

    /// Replace the usage document served for `account_id`.
    pub(crate) fn set_usage(&self, account_id: &str, result: Result<Value>) {
        self.usage
            .lock()
            .unwrap()
            .insert(account_id.to_string(), result);
    }

    /// Tokens of every upload attempt, in order.
    pub(crate) fn upload_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self, token: &str) -> Reply {
        let mut uploads = self.uploads.lock().unwrap();
        match uploads.get_mut(token) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Transient),
            None => Reply::Transient,
        }
    }
}

impl StorageClient for ScriptedStorage {
    fn id(&self) -> &str {
        "scripted"
    }

    fn resolve_identity<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.identities
                .lock()
                .unwrap()
                .get(token)
                .cloned()
                .unwrap_or_else(|| Ok(format!("acc-{token}")))
        })
    }

    fn fetch_usage<'a>(
        &'a self,
        _token: &'a str,
        account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        Box::pin(async move {
            self.usage
                .lock()
                .unwrap()
                .get(account_id)
                .cloned()
                .unwrap_or_else(|| Err(StorageError::Transient("no usage scripted".into())))
        })
    }

    fn upload_file<'a>(
        &'a self,
        token: &'a str,
        _file: &'a FileSource,
    ) -> Pin<Box<dyn Future<Output = Result<UploadReceipt>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(token.to_string());
            let reply = self.next_reply(token);
            if let Reply::Hang = reply {
                tokio::time::sleep(Duration::from_secs(86_400)).await;
                return Err(StorageError::Transient("hung attempt finished".into()));
            }
            // Yield so concurrent uploads interleave
            tokio::task::yield_now().await;
            reply.into_result(token)
        })
    }
}
