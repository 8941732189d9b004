//! Test doubles shared by the unit tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::Value;

use crate::auth::{AuthHeaders, MemoryTokenCache, TokenCache};
use crate::errors::AppResult;
use crate::graph::{MailTransport, UpstreamError, UpstreamRequest, UpstreamResult};

/// Transport that records every request and answers from canned rules
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<UpstreamRequest>>,
    response: Value,
    fail_all: Option<UpstreamError>,
    fail_for: HashMap<String, UpstreamError>,
    delay_for: HashMap<String, Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body returned by every successful call
    pub fn responding(mut self, response: Value) -> Self {
        self.response = response;
        self
    }

    pub fn failing_all(mut self, err: UpstreamError) -> Self {
        self.fail_all = Some(err);
        self
    }

    /// Fail any call whose TO section contains `address`
    pub fn failing_for(mut self, address: &str, err: UpstreamError) -> Self {
        self.fail_for.insert(address.to_owned(), err);
        self
    }

    /// Delay any call whose TO section contains `address`
    pub fn delaying(mut self, address: &str, delay: Duration) -> Self {
        self.delay_for.insert(address.to_owned(), delay);
        self
    }

    pub fn calls(&self) -> Vec<UpstreamRequest> {
        self.calls.lock().expect("calls lock").clone()
    }
}

/// Addresses in the TO section of a send or forward body
pub fn to_addresses(request: &UpstreamRequest) -> Vec<String> {
    let Some(body) = &request.body else {
        return Vec::new();
    };
    let section = body
        .pointer("/message/toRecipients")
        .or_else(|| body.get("toRecipients"));
    section
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.pointer("/emailAddress/address"))
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

impl MailTransport for RecordingTransport {
    async fn call(&self, request: UpstreamRequest, _auth: &AuthHeaders) -> UpstreamResult<Value> {
        let to = to_addresses(&request);
        self.calls.lock().expect("calls lock").push(request);

        let delay = to.iter().find_map(|address| self.delay_for.get(address)).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.fail_all {
            return Err(err.clone());
        }
        if let Some(err) = to.iter().find_map(|address| self.fail_for.get(address)) {
            return Err(err.clone());
        }
        Ok(self.response.clone())
    }
}

/// Token cache that counts lookups
#[derive(Debug)]
pub struct CountingTokenCache {
    inner: MemoryTokenCache,
    loads: AtomicUsize,
}

impl CountingTokenCache {
    pub fn with_token(token: &str) -> Self {
        Self {
            inner: MemoryTokenCache::with_token(token),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl TokenCache for CountingTokenCache {
    fn load(&self) -> Option<SecretString> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load()
    }

    fn store(&self, token: &SecretString) -> AppResult<()> {
        self.inner.store(token)
    }

    fn clear(&self) -> AppResult<bool> {
        self.inner.clear()
    }
}
