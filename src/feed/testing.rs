//! Scripted collaborators shared by the unit tests of this module.

use crate::feed::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

type Scripted = Result<HttpResponse, TransportError>;

/// Replays queued responses in order and records every request it sees.
/// Once the queue is empty, `fallback` (if any) is returned forever.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    fallback: Option<Scripted>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            ..Self::default()
        }
    }

    pub fn always(response: Scripted) -> Self {
        Self {
            fallback: Some(response),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn unverified_calls(&self) -> usize {
        self.requests().iter().filter(|r| !r.verify).count()
    }
}

impl HttpTransport for ScriptedTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
    }
}
