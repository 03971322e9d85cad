//! Scripted `RpcTransport` for driving the poller and control paths in tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::RpcTransport;
use crate::error::RpcError;

/// What a scripted endpoint does when called.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    Fail(RpcError),
    /// Sleep, then behave like the inner reply.
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn timeout(method: &str) -> Self {
        Reply::Fail(RpcError::Transport {
            method: method.to_string(),
            message: "timed out after 2500ms".to_string(),
        })
    }
}

/// One recorded call: (base_url, method, params)
pub type Call = (String, String, Value);

/// Per-base-URL queue of replies. When a queue runs dry its last reply repeats.
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<HashMap<String, Vec<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, base_url: &str, replies: Vec<Reply>) {
        self.replies
            .lock()
            .unwrap()
            .insert(base_url.to_string(), replies);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, base_url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _, _)| url == base_url)
            .count()
    }

    fn next_reply(&self, base_url: &str, method: &str) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(base_url) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Reply::Fail(RpcError::Transport {
                method: method.to_string(),
                message: "connection failed: no route".to_string(),
            }),
        }
    }
}

#[async_trait]
impl RpcTransport for FakeTransport {
    async fn call(&self, base_url: &str, method: &str, params: Value) -> Result<Value, RpcError> {
        self.calls
            .lock()
            .unwrap()
            .push((base_url.to_string(), method.to_string(), params));

        let mut reply = self.next_reply(base_url, method);
        loop {
            match reply {
                Reply::Ok(value) => return Ok(value),
                Reply::Fail(err) => return Err(err),
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

/// A `Shelly.GetStatus` reply with a populated `switch:0` channel.
pub fn switch_status(output: bool, apower: f64) -> Value {
    json!({
        "switch:0": {
            "id": 0,
            "output": output,
            "apower": apower,
            "voltage": 230.1,
            "current": 0.18,
            "aenergy": {"total": 1000.2},
            "temperature": {"tC": 55.3}
        }
    })
}
