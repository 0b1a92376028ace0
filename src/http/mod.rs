mod cache;
mod engine;
mod retry;
mod single_flight;

pub use cache::ResponseCache;
pub use engine::{RequestEngine, signature};
pub use single_flight::SingleFlight;

#[cfg(test)]
pub(crate) use engine::test_helpers;

use crate::error::{AppError, Result};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Payload::Json(value) => Ok(serde_json::from_value(value.clone())?),
            Payload::Text(text) => Err(AppError::Serialization(format!(
                "Expected a JSON response, got: {}",
                text.chars().take(80).collect::<String>()
            ))),
        }
    }
}

/// Per-call options for [`RequestEngine::request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    /// Skip the cache for a GET and overwrite it with the new result.
    pub force_refresh: bool,
    pub cache_ttl: Option<Duration>,
    pub max_retries: Option<u32>,
    pub initial_delay: Option<Duration>,
}

impl RequestOptions {
    fn new(method: Method, body: Option<Value>) -> Self {
        Self {
            method,
            body,
            force_refresh: false,
            cache_ttl: None,
            max_retries: None,
            initial_delay: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET, None)
    }

    pub fn post(body: Value) -> Self {
        Self::new(Method::POST, Some(body))
    }

    pub fn put(body: Value) -> Self {
        Self::new(Method::PUT, Some(body))
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn retries(mut self, max_retries: u32, initial_delay: Duration) -> Self {
        self.max_retries = Some(max_retries);
        self.initial_delay = Some(initial_delay);
        self
    }
}

/// Whether the network is believed reachable.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Online/offline flag that can be flipped by whoever observes the network.
#[derive(Debug)]
pub struct NetworkStatus {
    online: AtomicBool,
}

impl NetworkStatus {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl Connectivity for NetworkStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Serialize a request body, dropping `null` members.
///
/// The Google API wire structs serialize every unset field as `null`, which
/// the API treats as "clear this field".
pub fn to_body<T: Serialize>(value: &T) -> Result<Value> {
    let mut value = serde_json::to_value(value)?;
    strip_nulls(&mut value);
    Ok(value)
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}
