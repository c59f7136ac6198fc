//! Master option store.
//!
//! Options are free-form so plugins can define their own keys next to the
//! built-in ones. Values are JSON values; "set" means set to something
//! truthy, the same rule a config file or environment string would follow.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::time::Duration;

use serde_json::Value;

/// Number of worker processes.
pub const WORKERS: &str = "workers";
/// Listen address host.
pub const HOST: &str = "host";
/// Listen port.
pub const PORT: &str = "port";
/// Pending-connection queue length passed to `listen(2)`.
pub const BACKLOG: &str = "backlog";
/// Replace workers that exit while the master is running.
pub const RESPAWN: &str = "respawn";
/// Grace period for workers to exit on shutdown, in milliseconds.
pub const SHUTDOWN_TIMEOUT_MS: &str = "shutdown_timeout_ms";

pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BACKLOG: i32 = 128;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Named option values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    values: BTreeMap<String, Value>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `name`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// True iff `name` holds a truthy value.
    pub fn has(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(is_truthy)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Explicitly configured worker count, if any.
    pub fn workers(&self) -> Option<NonZeroUsize> {
        self.get(WORKERS)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .and_then(NonZeroUsize::new)
    }

    /// Address the master binds, from `host` and `port`.
    pub fn addr(&self) -> SocketAddr {
        let host = self
            .get(HOST)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST);
        let port = self
            .get(PORT)
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);
        SocketAddr::new(host, port)
    }

    pub fn backlog(&self) -> i32 {
        self.get(BACKLOG)
            .and_then(Value::as_i64)
            .and_then(|b| i32::try_from(b).ok())
            .filter(|b| *b > 0)
            .unwrap_or(DEFAULT_BACKLOG)
    }

    pub fn respawn(&self) -> bool {
        self.has(RESPAWN)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.get(SHUTDOWN_TIMEOUT_MS)
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

/// JSON truthiness: null, false, zero, empty strings and empty containers are unset.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Host processing-unit count, or 1 when it cannot be determined.
pub fn default_worker_count() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_is_false_for_unknown_names() {
        let options = Options::new();
        assert!(!options.has("workers"));
        assert!(!options.has("anything"));
    }

    #[test]
    fn test_has_follows_truthiness() {
        let mut options = Options::new();
        options
            .set("zero", 0)
            .set("empty", "")
            .set("off", false)
            .set("null", Value::Null)
            .set("on", true)
            .set("three", 3)
            .set("name", "x");

        for name in ["zero", "empty", "off", "null"] {
            assert!(!options.has(name), "{name} should not count as set");
        }
        for name in ["on", "three", "name"] {
            assert!(options.has(name), "{name} should count as set");
        }
    }

    #[test]
    fn test_typed_accessor_defaults() {
        let options = Options::new();
        assert_eq!(options.workers(), None);
        assert_eq!(options.addr(), "127.0.0.1:3000".parse().unwrap());
        assert_eq!(options.backlog(), 128);
        assert!(!options.respawn());
        assert_eq!(options.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_typed_accessors_read_values() {
        let mut options = Options::new();
        options
            .set(WORKERS, 3)
            .set(HOST, "0.0.0.0")
            .set(PORT, 8080)
            .set(BACKLOG, 512)
            .set(RESPAWN, true)
            .set(SHUTDOWN_TIMEOUT_MS, 250);

        assert_eq!(options.workers().map(NonZeroUsize::get), Some(3));
        assert_eq!(options.addr(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(options.backlog(), 512);
        assert!(options.respawn());
        assert_eq!(options.shutdown_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let mut options = Options::new();
        options
            .set(WORKERS, 0)
            .set(HOST, "not an ip")
            .set(PORT, 70000)
            .set(BACKLOG, -1);

        assert_eq!(options.workers(), None);
        assert_eq!(options.addr(), "127.0.0.1:3000".parse().unwrap());
        assert_eq!(options.backlog(), DEFAULT_BACKLOG);
    }

    #[test]
    fn test_iter_is_sorted_by_name() {
        let mut options = Options::new();
        options.set("b", json!(1)).set("a", json!({"k": 1}));
        let names: Vec<&str> = options.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_default_worker_count_is_positive() {
        assert!(default_worker_count().get() >= 1);
    }
}
