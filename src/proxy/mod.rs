//! Upstream proxy rotation.

mod pool;

pub use pool::{ProxyHandle, ProxyPool, ProxyStatus};
