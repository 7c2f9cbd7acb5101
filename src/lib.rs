//! partyfetch - resilient media archiver for creator post histories.
//!
//! Lists a creator's posts from a paginated JSON API and saves every
//! attachment exactly once, failing over between CDN hosts, retrying in
//! passes, blacklisting targets that keep failing, and optionally routing
//! traffic through a rotating pool of proxies.

pub mod api;
pub mod blacklist;
pub mod config;
pub mod http_client;
pub mod proxy;
pub mod rate_limit;
pub mod services;
pub mod target;
pub mod utils;
