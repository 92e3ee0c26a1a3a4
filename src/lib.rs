//! shellcache library
//!
//! Versioned offline cache for a single-page application shell: the cache
//! worker lifecycle (install, activate, fetch, message), the registration
//! that swaps worker versions, and the page-side update notifier.

pub mod cache;
pub mod cli;
pub mod clients;
pub mod config;
pub mod http;
pub mod logging;
pub mod messages;
pub mod network;
pub mod notifier;
pub mod registration;
pub mod worker;
