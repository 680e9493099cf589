//! DocuSign backend for anysign-core
//!
//! Sends envelopes (uploaded document or server-side template) through the
//! DocuSign REST API, fetches the signed documents back, produces embedded
//! signing URLs, and parses DocuSign Connect notifications.

pub mod backend;
pub mod client;
pub mod config;
pub mod connect;
pub mod models;

pub use backend::{DocuSignBackend, BACKEND_CODE};
pub use client::DocuSignClient;
pub use config::DocuSignConfig;
pub use connect::{parse_notification, ConnectError};
