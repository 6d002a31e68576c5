#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod auth;
pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use client::Client;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Default HTTP base URL of the Tavo API.
pub const DEFAULT_BASE_URL: &str = "https://api.tavoai.net";

pub const API_KEY_VAR: &str = "TAVO_API_KEY";
pub const BASE_URL_VAR: &str = "TAVO_BASE_URL";

/// Timestamp in seconds since [`std::time::UNIX_EPOCH`]
pub type Timestamp = i64;
