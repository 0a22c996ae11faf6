//! pipstream - Event-Stream Relay
//!
//! HTTP surface, configuration and CLI around [`pipstream_core::Relay`].

#![forbid(unsafe_code)]

pub mod api;
pub mod cli;
pub mod server;
