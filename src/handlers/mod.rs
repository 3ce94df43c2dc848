//! HTTP handlers.

pub mod webhook;
