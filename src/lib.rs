//! Queue Purge
//!
//! Removes a single message from an AMQP queue on request. A webhook call
//! names an id; a background worker scans the queue, acks the first message
//! whose configured JSON field equals that id and puts everything else back.

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod purge;
pub mod readiness;
pub mod utils;
pub mod validation;
