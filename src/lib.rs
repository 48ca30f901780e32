//! Cadence - sliding-window request throttling
//!
//! This crate implements the client-side rate limiter used by the practice
//! scheduling application. Requests are counted per `category:identifier`
//! key inside a sliding window; categories can add a temporary hard block
//! once their quota is exceeded.

pub mod config;
pub mod error;
pub mod ratelimit;
