//! Integration test utilities for the gateway client
//!
//! This crate provides an in-process mock gateway (WebSocket server plus
//! discovery endpoint) for driving the client end to end.


pub use mock_gateway::*;
