//! Acceptance tests for the water-level monitor.
//!
//! These run the threaded sampler end to end:
//! - Decoding a simulated multiplexed indicator
//! - Idle yielding on a quiet bus
//! - Loading configuration files from disk

mod acceptance;
