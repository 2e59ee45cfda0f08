//! End-to-end scenarios for the water-level monitor.
//!
//! No hardware is needed; every scenario drives the simulated or scripted
//! bus through the public startup path.

mod common;
mod config_test;
mod idle_test;
mod pipeline_test;
