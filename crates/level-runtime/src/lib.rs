#![doc = "Real-time decoding engine for the water-level monitor."]

pub mod aggregator;
pub mod clock;
pub mod decode;
pub mod latch;
pub mod monitor;
pub mod realtime;
pub mod sampler;
pub mod sink;

pub use aggregator::*;
pub use clock::*;
pub use decode::*;
pub use latch::*;
pub use monitor::*;
pub use realtime::*;
pub use sampler::*;
pub use sink::*;
