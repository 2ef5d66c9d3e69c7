//! Live Streamer (C6): frames the same AV sink into the wire format of
//! §6 and delivers it over a persistent WebSocket connection with
//! backpressure-tolerant, lossy queues.

mod backoff;
mod streamer;

pub use backoff::{Backoff, BACKOFF_CEILING};
pub use streamer::{LiveStreamer, StreamerConfig};
