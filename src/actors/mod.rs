//! Actor driving periodic discovery
//!
//! The discovery actor runs as an independent async task and talks to the
//! rest of the process through Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!        +-----------------+
//!        |  adapter (main) |
//!        +--------+--------+
//!                 | spawns
//!        +--------v--------+        refresh()       +-----------+
//!        | DiscoveryActor  | ---------------------> | Refresher |
//!        +--------+--------+                        +-----------+
//!                 | mpsc (capacity 1)
//!        +--------v--------+
//!        |  FileSdWriter   |
//!        +-----------------+
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Snapshots**: successful refreshes are sent over a bounded mpsc channel
//! 2. **Control**: a `CancellationToken` stops the loop between ticks or during delivery
//! 3. **Observation**: loop state is published on a watch channel

pub mod discovery;

pub use discovery::{DiscoveryActor, DiscoveryHandle, LoopState};
