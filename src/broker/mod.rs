//! Fan-out broker core
//!
//! One reader per source id, opened lazily on the first attach and torn
//! down eagerly when the last sink detaches, multiplexed to any number of
//! writers over bounded drop-on-full queues.
//!
//! # Architecture
//!
//! ```text
//!                 StreamBroker
//!          ┌──────────────────────────┐
//!          │ registry: RwLock<HashMap │
//!          │   SourceId -> Source {   │
//!          │     reader, streams,     │
//!          │     sinks: HashMap<..>,  │
//!          │   }                      │
//!          │ >                        │
//!          └────────────┬─────────────┘
//!                       │ one read task per source
//!                       ▼
//!               reader.read_packet()
//!          ┌────────────┼─────────────┐
//!          ▼            ▼             ▼
//!       [Sink]       [Sink]        [Sink]       one write task each,
//!     offer(pkt)   offer(pkt)    offer(pkt)     bounded queue,
//!          │            │             │         drop on full
//!          ▼            ▼             ▼
//!     write_packet  write_packet  write_packet
//! ```
//!
//! Packets are cheap to fan out because the payload is a reference-counted
//! `bytes::Bytes`; each sink's queue holds a clone of the packet, not of
//! the data.

pub mod config;
mod sink;
mod source;
mod store;

pub use config::BrokerConfig;
pub use source::SourcePhase;
pub use store::StreamBroker;
