//! NATS JetStream integration
//!
//! The topic is a JetStream subject; records are published with an awaited
//! acknowledgement so sends complete one at a time.

mod producer;

pub use producer::NatsProducer;
