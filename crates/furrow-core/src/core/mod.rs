pub mod fence;
pub mod ring;
pub mod signal;

pub use fence::Fence;
pub use ring::{RingConsumer, RingProducer, command_ring};
pub use signal::AutoResetSignal;
