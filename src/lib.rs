// Module naming follows project convention (Core = shared-memory primitives, Relay = chat pipeline)
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Relay;
#[allow(non_snake_case)]
mod Debug {
    pub mod StructDebug;
}
pub mod config;
pub mod error;

pub use config::RelayConfig;
pub use Core::{AtomicLock, RegionHandle, SharedRegion};
pub use Relay::Structs::{InboundPayload, Message, Platform};
