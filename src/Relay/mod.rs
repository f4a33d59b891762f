pub mod builder;
pub mod collaborators;
pub mod diagnostics;
pub mod guard;
pub mod pool;
pub mod producer;
pub mod pump;

pub use builder::RegionBuilder;
pub use collaborators::{Broadcaster, MemoryHistory, MessageStore, RoomBroadcaster};
pub use diagnostics::{Diagnostic, DiagnosticSender};
pub use guard::QueueGuard;
pub use pool::ProducerPool;
pub use producer::{Delivery, DropReason, Producer};
pub use pump::{Pump, PumpHandle, TickReport};

pub mod Ring {
    pub mod Ring;
    pub mod Ring_impl;
    pub mod layout;
    pub use Ring::{Cursors, RingQueue}; // re-export for stable path
}

pub mod Structs {
    pub mod Message_Structs;
    pub use Message_Structs::{InboundPayload, Message, Platform}; // re-export for stable path
}
