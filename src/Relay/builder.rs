use crate::config::RegionSettings;
use crate::error::RegionError;
use crate::Core::region::{init_global_with, SharedRegion};
use crate::Relay::Ring::layout::{DEFAULT_CAPACITY, DEFAULT_SLOT_SIZE};
use std::sync::Arc;

pub struct RegionBuilder {
    name: Option<String>,
    capacity: u32,
    slot_size: u32,
}

impl Default for RegionBuilder {
    fn default() -> Self {
        Self {
            name: None, // anonymous by default
            capacity: DEFAULT_CAPACITY,
            slot_size: DEFAULT_SLOT_SIZE,
        }
    }
}

impl RegionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &RegionSettings) -> Self {
        Self {
            name: Some(settings.name.clone()).filter(|n| !n.is_empty()),
            capacity: settings.capacity,
            slot_size: settings.slot_size,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_slot_size(mut self, slot_size: u32) -> Self {
        self.slot_size = slot_size;
        self
    }

    pub fn build(self) -> Result<SharedRegion, RegionError> {
        SharedRegion::create(self.name.as_deref(), self.capacity, self.slot_size)
    }

    /// Build and install as the process-wide region. If one is already
    /// installed it is returned and this builder is ignored.
    pub fn init_global(self) -> Result<Arc<SharedRegion>, RegionError> {
        init_global_with(|| self.build())
    }
}
