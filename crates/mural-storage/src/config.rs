//! Storage limits configuration
//!
//! Payload ceilings enforced before any mutation touches the database or
//! blob store.

/// Configured payload ceilings for canvas updates.
#[derive(Debug, Clone)]
pub struct StorageLimits {
    /// Maximum number of elements per project
    pub max_elements: usize,
    /// Maximum decoded size of a single inline image, in bytes
    pub max_image_bytes: usize,
    /// Maximum serialized element payload size, in bytes
    pub max_payload_bytes: usize,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            max_elements: 1000,
            max_image_bytes: 5 * 1024 * 1024,
            max_payload_bytes: 15 * 1024 * 1024,
        }
    }
}

impl StorageLimits {
    /// Create the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the element count ceiling.
    #[must_use]
    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = max_elements;
        self
    }

    /// Set the per-image size ceiling.
    #[must_use]
    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    /// Set the total payload size ceiling.
    #[must_use]
    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }
}
