pub mod app_config;
pub mod dispatch;
pub mod observability;
pub mod slot_store;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use dispatch::{FallbackConfig, SegmentationConfig, TrackingConfig};
pub use observability::ObservabilityConfig;
pub use slot_store::{SlotStoreBackend, SlotStoreConfig};
