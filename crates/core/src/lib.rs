pub mod config;

pub use config::models::{
    AppConfig, FallbackConfig, ObservabilityConfig, SegmentationConfig, SlotStoreBackend,
    SlotStoreConfig, TrackingConfig,
};
