//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Checkpoint save/load utilities
//! - Logging setup

mod checkpoint;
mod config;
mod logging;

pub use checkpoint::{
    checkpoint_path, load_checkpoint_meta, load_network, save_checkpoint, save_network,
    CheckpointMeta, NetworkLabel,
};
pub use config::{
    ensure_config_exists, Config, DataConfig, DisplayConfig, LossConfig, ModelConfig, SinkKind,
    TrainingSection,
};
pub use logging::setup_logging;
