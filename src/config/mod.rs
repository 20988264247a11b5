//! Configuration management for booking-outbox.
//!
//! This module handles loading configuration from `~/.booking-outbox/`.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{
    ColorSetting, Config, DraftConfig, GeneralConfig, NetworkConfig, RemoteConfig, SyncConfig,
};
