//! Configuration management

pub mod settings;

pub use settings::{
    LoggingConfig, ProviderAuthSettings, ProviderSettings, RaceSettings, RoutingSettings, Settings,
};
