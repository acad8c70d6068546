//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by every core crate:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - Offline mode switch
//!
//! ## Overview
//!
//! This crate establishes the logging conventions, configuration validation
//! and event broadcasting used throughout the sync engine.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod mode;

pub use config::{AuthSettings, CoreConfig, CoreConfigBuilder, SyncSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
pub use mode::OfflineMode;
