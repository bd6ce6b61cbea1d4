//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the transfer engine:
//! - Logging and tracing infrastructure
//! - Transfer configuration with fail-fast validation
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions, configuration defaults and event
//! broadcasting mechanisms used throughout the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{TransferConfig, TransferConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
