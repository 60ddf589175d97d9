//! # OCPP Central System
//!
//! OCPP-J 1.5 / 1.6 central system protocol engine for EV charging stations.
//!
//! ## Architecture
//!
//! The project follows Clean Architecture principles:
//!
//! - **domain**: Core entities, errors and collaborator ports
//! - **application**: Connection registry, request correlation, inbound
//!   handlers and outbound commands
//! - **infrastructure**: Reference in-memory collaborators
//! - **interfaces**: WebSocket transport
//! - **shared**: OCPP-J frame codec and shutdown signalling

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod shared;

pub use config::{default_config_path, AppConfig, Config, ConfigError};
pub use interfaces::ws::OcppServer;
