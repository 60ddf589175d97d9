//! Interface adapters

pub mod ws;
