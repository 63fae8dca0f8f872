//! Storage module

pub mod settings;
