//! Virtual office module

pub mod backend;
pub mod controller;
pub mod deleter;
pub mod notify;
pub mod poller;
pub mod signal;
pub mod state;
