//! Virtual office controller library
//!
//! Drives the lifecycle of a project's virtual office through the
//! euphrosyne-tools API.

pub mod app;
pub mod errors;
pub mod http;
pub mod logs;
pub mod models;
pub mod office;
pub mod storage;
pub mod utils;
