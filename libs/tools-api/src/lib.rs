//! Wire models for the euphrosyne-tools virtual office API

pub mod models;
