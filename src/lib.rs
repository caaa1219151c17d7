pub mod commands;
pub mod config;
pub mod market;
pub mod monitoring;
pub mod tracking;
