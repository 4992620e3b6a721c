pub mod app;
pub mod capture;
pub mod cli;
pub mod config;
pub mod curve;
pub mod export;
pub mod global;
pub mod render;
pub mod signal;
