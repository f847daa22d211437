pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod geometry;
pub mod guider;
pub mod image;
pub mod mount;
pub mod observer;
pub mod persist;
pub mod star;
pub mod value_stats;
pub mod worker;

#[cfg(test)]
mod testkit;
