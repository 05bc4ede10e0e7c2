pub mod config;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod model;
pub mod platform;
pub mod registry;
