pub mod config;
pub mod delivery;
pub mod error;
pub mod execution;
pub mod extraction;
pub mod hub;
pub mod shutdown;
pub mod workspace;
