pub mod config;
pub mod docker;
pub mod shutdown;
pub mod stack;
