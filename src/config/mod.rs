mod loader;
mod types;

pub use loader::{FILE_NAME, resolve};
pub use types::{
    Config, EmbedConfig, HealthCheckConfig, HealthTest, MountConfig, PortConfig, ServiceConfig,
    Words,
};
