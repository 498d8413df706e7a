use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::docker::{HealthCheck, Mount, PortBinding};
use crate::stack::{Descriptor, HealthPolicy, Settings};

use super::types::{Config, HealthCheckConfig, HealthTest, ServiceConfig};

/// Config file looked up in the working directory.
pub const FILE_NAME: &str = "stackup.yaml";

/// The explicit path if given, else `stackup.yaml` in `dir`.
pub fn resolve(explicit: Option<&Path>, dir: &Path) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => dir.join(FILE_NAME),
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::parse(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        Ok(config)
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.project.is_empty() {
            bail!("project must not be empty");
        }
        if self.health_retries == 0 {
            bail!("health_retries must be at least 1");
        }
        let mut seen = HashSet::new();
        for (i, service) in self.services.iter().enumerate() {
            if service.name.is_empty() {
                bail!("service {i} has no name");
            }
            if service.image.is_empty() {
                bail!("service {} has no image", service.name);
            }
            if !seen.insert(service.name.as_str()) {
                bail!("service {} is defined twice", service.name);
            }
            for embed in &service.embeds {
                if embed.content.is_some() == embed.source.is_some() {
                    bail!(
                        "service {}: embed {} needs exactly one of content and source",
                        service.name,
                        embed.path
                    );
                }
            }
        }
        Ok(())
    }

    pub fn network_name(&self) -> &str {
        self.network.as_deref().unwrap_or(&self.project)
    }

    pub fn settings(&self) -> Settings {
        let mut settings = Settings::new(&self.project, self.network_name());
        settings.health = HealthPolicy {
            retries: self.health_retries,
            backoff_base: Duration::from_millis(self.health_backoff_ms),
        };
        settings
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// Build one descriptor per service, in order. Embed sources are read
    /// now, so a missing file fails before any container exists.
    pub fn descriptors(&self) -> Result<Vec<Descriptor>> {
        self.services
            .iter()
            .map(|s| {
                self.descriptor(s)
                    .with_context(|| format!("service {}", s.name))
            })
            .collect()
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn descriptor(&self, service: &ServiceConfig) -> Result<Descriptor> {
        let mut d = Descriptor::new(&service.name, &service.image)
            .entrypoint(service.entrypoint.0.iter().cloned())
            .command(service.command.0.iter().cloned());

        for (key, value) in &service.env {
            d = d.env(key, value);
        }
        for port in &service.ports {
            d = d.port(PortBinding {
                host_ip: port.host_ip.clone(),
                host_port: port.host_port,
                container_port: port.container_port,
            });
        }
        for mount in &service.mounts {
            d = d.mount(Mount {
                source: self.resolve_path(&mount.source).display().to_string(),
                target: mount.target.clone(),
                read_only: mount.read_only,
            });
        }
        for embed in &service.embeds {
            let data = match (&embed.content, &embed.source) {
                (Some(content), _) => content.clone().into_bytes(),
                (None, Some(source)) => {
                    let path = self.resolve_path(source);
                    std::fs::read(&path)
                        .with_context(|| format!("reading embed source {}", path.display()))?
                }
                (None, None) => bail!("embed {} has no content", embed.path),
            };
            d = d.embed(&embed.path, data);
        }
        // A disabled check stays on the descriptor so create passes
        // --no-healthcheck; the health gate skips it.
        if let Some(check) = &service.health_check {
            d = d.health_check(health_check(check));
        }
        if let Some(command) = &service.after_start
            && !command.is_empty()
        {
            let command = command.0.clone();
            d = d.after_start(move |orch, d| orch.exec(d.id(), &command));
        }
        Ok(d)
    }
}

fn health_check(config: &HealthCheckConfig) -> HealthCheck {
    let test = match &config.test {
        HealthTest::Shell(script) => vec!["CMD-SHELL".to_string(), script.clone()],
        HealthTest::Exec(words) => words.clone(),
    };
    HealthCheck {
        test,
        interval: Duration::from_millis(config.interval_ms),
        timeout: Duration::from_millis(config.timeout_ms),
        retries: config.retries,
    }
}
