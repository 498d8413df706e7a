use tracing::{debug, info, warn};

use crate::docker::classify;

use super::descriptor::{Descriptor, LifecycleState};
use super::error::{Result, StackError};
use super::orchestrator::Orchestrator;

impl Orchestrator {
    /// Make sure the shared network exists, creating it if needed.
    pub fn ensure_network(&self) -> Result<()> {
        let name = &self.settings.network;
        let network_err = |source| StackError::Network {
            name: name.clone(),
            source,
        };
        match self.daemon.network_inspect(name) {
            Ok(id) => {
                debug!(network = %name, %id, "found network");
                Ok(())
            }
            Err(e) if classify::is_network_not_found(&e) => {
                let id = self.daemon.network_create(name).map_err(network_err)?;
                debug!(network = %name, %id, "created network");
                Ok(())
            }
            Err(e) => Err(network_err(e)),
        }
    }

    /// Create the descriptor's container, pulling its image and clearing a
    /// stale container of the same name if needed. Returns the new ID.
    pub fn create(&self, descriptor: &mut Descriptor) -> Result<String> {
        if descriptor.created_id.is_some() {
            return Err(StackError::AlreadyCreated {
                name: descriptor.name.clone(),
            });
        }
        debug!(name = %descriptor.name, image = %descriptor.image, "creating container");

        self.ensure_image(&descriptor.image)?;

        let spec = descriptor.create_spec(&self.settings.network, &self.settings.labels);
        let id = match self.daemon.container_create(&spec) {
            Ok(id) => id,
            Err(e) if classify::is_name_conflict(&e) => {
                debug!(name = %descriptor.name, "container name conflict; removing stale container");
                self.daemon
                    .container_remove(&descriptor.name, None)
                    .map_err(|source| StackError::ConflictUnresolved {
                        name: descriptor.name.clone(),
                        source,
                    })?;
                debug!(name = %descriptor.name, "container name conflict resolved; recreating");
                self.daemon
                    .container_create(&spec)
                    .map_err(|source| StackError::CreateRetry {
                        name: descriptor.name.clone(),
                        source,
                    })?
            }
            Err(source) => {
                return Err(StackError::Create {
                    name: descriptor.name.clone(),
                    source,
                });
            }
        };

        descriptor.created_id = Some(id.clone());
        descriptor.state = LifecycleState::Created;
        Ok(id)
    }

    fn ensure_image(&self, image: &str) -> Result<()> {
        match self.daemon.image_inspect(image) {
            Ok(id) => {
                debug!(image, %id, "found image");
                Ok(())
            }
            Err(e) if classify::is_image_not_found(&e) => {
                warn!(image, "image not found locally; pulling (this may take a while)");
                self.daemon
                    .image_pull(image, &mut |line: &str| debug!(image, "{line}"))
                    .map_err(|source| StackError::ImagePull {
                        image: image.to_string(),
                        source,
                    })?;
                info!(image, "pulled image");
                Ok(())
            }
            Err(source) => Err(StackError::ImageInspect {
                image: image.to_string(),
                source,
            }),
        }
    }
}
