use tracing::debug;

use super::descriptor::{Descriptor, LifecycleState};
use super::error::{Result, StackError};
use super::orchestrator::Orchestrator;

impl Orchestrator {
    /// Inject the descriptor's embedded files, then start its container.
    ///
    /// Injection stops at the first failure; files already copied stay in
    /// place and the container is left for teardown to remove.
    pub fn start(&self, descriptor: &mut Descriptor) -> Result<()> {
        let Some(id) = descriptor.created_id.clone() else {
            return Err(StackError::NotCreated {
                name: descriptor.name.clone(),
            });
        };
        if descriptor.started {
            return Err(StackError::AlreadyStarted {
                name: descriptor.name.clone(),
            });
        }

        if !descriptor.embeds.is_empty() {
            debug!(
                name = %descriptor.name,
                count = descriptor.embeds.len(),
                "creating embedded files"
            );
        }
        for (index, file) in descriptor.embeds.iter().enumerate() {
            self.inject(&id, &file.path, &file.data)
                .map_err(|source| StackError::Inject {
                    index,
                    path: file.path.clone(),
                    source: Box::new(source),
                })?;
        }

        debug!(name = %descriptor.name, "starting container");
        self.daemon
            .container_start(&id)
            .map_err(|source| StackError::Start {
                name: descriptor.name.clone(),
                source,
            })?;
        descriptor.started = true;
        descriptor.state = LifecycleState::Started;
        Ok(())
    }
}
