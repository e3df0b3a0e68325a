//! Volume Realization
//!
//! Turns a committed placement into real volumes through the provisioning
//! collaborator. The system volume comes with the VM clone itself, so only
//! swap and data volumes are created here.

use crate::domain::ports::{ProvisionResponse, VolumeProvisioner};
use crate::error::{Error, Result};
use crate::request::{Volume, VmRequest};
use tracing::{debug, info, warn};

/// Swap volumes first, then data volumes in reverse placement order
fn creation_order(vm: &VmRequest) -> Vec<&Volume> {
    vm.swap
        .volumes
        .values()
        .chain(vm.data.volumes.values().rev())
        .filter(|v| v.size > 0)
        .collect()
}

fn failure_reason(response: &ProvisionResponse) -> String {
    response
        .message
        .clone()
        .unwrap_or_else(|| "provisioning task reported an error".to_string())
}

/// Create every swap and data volume of a placed VM.
///
/// If any creation fails, the volumes already created by this call are
/// destroyed again (newest first) before the error is returned.
pub async fn create_volumes(provisioner: &dyn VolumeProvisioner, vm: &VmRequest) -> Result<Vec<Volume>> {
    let mut created: Vec<Volume> = Vec::new();

    for volume in creation_order(vm) {
        let failure = match provisioner.create(&volume.to_spec()).await {
            Ok(response) if response.is_success() => None,
            Ok(response) => Some(failure_reason(&response)),
            Err(e) => Some(e.to_string()),
        };

        match failure {
            None => {
                debug!("Created {} ({} MB)", volume.full_path, volume.size);
                created.push(volume.clone());
            }
            Some(reason) => {
                warn!(
                    "Creating {} for VM {} failed: {}; removing {} created volumes",
                    volume.full_path,
                    vm.name,
                    reason,
                    created.len()
                );
                undo(provisioner, &created).await;
                return Err(Error::Provisioning {
                    path: volume.full_path.clone(),
                    reason,
                });
            }
        }
    }

    info!("Created {} volumes for VM {}", created.len(), vm.name);
    Ok(created)
}

async fn undo(provisioner: &dyn VolumeProvisioner, created: &[Volume]) {
    for volume in created.iter().rev() {
        match provisioner.destroy(&volume.to_spec()).await {
            Ok(response) if response.is_success() => {}
            Ok(response) => warn!(
                "Cleanup of {} failed: {}",
                volume.full_path,
                failure_reason(&response)
            ),
            Err(e) => warn!("Cleanup of {} failed: {}", volume.full_path, e),
        }
    }
}

/// Destroy every swap and data volume of a VM, stopping at the first failure
pub async fn delete_volumes(provisioner: &dyn VolumeProvisioner, vm: &VmRequest) -> Result<()> {
    let volumes = vm
        .swap
        .volumes
        .values()
        .chain(vm.data.volumes.values())
        .filter(|v| v.size > 0);

    for volume in volumes {
        let response = provisioner.destroy(&volume.to_spec()).await?;
        if !response.is_success() {
            return Err(Error::Provisioning {
                path: volume.full_path.clone(),
                reason: failure_reason(&response),
            });
        }
        debug!("Destroyed {}", volume.full_path);
    }

    Ok(())
}
