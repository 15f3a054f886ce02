//! VM snapshot management.

use crate::error::VsphereResult;
use crate::session::Session;
use crate::task::TaskRunner;
use crate::types::*;

/// Name given to snapshots taken by the driver.
pub const SNAPSHOT_NAME: &str = "Created by vmbake";

/// Snapshot operations on a VM.
pub struct SnapshotManager<'a> {
    session: &'a Session,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// The VM's current snapshot, `None` if it has no snapshots.
    pub async fn current_snapshot(&self, vm: &VmRef) -> VsphereResult<Option<SnapshotRef>> {
        let tree = self.session.api().snapshot_info(vm).await?;
        Ok(tree.and_then(|t| t.current_snapshot))
    }

    /// Take a disk-only, non-quiesced snapshot.
    pub async fn create_snapshot(&self, vm: &VmRef) -> VsphereResult<()> {
        let spec = CreateSnapshotSpec {
            name: SNAPSHOT_NAME.to_string(),
            description: None,
            memory: false,
            quiesce: false,
        };
        TaskRunner::new(self.session)
            .run(TaskRequest::CreateSnapshot { vm: vm.clone(), spec })
            .await?;
        Ok(())
    }
}
