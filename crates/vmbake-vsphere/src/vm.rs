//! VM lifecycle operations.
//!
//! Every mutating call except guest shutdown and template conversion runs
//! as a vCenter task and is awaited before returning.

use crate::error::{VsphereError, VsphereErrorKind, VsphereResult};
use crate::session::Session;
use crate::task::TaskRunner;
use crate::types::*;

/// High-level VM operations backed by the session's API.
pub struct VmManager<'a> {
    session: &'a Session,
}

impl<'a> VmManager<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    fn tasks(&self) -> TaskRunner<'a> {
        TaskRunner::new(self.session)
    }

    // ── Delete / Configure ──────────────────────────────────────────

    /// Delete the VM and its disks.
    pub async fn destroy(&self, vm: &VmRef) -> VsphereResult<()> {
        self.tasks().run(TaskRequest::Destroy(vm.clone())).await?;
        Ok(())
    }

    /// Apply CPU / memory settings in one reconfigure request.
    pub async fn reconfigure(&self, vm: &VmRef, hardware: &HardwareConfig) -> VsphereResult<()> {
        let spec = VmConfigSpec::from(hardware);
        self.tasks()
            .run(TaskRequest::Reconfigure { vm: vm.clone(), spec })
            .await?;
        Ok(())
    }

    // ── Power operations ────────────────────────────────────────────

    pub async fn power_on(&self, vm: &VmRef) -> VsphereResult<()> {
        self.tasks().run(TaskRequest::PowerOn(vm.clone())).await?;
        Ok(())
    }

    /// Hard power-off. A VM that is already off is left alone.
    pub async fn power_off(&self, vm: &VmRef) -> VsphereResult<()> {
        if self.power_state(vm).await? == VmPowerState::PoweredOff {
            log::debug!("{vm} is already powered off");
            return Ok(());
        }
        self.tasks().run(TaskRequest::PowerOff(vm.clone())).await?;
        Ok(())
    }

    /// Get current power state.
    pub async fn power_state(&self, vm: &VmRef) -> VsphereResult<VmPowerState> {
        self.session.api().power_state(vm).await.map_err(|e| match e.kind {
            VsphereErrorKind::Cancelled => e,
            _ => VsphereError::state(format!("Cannot read power state of {vm}: {}", e.message)),
        })
    }

    // ── Guest operations ────────────────────────────────────────────

    /// Ask the guest OS to shut down (requires VMware Tools). Does not wait.
    pub async fn start_shutdown(&self, vm: &VmRef) -> VsphereResult<()> {
        self.session.api().shutdown_guest(vm).await
    }

    // ── Template ────────────────────────────────────────────────────

    /// Mark the VM as a template in place. It can no longer be powered on.
    pub async fn convert_to_template(&self, vm: &VmRef) -> VsphereResult<()> {
        self.session.api().mark_as_template(vm).await
    }
}
