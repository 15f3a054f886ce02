//! Aggregate driver façade.
//!
//! `Driver` owns one [`Session`] and exposes every VM lifecycle operation a
//! build pipeline needs, taking [`VirtualMachine`] handles throughout.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::VsphereApi;
use crate::clone::CloneManager;
use crate::error::VsphereResult;
use crate::guest::GuestWaiter;
use crate::session::Session;
use crate::snapshot::SnapshotManager;
use crate::types::*;
use crate::vm::VmManager;
use crate::vsphere::VsphereClient;

/// One authenticated vCenter session bound to a datacenter.
pub struct Driver {
    session: Session,
}

impl Driver {
    /// Log in to vCenter and bind the configured (or only) datacenter.
    pub async fn connect(config: &ConnectConfig) -> VsphereResult<Self> {
        let client = VsphereClient::connect(config).await?;
        log::info!("Connected to vCenter at {}", client.base_url());
        Self::with_api(
            Box::new(client),
            config.datacenter.as_deref(),
            config.polling.clone(),
        )
        .await
    }

    /// Build a driver over any [`VsphereApi`] implementation.
    pub async fn with_api(
        api: Box<dyn VsphereApi>,
        datacenter: Option<&str>,
        polling: PollConfig,
    ) -> VsphereResult<Self> {
        let session = Session::open(api, datacenter, polling).await?;
        Ok(Self { session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn datacenter(&self) -> &Datacenter {
        self.session.datacenter()
    }

    /// Token that aborts every wait in progress when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.session.cancellation_token().clone()
    }

    // ── Connection ──────────────────────────────────────────────────

    /// Check if the session is still valid.
    pub async fn check_session(&self) -> VsphereResult<bool> {
        self.session.api().check_session().await
    }

    /// Cancel outstanding waits and log out.
    pub async fn close(self) -> VsphereResult<()> {
        self.session.cancellation_token().cancel();
        self.session.api().logout().await?;
        log::info!("Closed vCenter session");
        Ok(())
    }

    // ── Inventory ───────────────────────────────────────────────────

    pub async fn find_vm(&self, name: &str) -> VsphereResult<VirtualMachine> {
        self.session.finder().virtual_machine(name).await
    }

    // ── VM lifecycle ────────────────────────────────────────────────

    pub async fn clone_vm(&self, config: &CloneConfig) -> VsphereResult<VirtualMachine> {
        CloneManager::new(&self.session).clone_vm(config).await
    }

    pub async fn destroy_vm(&self, vm: &VirtualMachine) -> VsphereResult<()> {
        log::info!("Destroying VM '{}'", vm.name);
        VmManager::new(&self.session).destroy(&vm.id).await
    }

    pub async fn configure_vm(
        &self,
        vm: &VirtualMachine,
        hardware: &HardwareConfig,
    ) -> VsphereResult<()> {
        log::info!("Reconfiguring VM '{}'", vm.name);
        VmManager::new(&self.session).reconfigure(&vm.id, hardware).await
    }

    pub async fn power_on(&self, vm: &VirtualMachine) -> VsphereResult<()> {
        log::info!("Powering on VM '{}'", vm.name);
        VmManager::new(&self.session).power_on(&vm.id).await
    }

    pub async fn power_off(&self, vm: &VirtualMachine) -> VsphereResult<()> {
        log::info!("Powering off VM '{}'", vm.name);
        VmManager::new(&self.session).power_off(&vm.id).await
    }

    pub async fn power_state(&self, vm: &VirtualMachine) -> VsphereResult<VmPowerState> {
        VmManager::new(&self.session).power_state(&vm.id).await
    }

    pub async fn start_shutdown(&self, vm: &VirtualMachine) -> VsphereResult<()> {
        log::info!("Requesting guest shutdown of VM '{}'", vm.name);
        VmManager::new(&self.session).start_shutdown(&vm.id).await
    }

    pub async fn wait_for_ip(&self, vm: &VirtualMachine) -> VsphereResult<String> {
        log::info!("Waiting for IP address of VM '{}'", vm.name);
        GuestWaiter::new(&self.session).wait_for_ip(&vm.id).await
    }

    pub async fn wait_for_shutdown(
        &self,
        vm: &VirtualMachine,
        timeout: Duration,
    ) -> VsphereResult<()> {
        log::info!("Waiting up to {timeout:?} for VM '{}' to shut down", vm.name);
        GuestWaiter::new(&self.session)
            .wait_for_shutdown(&vm.id, timeout)
            .await
    }

    pub async fn create_snapshot(&self, vm: &VirtualMachine) -> VsphereResult<()> {
        log::info!("Creating snapshot of VM '{}'", vm.name);
        SnapshotManager::new(&self.session).create_snapshot(&vm.id).await
    }

    pub async fn convert_to_template(&self, vm: &VirtualMachine) -> VsphereResult<()> {
        log::info!("Converting VM '{}' to a template", vm.name);
        VmManager::new(&self.session).convert_to_template(&vm.id).await
    }
}
