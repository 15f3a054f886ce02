//! The remote capability surface the driver is written against.
//!
//! [`VsphereClient`](crate::vsphere::VsphereClient) implements it over the
//! vSphere REST API. Lookups return every match; deciding that exactly one
//! object must match is the [`Finder`](crate::inventory::Finder)'s job.

use async_trait::async_trait;

use crate::error::VsphereResult;
use crate::inventory::InventoryPath;
use crate::types::*;

#[async_trait]
pub trait VsphereApi: Send + Sync {
    /// Datacenters named `name`, or every datacenter when `name` is `None`.
    async fn find_datacenters(&self, name: Option<&str>) -> VsphereResult<Vec<Datacenter>>;

    /// VMs (templates included) called `name` inside the datacenter.
    async fn find_vms(&self, dc: &Datacenter, name: &str) -> VsphereResult<Vec<VmRef>>;

    /// Folders matching an inventory path such as `/dc1/vm/builds`.
    async fn find_folders(
        &self,
        dc: &Datacenter,
        path: &InventoryPath,
    ) -> VsphereResult<Vec<FolderRef>>;

    /// Resource pools matching a path such as `/dc1/host/esx1/Resources/ci`.
    async fn find_resource_pools(
        &self,
        dc: &Datacenter,
        path: &InventoryPath,
    ) -> VsphereResult<Vec<ResourcePoolRef>>;

    async fn find_datastores(&self, dc: &Datacenter, name: &str)
        -> VsphereResult<Vec<DatastoreRef>>;

    /// `None` when the VM has no snapshots.
    async fn snapshot_info(&self, vm: &VmRef) -> VsphereResult<Option<SnapshotTree>>;

    async fn power_state(&self, vm: &VmRef) -> VsphereResult<VmPowerState>;

    /// Primary guest IP, `None` while the guest tools have not reported one.
    async fn guest_ip(&self, vm: &VmRef) -> VsphereResult<Option<String>>;

    /// Start a task-backed operation. Returns as soon as vCenter accepted it.
    async fn submit_task(&self, request: &TaskRequest) -> VsphereResult<TaskRef>;

    async fn task_info(&self, task: &TaskRef) -> VsphereResult<TaskInfo>;

    /// Ask the guest tools for a clean OS shutdown. Does not wait.
    async fn shutdown_guest(&self, vm: &VmRef) -> VsphereResult<()>;

    async fn mark_as_template(&self, vm: &VmRef) -> VsphereResult<()>;

    async fn check_session(&self) -> VsphereResult<bool>;

    async fn logout(&self) -> VsphereResult<()>;
}
