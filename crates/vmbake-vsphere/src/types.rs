//! Shared types for the vSphere driver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Connection / Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for connecting to a vCenter / ESXi endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectConfig {
    /// vCenter or ESXi hostname / IP (e.g. "vcenter.lab.local")
    pub host: String,
    /// Port (default 443)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username (e.g. "administrator@vsphere.local")
    pub username: String,
    /// Password
    pub password: String,
    /// Datacenter to work in. Absent means the endpoint's only datacenter.
    #[serde(default)]
    pub datacenter: Option<String>,
    /// Skip TLS certificate verification (self-signed labs)
    #[serde(default)]
    pub insecure: bool,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub polling: PollConfig,
}

fn default_port() -> u16 { 443 }
fn default_timeout() -> u64 { 30 }

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 443,
            username: String::new(),
            password: String::new(),
            datacenter: None,
            insecure: false,
            timeout_secs: 30,
            polling: PollConfig::default(),
        }
    }
}

/// Poll intervals used while waiting on the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    #[serde(default = "default_task_interval")]
    pub task_interval_ms: u64,
    #[serde(default = "default_ip_interval")]
    pub ip_interval_ms: u64,
    #[serde(default = "default_shutdown_interval")]
    pub shutdown_interval_ms: u64,
}

fn default_task_interval() -> u64 { 500 }
fn default_ip_interval() -> u64 { 1000 }
fn default_shutdown_interval() -> u64 { 1000 }

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            task_interval_ms: default_task_interval(),
            ip_interval_ms: default_ip_interval(),
            shutdown_interval_ms: default_shutdown_interval(),
        }
    }
}

impl PollConfig {
    pub fn task_interval(&self) -> Duration {
        Duration::from_millis(self.task_interval_ms)
    }

    pub fn ip_interval(&self) -> Duration {
        Duration::from_millis(self.ip_interval_ms)
    }

    pub fn shutdown_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_interval_ms)
    }
}

/// Where and how to clone the template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneConfig {
    /// Source template (VM name)
    pub template: String,
    /// Name of the new VM
    pub vm_name: String,
    /// VM folder below the datacenter's `vm` folder. Absent = default folder.
    #[serde(default)]
    pub folder: Option<String>,
    /// Host or cluster owning `resource_pool`
    #[serde(default)]
    pub host: Option<String>,
    /// Absent = the datacenter's default resource pool.
    #[serde(default)]
    pub resource_pool: Option<String>,
    /// Absent = let placement pick the datastore.
    #[serde(default)]
    pub datastore: Option<String>,
    /// Create a linked clone off the template's current snapshot
    #[serde(default)]
    pub linked_clone: bool,
}

/// Hardware settings applied in a single reconfigure request.
///
/// `None` leaves a field unchanged on the VM; `Some(0)` sets it to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareConfig {
    #[serde(default)]
    pub cpus: Option<u32>,
    /// MHz
    #[serde(default)]
    pub cpu_reservation: Option<i64>,
    /// MHz
    #[serde(default)]
    pub cpu_limit: Option<i64>,
    #[serde(default)]
    pub ram_mb: Option<u64>,
    /// MB
    #[serde(default)]
    pub ram_reservation: Option<i64>,
    /// Lock the memory reservation to the configured RAM size
    #[serde(default)]
    pub ram_reserve_all: bool,
}

/// Graceful shutdown deadline as loaded from pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownConfig {
    #[serde(default = "default_shutdown_timeout")]
    pub timeout_secs: u64,
}

fn default_shutdown_timeout() -> u64 { 300 }

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_secs: default_shutdown_timeout() }
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Managed object references
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

macro_rules! object_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

object_ref!(
    /// e.g. "datacenter-3"
    DatacenterRef
);
object_ref!(
    /// e.g. "vm-42"
    VmRef
);
object_ref!(
    /// e.g. "group-v4"
    FolderRef
);
object_ref!(
    /// e.g. "resgroup-8"
    ResourcePoolRef
);
object_ref!(
    /// e.g. "datastore-11"
    DatastoreRef
);
object_ref!(
    /// e.g. "snapshot-2"
    SnapshotRef
);
object_ref!(
    /// CIS task identifier
    TaskRef
);

/// The datacenter a session is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datacenter {
    pub id: DatacenterRef,
    pub name: String,
}

/// Handle to a remote virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: VmRef,
    pub name: String,
}

impl VirtualMachine {
    pub fn new(id: VmRef, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VM Power State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmPowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
    #[default]
    #[serde(other)]
    Unknown,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Inventory (REST list / get payloads)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatacenterSummary {
    pub datacenter: DatacenterRef,
    pub name: String,
}

impl From<DatacenterSummary> for Datacenter {
    fn from(s: DatacenterSummary) -> Self {
        Self { id: s.datacenter, name: s.name }
    }
}

/// GET /api/vcenter/datacenter/{datacenter}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatacenterInfo {
    pub name: String,
    pub vm_folder: FolderRef,
    #[serde(default)]
    pub host_folder: Option<FolderRef>,
    #[serde(default)]
    pub datastore_folder: Option<FolderRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSummary {
    pub vm: VmRef,
    pub name: String,
    #[serde(default)]
    pub power_state: VmPowerState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSummary {
    pub folder: FolderRef,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePoolSummary {
    pub resource_pool: ResourcePoolRef,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreSummary {
    pub datastore: DatastoreRef,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster: String,
    pub name: String,
}

/// GET /api/vcenter/cluster/{cluster}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub name: String,
    pub resource_pool: ResourcePoolRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSummary {
    pub host: String,
    pub name: String,
}

/// GET /api/vcenter/vm/{vm}/guest/identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuestIdentity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Snapshots
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub snapshot: SnapshotRef,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent: Option<SnapshotRef>,
}

/// Snapshot metadata of a VM. A VM without snapshots has no tree at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotTree {
    #[serde(default)]
    pub current_snapshot: Option<SnapshotRef>,
    #[serde(default)]
    pub snapshots: Vec<SnapshotSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSnapshotSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Snapshot the VM's memory state
    pub memory: bool,
    /// Quiesce the guest file system
    pub quiesce: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VM Clone / Reconfigure
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmPlacement {
    pub folder: FolderRef,
    pub resource_pool: ResourcePoolRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore: Option<DatastoreRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiskMoveType {
    /// Child disks backed by the source snapshot's disks (linked clone)
    CreateNewChildDiskBacking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmCloneSpec {
    pub source: VmRef,
    pub name: String,
    pub placement: VmPlacement,
    pub power_on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_move_type: Option<DiskMoveType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl ResourceAllocation {
    fn from_parts(reservation: Option<i64>, limit: Option<i64>) -> Option<Self> {
        if reservation.is_none() && limit.is_none() {
            None
        } else {
            Some(Self { reservation, limit })
        }
    }
}

/// Combined hardware reconfiguration request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cpus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_allocation: Option<ResourceAllocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_allocation: Option<ResourceAllocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_reservation_locked_to_max: Option<bool>,
}

impl From<&HardwareConfig> for VmConfigSpec {
    fn from(hw: &HardwareConfig) -> Self {
        Self {
            num_cpus: hw.cpus,
            memory_mb: hw.ram_mb,
            cpu_allocation: ResourceAllocation::from_parts(hw.cpu_reservation, hw.cpu_limit),
            memory_allocation: ResourceAllocation::from_parts(hw.ram_reservation, None),
            memory_reservation_locked_to_max: Some(hw.ram_reserve_all),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every mutating call that vCenter runs as a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRequest {
    Clone(VmCloneSpec),
    Destroy(VmRef),
    Reconfigure { vm: VmRef, spec: VmConfigSpec },
    PowerOn(VmRef),
    PowerOff(VmRef),
    CreateSnapshot { vm: VmRef, spec: CreateSnapshotSpec },
}

impl TaskRequest {
    /// VM the task runs against (the source VM for a clone).
    pub fn target(&self) -> &VmRef {
        match self {
            Self::Clone(spec) => &spec.source,
            Self::Destroy(vm)
            | Self::PowerOn(vm)
            | Self::PowerOff(vm)
            | Self::Reconfigure { vm, .. }
            | Self::CreateSnapshot { vm, .. } => vm,
        }
    }

    /// Short operation name for logs and error messages.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Clone(_) => "clone",
            Self::Destroy(_) => "destroy",
            Self::Reconfigure { .. } => "reconfigure",
            Self::PowerOn(_) => "power on",
            Self::PowerOff(_) => "power off",
            Self::CreateSnapshot { .. } => "create snapshot",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Blocked,
    Succeeded,
    Failed,
}

/// GET /api/cis/tasks/{task}
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl TaskInfo {
    /// Best-effort human-readable message out of a task error payload.
    pub fn error_message(&self) -> String {
        let Some(err) = self.error.as_ref() else {
            return "task failed without error details".to_string();
        };
        err.get("messages")
            .and_then(|m| m.as_array())
            .and_then(|msgs| msgs.first())
            .and_then(|m| m.get("default_message"))
            .or_else(|| err.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string())
    }
}
