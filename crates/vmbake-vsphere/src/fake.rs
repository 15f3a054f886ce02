//! In-memory vCenter used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::api::VsphereApi;
use crate::error::{VsphereError, VsphereErrorKind, VsphereResult};
use crate::inventory::InventoryPath;
use crate::types::*;

#[derive(Debug, Default)]
struct FakeVm {
    name: String,
    power: VmPowerState,
    folder: Option<FolderRef>,
    snapshots: Vec<SnapshotSummary>,
    current_snapshot: Option<SnapshotRef>,
    config: Option<VmConfigSpec>,
    scripted_power: VecDeque<VmPowerState>,
    scripted_ips: VecDeque<Option<String>>,
    ip: Option<String>,
    no_guest_tools: bool,
    shutdown_requested: bool,
    template: bool,
}

#[derive(Debug)]
struct PendingTask {
    request: TaskRequest,
    polls_left: u32,
}

#[derive(Debug, Default)]
struct State {
    next_id: u32,
    datacenters: Vec<Datacenter>,
    folders: Vec<(String, FolderRef)>,
    pools: Vec<(String, ResourcePoolRef)>,
    datastores: Vec<(String, DatastoreRef)>,
    vms: Vec<(VmRef, FakeVm)>,
    default_folder: Option<FolderRef>,
    default_pool: Option<ResourcePoolRef>,
    tasks: HashMap<TaskRef, PendingTask>,
    task_polls: u32,
    task_failure: Option<String>,
    reject_kind: Option<VsphereErrorKind>,
    fail_power_queries: bool,
    submitted: Vec<TaskRequest>,
    pool_lookups: Vec<String>,
    task_info_calls: u32,
    power_queries: u32,
    logged_out: bool,
}

impl State {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn vm(&mut self, vm: &VmRef) -> VsphereResult<&mut FakeVm> {
        self.vms
            .iter_mut()
            .find(|(id, _)| id == vm)
            .map(|(_, v)| v)
            .ok_or_else(|| VsphereError::not_found(format!("no vm {vm}")))
    }

    fn apply(&mut self, request: &TaskRequest) -> VsphereResult<Option<Value>> {
        match request {
            TaskRequest::Clone(spec) => {
                let id = VmRef::new(self.next("vm"));
                let vm = FakeVm {
                    name: spec.name.clone(),
                    power: VmPowerState::PoweredOff,
                    folder: Some(spec.placement.folder.clone()),
                    ..Default::default()
                };
                self.vms.push((id.clone(), vm));
                return Ok(Some(Value::String(id.to_string())));
            }
            TaskRequest::Destroy(vm) => {
                self.vms.retain(|(id, _)| id != vm);
            }
            TaskRequest::Reconfigure { vm, spec } => {
                self.vm(vm)?.config = Some(spec.clone());
            }
            TaskRequest::PowerOn(vm) => self.vm(vm)?.power = VmPowerState::PoweredOn,
            TaskRequest::PowerOff(vm) => self.vm(vm)?.power = VmPowerState::PoweredOff,
            TaskRequest::CreateSnapshot { vm, spec } => {
                let id = SnapshotRef::new(self.next("snapshot"));
                let target = self.vm(vm)?;
                target.snapshots.push(SnapshotSummary {
                    snapshot: id.clone(),
                    name: Some(spec.name.clone()),
                    parent: target.current_snapshot.clone(),
                });
                target.current_snapshot = Some(id);
            }
        }
        Ok(None)
    }
}

/// Shared handle; clones observe the same inventory.
#[derive(Debug, Clone, Default)]
pub struct FakeVsphere {
    state: Arc<Mutex<State>>,
}

impl FakeVsphere {
    pub fn new() -> Self {
        Self::default()
    }

    /// One datacenter `dc1` with its root VM folder and one default pool.
    pub fn single_datacenter() -> Self {
        let fake = Self::new().with_datacenter("dc1");
        let folder = fake.add_folder("/dc1/vm");
        let pool = fake.add_pool("/dc1/host/*/Resources");
        {
            let mut state = fake.lock();
            state.default_folder = Some(folder);
            state.default_pool = Some(pool);
        }
        fake
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // ── Inventory setup ─────────────────────────────────────────────

    pub fn with_datacenter(self, name: &str) -> Self {
        {
            let mut state = self.lock();
            let id = DatacenterRef::new(state.next("datacenter"));
            state.datacenters.push(Datacenter { id, name: name.to_string() });
        }
        self
    }

    /// The first datacenter.
    pub fn datacenter(&self) -> Datacenter {
        self.lock().datacenters[0].clone()
    }

    pub fn default_folder(&self) -> FolderRef {
        self.lock().default_folder.clone().unwrap()
    }

    pub fn default_pool(&self) -> ResourcePoolRef {
        self.lock().default_pool.clone().unwrap()
    }

    pub fn add_folder(&self, path: &str) -> FolderRef {
        let mut state = self.lock();
        let id = FolderRef::new(state.next("group-v"));
        state.folders.push((path.to_string(), id.clone()));
        id
    }

    pub fn add_pool(&self, path: &str) -> ResourcePoolRef {
        let mut state = self.lock();
        let id = ResourcePoolRef::new(state.next("resgroup"));
        state.pools.push((path.to_string(), id.clone()));
        id
    }

    pub fn add_datastore(&self, name: &str) -> DatastoreRef {
        let mut state = self.lock();
        let id = DatastoreRef::new(state.next("datastore"));
        state.datastores.push((name.to_string(), id.clone()));
        id
    }

    /// Names need not be unique.
    pub fn add_vm(&self, name: &str, power: VmPowerState) -> VmRef {
        let mut state = self.lock();
        let id = VmRef::new(state.next("vm"));
        let folder = state.default_folder.clone();
        state.vms.push((
            id.clone(),
            FakeVm { name: name.to_string(), power, folder, ..Default::default() },
        ));
        id
    }

    /// Linear chain of snapshots; the last one is current. Ids equal names.
    pub fn set_snapshot_chain(&self, vm: &VmRef, names: &[&str]) {
        let mut state = self.lock();
        let target = state.vm(vm).unwrap();
        target.snapshots.clear();
        let mut parent = None;
        for name in names {
            let id = SnapshotRef::new(*name);
            target.snapshots.push(SnapshotSummary {
                snapshot: id.clone(),
                name: Some(name.to_string()),
                parent: parent.clone(),
            });
            parent = Some(id);
        }
        target.current_snapshot = parent;
    }

    // ── Behaviour scripting ─────────────────────────────────────────

    /// Every task reports `RUNNING` this many times before finishing.
    pub fn with_task_polls(self, polls: u32) -> Self {
        self.lock().task_polls = polls;
        self
    }

    pub fn fail_tasks_with(&self, message: &str) {
        self.lock().task_failure = Some(message.to_string());
    }

    pub fn reject_submissions(&self, kind: VsphereErrorKind) {
        self.lock().reject_kind = Some(kind);
    }

    pub fn fail_power_queries(&self) {
        self.lock().fail_power_queries = true;
    }

    /// Answers for the next power state queries, before falling back to
    /// the VM's actual state.
    pub fn script_power_states(&self, vm: &VmRef, states: &[VmPowerState]) {
        self.lock().vm(vm).unwrap().scripted_power = states.iter().copied().collect();
    }

    /// Answers for the next guest IP queries. The last one sticks.
    pub fn script_guest_ips(&self, vm: &VmRef, ips: &[Option<&str>]) {
        let mut state = self.lock();
        let target = state.vm(vm).unwrap();
        target.scripted_ips = ips.iter().map(|ip| ip.map(str::to_string)).collect();
        target.ip = ips.last().copied().flatten().map(str::to_string);
    }

    pub fn remove_guest_tools(&self, vm: &VmRef) {
        self.lock().vm(vm).unwrap().no_guest_tools = true;
    }

    // ── Observations ────────────────────────────────────────────────

    pub fn submitted(&self) -> Vec<TaskRequest> {
        self.lock().submitted.clone()
    }

    pub fn pool_lookups(&self) -> Vec<String> {
        self.lock().pool_lookups.clone()
    }

    pub fn task_info_calls(&self) -> u32 {
        self.lock().task_info_calls
    }

    pub fn power_queries(&self) -> u32 {
        self.lock().power_queries
    }

    /// `None` once the VM is gone.
    pub fn power_of(&self, vm: &VmRef) -> Option<VmPowerState> {
        self.lock().vm(vm).ok().map(|v| v.power)
    }

    pub fn folder_of(&self, vm: &VmRef) -> Option<FolderRef> {
        self.lock().vm(vm).ok().and_then(|v| v.folder.clone())
    }

    pub fn config_of(&self, vm: &VmRef) -> Option<VmConfigSpec> {
        self.lock().vm(vm).ok().and_then(|v| v.config.clone())
    }

    pub fn shutdown_requested(&self, vm: &VmRef) -> bool {
        self.lock().vm(vm).map(|v| v.shutdown_requested).unwrap_or(false)
    }

    pub fn is_template(&self, vm: &VmRef) -> bool {
        self.lock().vm(vm).map(|v| v.template).unwrap_or(false)
    }

    pub fn logged_out(&self) -> bool {
        self.lock().logged_out
    }
}

#[async_trait]
impl VsphereApi for FakeVsphere {
    async fn find_datacenters(&self, name: Option<&str>) -> VsphereResult<Vec<Datacenter>> {
        Ok(self
            .lock()
            .datacenters
            .iter()
            .filter(|dc| name.map_or(true, |n| dc.name == n))
            .cloned()
            .collect())
    }

    async fn find_vms(&self, _dc: &Datacenter, name: &str) -> VsphereResult<Vec<VmRef>> {
        Ok(self
            .lock()
            .vms
            .iter()
            .filter(|(_, vm)| vm.name == name)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn find_folders(
        &self,
        _dc: &Datacenter,
        path: &InventoryPath,
    ) -> VsphereResult<Vec<FolderRef>> {
        Ok(self
            .lock()
            .folders
            .iter()
            .filter(|(p, _)| p == path.as_str())
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn find_resource_pools(
        &self,
        _dc: &Datacenter,
        path: &InventoryPath,
    ) -> VsphereResult<Vec<ResourcePoolRef>> {
        let mut state = self.lock();
        state.pool_lookups.push(path.to_string());
        Ok(state
            .pools
            .iter()
            .filter(|(p, _)| p == path.as_str())
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn find_datastores(
        &self,
        _dc: &Datacenter,
        name: &str,
    ) -> VsphereResult<Vec<DatastoreRef>> {
        Ok(self
            .lock()
            .datastores
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn snapshot_info(&self, vm: &VmRef) -> VsphereResult<Option<SnapshotTree>> {
        let mut state = self.lock();
        let vm = state.vm(vm)?;
        if vm.snapshots.is_empty() {
            return Ok(None);
        }
        Ok(Some(SnapshotTree {
            current_snapshot: vm.current_snapshot.clone(),
            snapshots: vm.snapshots.clone(),
        }))
    }

    async fn power_state(&self, vm: &VmRef) -> VsphereResult<VmPowerState> {
        let mut state = self.lock();
        state.power_queries += 1;
        if state.fail_power_queries {
            return Err(VsphereError::api(500, "com.vmware.vapi.std.errors.service_unavailable"));
        }
        let vm = state.vm(vm)?;
        Ok(vm.scripted_power.pop_front().unwrap_or(vm.power))
    }

    async fn guest_ip(&self, vm: &VmRef) -> VsphereResult<Option<String>> {
        let mut state = self.lock();
        let vm = state.vm(vm)?;
        Ok(match vm.scripted_ips.pop_front() {
            Some(ip) => ip,
            None => vm.ip.clone(),
        })
    }

    async fn submit_task(&self, request: &TaskRequest) -> VsphereResult<TaskRef> {
        let mut state = self.lock();
        if let Some(kind) = state.reject_kind.clone() {
            return Err(VsphereError::new(kind, format!("{} rejected", request.operation())));
        }
        state.submitted.push(request.clone());
        let task = TaskRef::new(state.next("task"));
        let polls_left = state.task_polls;
        state
            .tasks
            .insert(task.clone(), PendingTask { request: request.clone(), polls_left });
        Ok(task)
    }

    async fn task_info(&self, task: &TaskRef) -> VsphereResult<TaskInfo> {
        let mut state = self.lock();
        state.task_info_calls += 1;
        let pending = state
            .tasks
            .get_mut(task)
            .ok_or_else(|| VsphereError::not_found(format!("no task {task}")))?;
        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return Ok(TaskInfo { status: TaskStatus::Running, ..Default::default() });
        }
        let request = pending.request.clone();
        state.tasks.remove(task);

        if let Some(message) = state.task_failure.clone() {
            return Ok(TaskInfo {
                status: TaskStatus::Failed,
                error: Some(json!({ "messages": [{ "default_message": message }] })),
                ..Default::default()
            });
        }
        let result = state.apply(&request)?;
        Ok(TaskInfo {
            status: TaskStatus::Succeeded,
            progress: Some(100),
            result,
            ..Default::default()
        })
    }

    async fn shutdown_guest(&self, vm: &VmRef) -> VsphereResult<()> {
        let mut state = self.lock();
        let vm = state.vm(vm)?;
        if vm.no_guest_tools {
            return Err(VsphereError::api(400, "VMware Tools is not running in the guest"));
        }
        vm.shutdown_requested = true;
        Ok(())
    }

    async fn mark_as_template(&self, vm: &VmRef) -> VsphereResult<()> {
        self.lock().vm(vm)?.template = true;
        Ok(())
    }

    async fn check_session(&self) -> VsphereResult<bool> {
        Ok(!self.lock().logged_out)
    }

    async fn logout(&self) -> VsphereResult<()> {
        self.lock().logged_out = true;
        Ok(())
    }
}
