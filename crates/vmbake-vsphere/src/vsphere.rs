//! vSphere REST API HTTP client with session-based authentication.
//!
//! Communicates with vCenter via `https://{host}/api/...`, manages the
//! session lifecycle (create / delete) and implements [`VsphereApi`] on top
//! of the `/api/vcenter/*` and `/api/cis/tasks` endpoints. Mutating calls
//! are sent with `vmw-task=true` so vCenter answers with a task id instead
//! of blocking the request.

use crate::api::VsphereApi;
use crate::error::{VsphereError, VsphereErrorKind, VsphereResult};
use crate::inventory::{InventoryPath, WILDCARD};
use crate::types::*;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const SESSION_HEADER: &str = "vmware-api-session-id";
const ROOT_POOL: &str = "Resources";

/// vSphere REST API client.
pub struct VsphereClient {
    client: Client,
    base_url: String,
    session_id: Option<String>,
    config: ConnectConfig,
}

impl VsphereClient {
    /// Build a new client from config (does NOT create a session yet).
    pub fn new(config: &ConnectConfig) -> VsphereResult<Self> {
        let base_url = endpoint_url(config)?;

        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VsphereError::connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            session_id: None,
            config: config.clone(),
        })
    }

    /// Build the client and log in.
    pub async fn connect(config: &ConnectConfig) -> VsphereResult<Self> {
        let mut client = Self::new(config)?;
        client.login().await?;
        Ok(client)
    }

    /// Base URL for API calls.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether we have an active session.
    pub fn is_connected(&self) -> bool {
        self.session_id.is_some()
    }

    /// Current config.
    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    // ── Session management ──────────────────────────────────────────

    /// Create a new API session (POST /api/session).
    pub async fn login(&mut self) -> VsphereResult<()> {
        let url = format!("{}/api/session", self.base_url);

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(VsphereError::auth("Invalid credentials"));
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VsphereError::api(
                status.as_u16(),
                format!("Login failed: {body}"),
            ));
        }

        // Session ID comes back as a quoted JSON string
        let session_id: String = resp.json().await.map_err(|e| {
            VsphereError::parse(format!("Failed to parse session response: {e}"))
        })?;

        log::info!("Logged in to vSphere at {} as {}", self.base_url, self.config.username);
        self.session_id = Some(session_id);
        Ok(())
    }

    // ── HTTP helpers ────────────────────────────────────────────────

    fn require_session(&self) -> VsphereResult<&str> {
        self.session_id
            .as_deref()
            .ok_or_else(|| VsphereError::auth("Not logged in, no active session"))
    }

    /// GET a JSON response.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> VsphereResult<T> {
        self.get_with_params(path, &[]).await
    }

    /// GET a JSON response with query params.
    async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> VsphereResult<T> {
        let sid = self.require_session()?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header(SESSION_HEADER, sid)
            .query(params)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Self::parse_response(resp).await
    }

    /// POST with no body, discarding the response.
    async fn post_empty(&self, path: &str) -> VsphereResult<()> {
        let sid = self.require_session()?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .header(SESSION_HEADER, sid)
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn send_task(&self, call: TaskCall) -> VsphereResult<TaskRef> {
        let sid = self.require_session()?;
        let url = format!("{}{}", self.base_url, call.path);
        let mut req = self
            .client
            .request(call.method, &url)
            .header(SESSION_HEADER, sid);
        if let Some(body) = &call.body {
            req = req.json(body);
        }
        let resp = Self::check_status(req.send().await?).await?;
        Self::parse_response(resp).await
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn check_status(resp: Response) -> VsphereResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn parse_response<T: DeserializeOwned>(resp: Response) -> VsphereResult<T> {
        let text = resp.text().await.map_err(|e| {
            VsphereError::parse(format!("Failed to read response body: {e}"))
        })?;

        if text.is_empty() {
            // Some vSphere endpoints return empty body for success
            return serde_json::from_str("null").map_err(|e| {
                VsphereError::parse(format!("Cannot deserialise empty response: {e}"))
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            let end = text.char_indices().nth(500).map_or(text.len(), |(i, _)| i);
            VsphereError::parse(format!("JSON parse error: {e}, body: {}", &text[..end]))
        })
    }
}

#[async_trait]
impl VsphereApi for VsphereClient {
    async fn find_datacenters(&self, name: Option<&str>) -> VsphereResult<Vec<Datacenter>> {
        let params: Vec<(&str, &str)> = name.map(|n| ("names", n)).into_iter().collect();
        let dcs: Vec<DatacenterSummary> = self
            .get_with_params("/api/vcenter/datacenter", &params)
            .await?;
        Ok(dcs.into_iter().map(Datacenter::from).collect())
    }

    async fn find_vms(&self, dc: &Datacenter, name: &str) -> VsphereResult<Vec<VmRef>> {
        let vms: Vec<VmSummary> = self
            .get_with_params(
                "/api/vcenter/vm",
                &[("datacenters", dc.id.as_str()), ("names", name)],
            )
            .await?;
        Ok(vms.into_iter().map(|v| v.vm).collect())
    }

    async fn find_folders(
        &self,
        dc: &Datacenter,
        path: &InventoryPath,
    ) -> VsphereResult<Vec<FolderRef>> {
        walk_folders(self, dc, path).await
    }

    async fn find_resource_pools(
        &self,
        dc: &Datacenter,
        path: &InventoryPath,
    ) -> VsphereResult<Vec<ResourcePoolRef>> {
        walk_resource_pools(self, dc, path).await
    }

    async fn find_datastores(
        &self,
        dc: &Datacenter,
        name: &str,
    ) -> VsphereResult<Vec<DatastoreRef>> {
        let stores: Vec<DatastoreSummary> = self
            .get_with_params(
                "/api/vcenter/datastore",
                &[("datacenters", dc.id.as_str()), ("names", name)],
            )
            .await?;
        Ok(stores.into_iter().map(|d| d.datastore).collect())
    }

    async fn snapshot_info(&self, vm: &VmRef) -> VsphereResult<Option<SnapshotTree>> {
        let path = format!("/api/vcenter/vm/{vm}/snapshots");
        tree_or_none(self.get(&path).await)
    }

    async fn power_state(&self, vm: &VmRef) -> VsphereResult<VmPowerState> {
        #[derive(serde::Deserialize)]
        struct PowerInfo {
            state: VmPowerState,
        }
        let path = format!("/api/vcenter/vm/{vm}/power");
        let info: PowerInfo = self.get(&path).await?;
        Ok(info.state)
    }

    async fn guest_ip(&self, vm: &VmRef) -> VsphereResult<Option<String>> {
        let path = format!("/api/vcenter/vm/{vm}/guest/identity");
        ip_from_identity(self.get(&path).await)
    }

    async fn submit_task(&self, request: &TaskRequest) -> VsphereResult<TaskRef> {
        let call = task_call(request)?;
        log::debug!("Submitting {} task: {} {}", request.operation(), call.method, call.path);
        self.send_task(call).await
    }

    async fn task_info(&self, task: &TaskRef) -> VsphereResult<TaskInfo> {
        self.get(&format!("/api/cis/tasks/{task}")).await
    }

    async fn shutdown_guest(&self, vm: &VmRef) -> VsphereResult<()> {
        let path = format!("/api/vcenter/vm/{vm}/guest/power?action=shutdown");
        self.post_empty(&path).await
    }

    async fn mark_as_template(&self, vm: &VmRef) -> VsphereResult<()> {
        let path = format!("/api/vcenter/vm/{vm}?action=mark-as-template");
        self.post_empty(&path).await
    }

    /// Check if the session is still valid (GET /api/session).
    async fn check_session(&self) -> VsphereResult<bool> {
        let sid = self.require_session()?;
        let url = format!("{}/api/session", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header(SESSION_HEADER, sid)
            .send()
            .await?;

        Ok(resp.status().is_success())
    }

    /// Delete the current session (DELETE /api/session).
    async fn logout(&self) -> VsphereResult<()> {
        if let Some(ref sid) = self.session_id {
            let url = format!("{}/api/session", self.base_url);
            let _ = self
                .client
                .delete(&url)
                .header(SESSION_HEADER, sid.as_str())
                .send()
                .await;
        }
        Ok(())
    }
}

// ── Inventory walking ───────────────────────────────────────────────

/// The single-level inventory queries a path walk is made of.
#[async_trait]
trait InventoryLookup: Send + Sync {
    async fn vm_root_folder(&self, dc: &Datacenter) -> VsphereResult<FolderRef>;

    /// VM folders directly below `parent`; `None` matches every name.
    async fn child_folders(
        &self,
        parent: &FolderRef,
        name: Option<&str>,
    ) -> VsphereResult<Vec<FolderRef>>;

    /// Root pool of every compute resource in the datacenter.
    async fn all_root_pools(&self, dc: &Datacenter) -> VsphereResult<Vec<ResourcePoolRef>>;

    /// Cluster ids named `name`.
    async fn clusters(&self, dc: &Datacenter, name: &str) -> VsphereResult<Vec<String>>;

    async fn cluster_root_pool(&self, cluster: &str) -> VsphereResult<ResourcePoolRef>;

    /// Host ids named `name`.
    async fn hosts(&self, dc: &Datacenter, name: &str) -> VsphereResult<Vec<String>>;

    async fn host_root_pools(&self, host: &str) -> VsphereResult<Vec<ResourcePoolRef>>;

    async fn child_pools(
        &self,
        parent: &ResourcePoolRef,
        name: Option<&str>,
    ) -> VsphereResult<Vec<ResourcePoolRef>>;
}

#[async_trait]
impl InventoryLookup for VsphereClient {
    async fn vm_root_folder(&self, dc: &Datacenter) -> VsphereResult<FolderRef> {
        let info: DatacenterInfo = self
            .get(&format!("/api/vcenter/datacenter/{}", dc.id))
            .await?;
        Ok(info.vm_folder)
    }

    async fn child_folders(
        &self,
        parent: &FolderRef,
        name: Option<&str>,
    ) -> VsphereResult<Vec<FolderRef>> {
        let mut params = vec![("type", "VIRTUAL_MACHINE"), ("parent_folders", parent.as_str())];
        params.extend(name.map(|n| ("names", n)));
        let found: Vec<FolderSummary> = self.get_with_params("/api/vcenter/folder", &params).await?;
        Ok(found.into_iter().map(|f| f.folder).collect())
    }

    async fn all_root_pools(&self, dc: &Datacenter) -> VsphereResult<Vec<ResourcePoolRef>> {
        let pools: Vec<ResourcePoolSummary> = self
            .get_with_params(
                "/api/vcenter/resource-pool",
                &[("datacenters", dc.id.as_str()), ("names", ROOT_POOL)],
            )
            .await?;
        Ok(pools.into_iter().map(|p| p.resource_pool).collect())
    }

    async fn clusters(&self, dc: &Datacenter, name: &str) -> VsphereResult<Vec<String>> {
        let found: Vec<ClusterSummary> = self
            .get_with_params(
                "/api/vcenter/cluster",
                &[("datacenters", dc.id.as_str()), ("names", name)],
            )
            .await?;
        Ok(found.into_iter().map(|c| c.cluster).collect())
    }

    async fn cluster_root_pool(&self, cluster: &str) -> VsphereResult<ResourcePoolRef> {
        let info: ClusterInfo = self.get(&format!("/api/vcenter/cluster/{cluster}")).await?;
        Ok(info.resource_pool)
    }

    async fn hosts(&self, dc: &Datacenter, name: &str) -> VsphereResult<Vec<String>> {
        let found: Vec<HostSummary> = self
            .get_with_params(
                "/api/vcenter/host",
                &[("datacenters", dc.id.as_str()), ("names", name)],
            )
            .await?;
        Ok(found.into_iter().map(|h| h.host).collect())
    }

    async fn host_root_pools(&self, host: &str) -> VsphereResult<Vec<ResourcePoolRef>> {
        let pools: Vec<ResourcePoolSummary> = self
            .get_with_params(
                "/api/vcenter/resource-pool",
                &[("hosts", host), ("names", ROOT_POOL)],
            )
            .await?;
        Ok(pools.into_iter().map(|p| p.resource_pool).collect())
    }

    async fn child_pools(
        &self,
        parent: &ResourcePoolRef,
        name: Option<&str>,
    ) -> VsphereResult<Vec<ResourcePoolRef>> {
        let mut params = vec![("parent_resource_pools", parent.as_str())];
        params.extend(name.map(|n| ("names", n)));
        let found: Vec<ResourcePoolSummary> = self
            .get_with_params("/api/vcenter/resource-pool", &params)
            .await?;
        Ok(found.into_iter().map(|p| p.resource_pool).collect())
    }
}

/// `None` for the wildcard segment.
fn name_filter(segment: &str) -> Option<&str> {
    (segment != WILDCARD).then_some(segment)
}

/// Expand `/<dc>/vm/<seg>/...` one level at a time from the datacenter's
/// VM folder.
async fn walk_folders(
    lookup: &dyn InventoryLookup,
    dc: &Datacenter,
    path: &InventoryPath,
) -> VsphereResult<Vec<FolderRef>> {
    let segments = path.below(&dc.name, "vm")?;
    let mut current = vec![lookup.vm_root_folder(dc).await?];
    for seg in segments {
        let mut next = Vec::new();
        for parent in &current {
            next.extend(lookup.child_folders(parent, name_filter(seg)).await?);
        }
        current = next;
    }
    Ok(current)
}

/// Expand `/<dc>/host/<compute>/Resources/<seg>/...` from the root pools
/// of the matching compute resources.
async fn walk_resource_pools(
    lookup: &dyn InventoryLookup,
    dc: &Datacenter,
    path: &InventoryPath,
) -> VsphereResult<Vec<ResourcePoolRef>> {
    let segments = path.below(&dc.name, "host")?;
    let (compute, pools) = match segments.as_slice() {
        [compute, root, pools @ ..] if *root == ROOT_POOL => (*compute, pools),
        _ => {
            return Err(VsphereError::config(format!(
                "'{path}' is not a resource pool path"
            )))
        }
    };

    let mut current = compute_root_pools(lookup, dc, compute).await?;
    for seg in pools {
        let mut next = Vec::new();
        for parent in &current {
            next.extend(lookup.child_pools(parent, name_filter(seg)).await?);
        }
        current = next;
    }
    Ok(current)
}

/// Root pools of the compute resource named `compute`. A compute resource
/// is either a cluster or a standalone host; clusters win.
async fn compute_root_pools(
    lookup: &dyn InventoryLookup,
    dc: &Datacenter,
    compute: &str,
) -> VsphereResult<Vec<ResourcePoolRef>> {
    if compute == WILDCARD {
        return lookup.all_root_pools(dc).await;
    }

    let clusters = lookup.clusters(dc, compute).await?;
    if !clusters.is_empty() {
        let mut roots = Vec::with_capacity(clusters.len());
        for cluster in &clusters {
            roots.push(lookup.cluster_root_pool(cluster).await?);
        }
        return Ok(roots);
    }

    let mut roots = Vec::new();
    for host in lookup.hosts(dc, compute).await? {
        roots.extend(lookup.host_root_pools(&host).await?);
    }
    Ok(roots)
}

// ── Response mapping ────────────────────────────────────────────────

fn status_error(status: StatusCode, body: &str) -> VsphereError {
    let code = status.as_u16();
    match status {
        StatusCode::UNAUTHORIZED => VsphereError::auth(format!("Session expired or invalid: {body}")),
        StatusCode::FORBIDDEN => VsphereError::new(
            VsphereErrorKind::AccessDenied,
            format!("Access denied: {body}"),
        ),
        StatusCode::NOT_FOUND => VsphereError::not_found(format!("Resource not found: {body}")),
        _ => VsphereError::api(code, format!("API error {code}: {body}")),
    }
}

/// The snapshots endpoint answers 404 for a VM without snapshots.
fn tree_or_none(
    response: VsphereResult<Option<SnapshotTree>>,
) -> VsphereResult<Option<SnapshotTree>> {
    match response {
        Ok(Some(tree)) if tree.current_snapshot.is_some() || !tree.snapshots.is_empty() => {
            Ok(Some(tree))
        }
        Ok(_) => Ok(None),
        Err(e) if e.kind == VsphereErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Guest identity is 503 until VMware Tools run in the guest.
fn ip_from_identity(response: VsphereResult<GuestIdentity>) -> VsphereResult<Option<String>> {
    match response {
        Ok(identity) => Ok(identity.ip_address.filter(|ip| !ip.is_empty())),
        Err(e) if e.kind == VsphereErrorKind::ApiError(503) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Validate the endpoint and return the API base URL without trailing slash.
fn endpoint_url(config: &ConnectConfig) -> VsphereResult<String> {
    let host = config.host.trim();
    if host.is_empty() {
        return Err(VsphereError::config("vCenter host is empty"));
    }
    let url = Url::parse(&format!("https://{}:{}", host, config.port))
        .map_err(|e| VsphereError::config(format!("Invalid vCenter address '{host}': {e}")))?;
    if url.path() != "/" || url.query().is_some() || !url.username().is_empty() {
        return Err(VsphereError::config(format!(
            "vCenter address '{host}' must be a bare host name"
        )));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// HTTP shape of a task-backed call.
#[derive(Debug, Clone, PartialEq)]
struct TaskCall {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
}

fn task_call(request: &TaskRequest) -> VsphereResult<TaskCall> {
    let (method, path, body) = match request {
        TaskRequest::Clone(spec) => (
            Method::POST,
            "/api/vcenter/vm?action=clone".to_string(),
            Some(serde_json::to_value(spec)?),
        ),
        TaskRequest::Destroy(vm) => (Method::DELETE, format!("/api/vcenter/vm/{vm}"), None),
        TaskRequest::Reconfigure { vm, spec } => (
            Method::POST,
            format!("/api/vcenter/vm/{vm}?action=reconfigure"),
            Some(serde_json::to_value(spec)?),
        ),
        TaskRequest::PowerOn(vm) => (
            Method::POST,
            format!("/api/vcenter/vm/{vm}/power?action=start"),
            None,
        ),
        TaskRequest::PowerOff(vm) => (
            Method::POST,
            format!("/api/vcenter/vm/{vm}/power?action=stop"),
            None,
        ),
        TaskRequest::CreateSnapshot { vm, spec } => (
            Method::POST,
            format!("/api/vcenter/vm/{vm}/snapshots"),
            Some(serde_json::to_value(spec)?),
        ),
    };
    let sep = if path.contains('?') { '&' } else { '?' };
    Ok(TaskCall {
        method,
        path: format!("{path}{sep}vmw-task=true"),
        body,
    })
}
