//! Inventory path composition and exactly-one lookups with default fallback.
//!
//! Paths follow the vSphere inventory layout:
//!
//! - `/<datacenter>/vm/<folder>/...` for VM folders
//! - `/<datacenter>/host/<host or cluster>/Resources/<pool>/...` for pools
//!
//! A `*` segment matches any object at that level.

use std::fmt;

use crate::api::VsphereApi;
use crate::error::{VsphereError, VsphereResult};
use crate::types::*;

/// Segment matching every child.
pub const WILDCARD: &str = "*";

/// An absolute inventory path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InventoryPath(String);

impl InventoryPath {
    /// `/<dc>/vm/<folder>`, or the datacenter's root VM folder when `folder`
    /// is absent or blank.
    pub fn vm_folder(datacenter: &str, folder: Option<&str>) -> Self {
        match non_blank(folder) {
            Some(f) => Self(format!("/{datacenter}/vm/{}", f.trim_matches('/'))),
            None => Self(format!("/{datacenter}/vm")),
        }
    }

    /// `/<dc>/host/<host>/Resources/<pool>`. An absent host matches any
    /// compute resource.
    pub fn resource_pool(datacenter: &str, host: Option<&str>, pool: &str) -> Self {
        let host = non_blank(host).unwrap_or(WILDCARD);
        Self(format!(
            "/{datacenter}/host/{}/Resources/{}",
            host.trim_matches('/'),
            pool.trim_matches('/')
        ))
    }

    /// Root pool of every compute resource in the datacenter.
    pub fn default_resource_pool(datacenter: &str) -> Self {
        Self(format!("/{datacenter}/host/{WILDCARD}/Resources"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Segments following `/<datacenter>/<root>`.
    pub fn below(&self, datacenter: &str, root: &str) -> VsphereResult<Vec<&str>> {
        let mut segs = self.segments();
        match (segs.next(), segs.next()) {
            (Some(dc), Some(r)) if dc == datacenter && r == root => Ok(segs.collect()),
            _ => Err(VsphereError::config(format!(
                "'{self}' is not below /{datacenter}/{root}"
            ))),
        }
    }
}

impl fmt::Display for InventoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim_matches('/').trim().is_empty())
}

fn exactly_one<T>(mut found: Vec<T>, what: &str, name: &str) -> VsphereResult<T> {
    match found.len() {
        0 => Err(VsphereError::not_found(format!("{what} '{name}' not found"))),
        1 => Ok(found.remove(0)),
        n => Err(VsphereError::ambiguous(format!(
            "{what} '{name}' resolves to {n} objects"
        ))),
    }
}

/// Resolve the working datacenter: by name, or the only one there is.
pub async fn datacenter_or_default(
    api: &dyn VsphereApi,
    name: Option<&str>,
) -> VsphereResult<Datacenter> {
    match non_blank(name) {
        Some(name) => exactly_one(api.find_datacenters(Some(name)).await?, "datacenter", name),
        None => {
            let mut all = api.find_datacenters(None).await?;
            match all.len() {
                0 => Err(VsphereError::not_found("no default datacenter found")),
                1 => Ok(all.remove(0)),
                _ => Err(VsphereError::ambiguous(
                    "default datacenter resolves to multiple instances, please specify",
                )),
            }
        }
    }
}

/// Inventory lookups scoped to one datacenter.
pub struct Finder<'a> {
    api: &'a dyn VsphereApi,
    datacenter: &'a Datacenter,
}

impl<'a> Finder<'a> {
    pub fn new(api: &'a dyn VsphereApi, datacenter: &'a Datacenter) -> Self {
        Self { api, datacenter }
    }

    /// A VM or template by exact name.
    pub async fn virtual_machine(&self, name: &str) -> VsphereResult<VirtualMachine> {
        let found = self.api.find_vms(self.datacenter, name).await?;
        let id = exactly_one(found, "vm", name)?;
        Ok(VirtualMachine::new(id, name))
    }

    /// The named folder below the datacenter's VM folder, or the VM folder
    /// itself.
    pub async fn folder_or_default(&self, folder: Option<&str>) -> VsphereResult<FolderRef> {
        let path = InventoryPath::vm_folder(&self.datacenter.name, folder);
        let found = self.api.find_folders(self.datacenter, &path).await?;
        exactly_one(found, "folder", path.as_str())
    }

    /// The named pool under `host`, or the datacenter's default pool when no
    /// pool is named.
    pub async fn resource_pool_or_default(
        &self,
        host: Option<&str>,
        pool: Option<&str>,
    ) -> VsphereResult<ResourcePoolRef> {
        let dc = &self.datacenter.name;
        match non_blank(pool) {
            Some(pool) => {
                let path = InventoryPath::resource_pool(dc, host, pool);
                let found = self.api.find_resource_pools(self.datacenter, &path).await?;
                exactly_one(found, "resource pool", path.as_str())
            }
            None => {
                if let Some(host) = non_blank(host) {
                    log::debug!("No resource pool named, ignoring host '{host}' and using the default pool");
                }
                let path = InventoryPath::default_resource_pool(dc);
                let mut found = self.api.find_resource_pools(self.datacenter, &path).await?;
                match found.len() {
                    0 => Err(VsphereError::not_found("no default resource pool found")),
                    1 => Ok(found.remove(0)),
                    _ => Err(VsphereError::ambiguous(
                        "default resource pool resolves to multiple instances, please specify",
                    )),
                }
            }
        }
    }

    /// A datastore, only when one is named. `None` leaves the choice to
    /// vCenter placement.
    pub async fn datastore_if_named(
        &self,
        name: Option<&str>,
    ) -> VsphereResult<Option<DatastoreRef>> {
        match non_blank(name) {
            Some(name) => {
                let found = self.api.find_datastores(self.datacenter, name).await?;
                exactly_one(found, "datastore", name).map(Some)
            }
            None => Ok(None),
        }
    }
}
