//! # vmbake – vSphere VM Lifecycle Driver
//!
//! Drives a vCenter endpoint through the lifecycle of a build machine:
//! clone from a template, reconfigure, power, wait for the guest, snapshot
//! and convert back to a template.
//!
//! ## Modules
//!
//! - **types**: Config structs, object references and REST payloads
//! - **error**: Crate-specific error types
//! - **api**: `VsphereApi`, the remote capability surface
//! - **vsphere**: vSphere REST API HTTP client with session-based auth
//! - **session**: Datacenter-scoped session + cancellation
//! - **inventory**: Inventory paths and exactly-one lookups
//! - **task**: Submit-and-await for vCenter tasks
//! - **clone**: Full / linked clone orchestration
//! - **vm**: Power, reconfigure, destroy, template conversion
//! - **snapshot**: Current snapshot lookup and creation
//! - **guest**: IP and shutdown waiters
//! - **driver**: Aggregate facade used by the build pipeline

pub mod types;
pub mod error;
pub mod api;
pub mod vsphere;
pub mod session;
pub mod inventory;
pub mod task;
pub mod clone;
pub mod vm;
pub mod snapshot;
pub mod guest;
pub mod driver;

#[cfg(test)]
mod fake;

pub use driver::Driver;
pub use error::{VsphereError, VsphereErrorKind, VsphereResult};
