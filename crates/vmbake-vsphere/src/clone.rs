//! Template cloning.
//!
//! Resolves placement (folder, resource pool, optional datastore), builds
//! the clone spec and runs the clone task. A linked clone is based on the
//! template's current snapshot; asking for one on a template without
//! snapshots fails before anything is submitted.

use serde_json::Value;

use crate::error::{VsphereError, VsphereResult};
use crate::session::Session;
use crate::snapshot::SnapshotManager;
use crate::task::TaskRunner;
use crate::types::*;

pub struct CloneManager<'a> {
    session: &'a Session,
}

impl<'a> CloneManager<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Clone `config.template` into a new, powered-off VM.
    ///
    /// A failed clone is not cleaned up here.
    pub async fn clone_vm(&self, config: &CloneConfig) -> VsphereResult<VirtualMachine> {
        let spec = self.build_spec(config).await?;
        log::info!(
            "Cloning '{}' into '{}'{}",
            config.template,
            config.vm_name,
            if spec.snapshot.is_some() { " (linked)" } else { "" }
        );

        let result = TaskRunner::new(self.session)
            .run(TaskRequest::Clone(spec))
            .await?;
        let id = cloned_vm_ref(result)?;
        log::info!("Cloned VM '{}' is {}", config.vm_name, id);
        Ok(VirtualMachine::new(id, &config.vm_name))
    }

    /// Resolve everything the clone needs without submitting anything.
    pub async fn build_spec(&self, config: &CloneConfig) -> VsphereResult<VmCloneSpec> {
        if config.vm_name.trim().is_empty() {
            return Err(VsphereError::config("clone target VM name is empty"));
        }

        let finder = self.session.finder();
        let template = finder.virtual_machine(&config.template).await?;
        let folder = finder.folder_or_default(config.folder.as_deref()).await?;
        let resource_pool = finder
            .resource_pool_or_default(config.host.as_deref(), config.resource_pool.as_deref())
            .await?;
        let datastore = finder.datastore_if_named(config.datastore.as_deref()).await?;

        let mut spec = VmCloneSpec {
            source: template.id.clone(),
            name: config.vm_name.clone(),
            placement: VmPlacement {
                folder,
                resource_pool,
                datastore,
            },
            power_on: false,
            disk_move_type: None,
            snapshot: None,
        };

        if config.linked_clone {
            let base = SnapshotManager::new(self.session)
                .current_snapshot(&template.id)
                .await?
                .ok_or_else(|| {
                    VsphereError::precondition(
                        "`linked_clone=true`, but template has no snapshots",
                    )
                })?;
            spec.disk_move_type = Some(DiskMoveType::CreateNewChildDiskBacking);
            spec.snapshot = Some(base);
        }

        Ok(spec)
    }
}

fn cloned_vm_ref(result: Option<Value>) -> VsphereResult<VmRef> {
    match result {
        Some(Value::String(id)) if !id.is_empty() => Ok(VmRef::new(id)),
        other => Err(VsphereError::task(format!(
            "clone task finished without a VM reference (result: {other:?})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VsphereErrorKind;
    use crate::fake::FakeVsphere;

    async fn session(fake: &FakeVsphere) -> Session {
        Session::open(Box::new(fake.clone()), None, PollConfig::default())
            .await
            .unwrap()
    }

    fn clone_config(template: &str, name: &str) -> CloneConfig {
        CloneConfig {
            template: template.into(),
            vm_name: name.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn linked_clone_without_snapshot_submits_nothing() {
        let fake = FakeVsphere::single_datacenter();
        fake.add_vm("base-no-snap", VmPowerState::PoweredOff);
        let session = session(&fake).await;

        let mut config = clone_config("base-no-snap", "vm1");
        config.linked_clone = true;
        let err = CloneManager::new(&session).clone_vm(&config).await.unwrap_err();

        assert_eq!(err.kind, VsphereErrorKind::Precondition);
        assert!(err.message.contains("template has no snapshots"));
        assert!(fake.submitted().is_empty());
    }

    #[tokio::test]
    async fn linked_clone_uses_the_current_snapshot() {
        let fake = FakeVsphere::single_datacenter();
        let tpl = fake.add_vm("tpl1", VmPowerState::PoweredOff);
        fake.set_snapshot_chain(&tpl, &["S1", "S2"]);
        let session = session(&fake).await;

        let mut config = clone_config("tpl1", "vm1");
        config.linked_clone = true;
        CloneManager::new(&session).clone_vm(&config).await.unwrap();

        match fake.submitted().as_slice() {
            [TaskRequest::Clone(spec)] => {
                assert_eq!(spec.snapshot, Some(SnapshotRef::new("S2")));
                assert_eq!(spec.disk_move_type, Some(DiskMoveType::CreateNewChildDiskBacking));
                assert!(!spec.power_on);
            }
            other => panic!("unexpected tasks: {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_clone_into_defaults() {
        let fake = FakeVsphere::single_datacenter();
        let tpl = fake.add_vm("tpl1", VmPowerState::PoweredOff);
        let session = session(&fake).await;

        let vm = CloneManager::new(&session)
            .clone_vm(&clone_config("tpl1", "vm1"))
            .await
            .unwrap();

        assert_eq!(vm.name, "vm1");
        assert_ne!(vm.id, tpl);
        assert_eq!(fake.power_of(&vm.id), Some(VmPowerState::PoweredOff));
        assert_eq!(fake.folder_of(&vm.id), Some(fake.default_folder()));

        match fake.submitted().as_slice() {
            [TaskRequest::Clone(spec)] => {
                assert_eq!(spec.source, tpl);
                assert_eq!(spec.placement.resource_pool, fake.default_pool());
                assert_eq!(spec.placement.datastore, None);
                assert_eq!(spec.snapshot, None);
                assert_eq!(spec.disk_move_type, None);
            }
            other => panic!("unexpected tasks: {other:?}"),
        }
    }

    #[tokio::test]
    async fn named_placement_is_resolved() {
        let fake = FakeVsphere::single_datacenter();
        fake.add_vm("tpl1", VmPowerState::PoweredOff);
        let folder = fake.add_folder("/dc1/vm/builds");
        let pool = fake.add_pool("/dc1/host/cluster1/Resources/ci");
        let ds = fake.add_datastore("ssd1");
        let session = session(&fake).await;

        let config = CloneConfig {
            folder: Some("builds".into()),
            host: Some("cluster1".into()),
            resource_pool: Some("ci".into()),
            datastore: Some("ssd1".into()),
            ..clone_config("tpl1", "vm1")
        };
        let spec = CloneManager::new(&session).build_spec(&config).await.unwrap();

        assert_eq!(spec.placement, VmPlacement { folder, resource_pool: pool, datastore: Some(ds) });
        assert!(fake.submitted().is_empty());
    }

    #[tokio::test]
    async fn missing_template_fails_before_submitting() {
        let fake = FakeVsphere::single_datacenter();
        let session = session(&fake).await;
        let err = CloneManager::new(&session)
            .clone_vm(&clone_config("ghost", "vm1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, VsphereErrorKind::NotFound);
        assert!(fake.submitted().is_empty());
    }

    #[tokio::test]
    async fn failed_clone_task_is_surfaced() {
        let fake = FakeVsphere::single_datacenter();
        fake.add_vm("tpl1", VmPowerState::PoweredOff);
        fake.fail_tasks_with("A specified parameter was not correct: spec.location.pool");
        let session = session(&fake).await;

        let err = CloneManager::new(&session)
            .clone_vm(&clone_config("tpl1", "vm1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, VsphereErrorKind::TaskError);
        assert_eq!(fake.submitted().len(), 1);
    }

    #[test]
    fn clone_result_must_be_a_vm_id() {
        assert_eq!(
            cloned_vm_ref(Some(Value::String("vm-9".into()))).unwrap(),
            VmRef::new("vm-9")
        );
        assert!(cloned_vm_ref(None).is_err());
        assert!(cloned_vm_ref(Some(serde_json::json!({ "vm": 1 }))).is_err());
    }
}
