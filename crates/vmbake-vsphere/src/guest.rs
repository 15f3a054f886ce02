//! Waiting on the guest: network readiness and OS shutdown.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{VsphereError, VsphereResult};
use crate::session::Session;
use crate::types::*;
use crate::vm::VmManager;

pub struct GuestWaiter<'a> {
    session: &'a Session,
}

impl<'a> GuestWaiter<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Block until the guest tools report an IP address.
    ///
    /// There is no deadline of its own; cancel the session to give up.
    pub async fn wait_for_ip(&self, vm: &VmRef) -> VsphereResult<String> {
        let interval = self.session.polling().ip_interval();
        let poll = async {
            loop {
                if let Some(ip) = self.session.api().guest_ip(vm).await? {
                    log::info!("{vm} reported IP {ip}");
                    return Ok(ip);
                }
                tokio::time::sleep(interval).await;
            }
        };
        self.session
            .until_cancelled(&format!("an IP address on {vm}"), poll)
            .await
    }

    /// Poll the power state until the VM is off or `timeout` has passed.
    ///
    /// Guest shutdown completion is not pushed by vCenter, so this polls at
    /// the session's shutdown interval. A failed power state query ends the
    /// wait with that error.
    pub async fn wait_for_shutdown(&self, vm: &VmRef, timeout: Duration) -> VsphereResult<()> {
        let interval = self.session.polling().shutdown_interval();
        let deadline = Instant::now() + timeout;
        let vms = VmManager::new(self.session);
        let poll = async {
            loop {
                if vms.power_state(vm).await? == VmPowerState::PoweredOff {
                    log::info!("{vm} has shut down");
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(VsphereError::timeout(
                        "Timeout while waiting for machine to shut down.",
                    ));
                }
                tokio::time::sleep(interval).await;
            }
        };
        self.session
            .until_cancelled(&format!("{vm} to shut down"), poll)
            .await
    }
}
