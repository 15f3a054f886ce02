//! An authenticated connection scoped to one datacenter.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::api::VsphereApi;
use crate::error::{VsphereError, VsphereResult};
use crate::inventory::{self, Finder};
use crate::types::{Datacenter, PollConfig};

/// Connection, resolved datacenter, poll intervals and the cancellation
/// token every wait in the session races against.
pub struct Session {
    api: Box<dyn VsphereApi>,
    datacenter: Datacenter,
    polling: PollConfig,
    cancel: CancellationToken,
}

impl Session {
    /// Resolve the datacenter (by name, or the only one available) and bind
    /// the session to it. If that fails no session is produced and `api` is
    /// logged out before it is dropped.
    pub async fn open(
        api: Box<dyn VsphereApi>,
        datacenter: Option<&str>,
        polling: PollConfig,
    ) -> VsphereResult<Self> {
        let datacenter = match inventory::datacenter_or_default(api.as_ref(), datacenter).await {
            Ok(dc) => dc,
            Err(e) => {
                if let Err(logout) = api.logout().await {
                    log::warn!("Logout after failed datacenter resolution failed: {logout}");
                }
                return Err(e);
            }
        };
        log::info!("Using datacenter '{}' ({})", datacenter.name, datacenter.id);
        Ok(Self {
            api,
            datacenter,
            polling,
            cancel: CancellationToken::new(),
        })
    }

    pub fn api(&self) -> &dyn VsphereApi {
        self.api.as_ref()
    }

    pub fn datacenter(&self) -> &Datacenter {
        &self.datacenter
    }

    pub fn polling(&self) -> &PollConfig {
        &self.polling
    }

    /// Cancelling this token aborts every in-flight wait of the session.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn finder(&self) -> Finder<'_> {
        Finder::new(self.api(), &self.datacenter)
    }

    /// Drive `fut` to completion unless the session is cancelled first.
    pub(crate) async fn until_cancelled<T, F>(&self, waiting_for: &str, fut: F) -> VsphereResult<T>
    where
        F: Future<Output = VsphereResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                log::warn!("Session cancelled while waiting for {waiting_for}");
                Err(VsphereError::cancelled(format!("cancelled while waiting for {waiting_for}")))
            }
            res = fut => res,
        }
    }
}
