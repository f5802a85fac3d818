use std::path::Path;

use crate::backend::{BackendClient, DomainHandle};
use crate::domain_xml;
use crate::error::ProvisionError;
use crate::spec::{DisplayMode, GuestSpec, GuestSpecBuilder};

/// Orchestrates guest creation against a backend.
///
/// A spec is consumed exactly once: resolve the network, check the name,
/// define the domain, start it. Everything after a successful start is
/// the backend's responsibility.
pub struct ProvisionEngine<B: BackendClient> {
    backend: B,
}

impl<B: BackendClient> ProvisionEngine<B> {
    pub fn new(backend: B) -> Self {
        ProvisionEngine { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Define and start a domain from a validated spec.
    ///
    /// Takes the spec by value: a spec is consumed exactly once, and the
    /// domain belongs to the backend afterwards. The network is resolved
    /// before anything is defined, so a missing network never leaves a
    /// half-created domain behind.
    pub async fn provision(&self, spec: GuestSpec) -> Result<DomainHandle, ProvisionError> {
        let network = spec.network.name();
        if !self.backend.network_exists(network).await? {
            return Err(ProvisionError::NetworkNotFound {
                name: network.to_string(),
            });
        }

        // Check-then-act on the name: libvirt itself rejects duplicate
        // names atomically at define time, so this pre-check only exists
        // to fail with a precise error before XML generation. We rely on
        // the backend for the race-free guarantee.
        if self.backend.domain_exists(&spec.name).await? {
            return Err(ProvisionError::NameConflict {
                name: spec.name.clone(),
            });
        }

        let xml = domain_xml::generate_domain_xml(&spec);
        tracing::debug!(name = %spec.name, "defining domain");
        let handle = self.backend.define_domain(&xml).await?;
        self.backend.start_domain(&handle).await?;
        tracing::info!(name = %handle.name, uuid = %handle.uuid, "domain provisioned");
        Ok(handle)
    }

    /// Finish provisioning a guest whose overlay was just cloned: build
    /// the spec and provision it, removing the overlay if anything fails
    /// after it was written. The overlay is the only artifact a clone
    /// creates, so a failed clone leaves nothing behind.
    pub async fn provision_cloned(
        &self,
        overlay: &Path,
        builder: GuestSpecBuilder,
    ) -> Result<(DomainHandle, DisplayMode), ProvisionError> {
        let result = match builder.build() {
            Ok(spec) => {
                let display = spec.display;
                self.provision(spec).await.map(|handle| (handle, display))
            }
            Err(e) => Err(e),
        };
        if result.is_err() && tokio::fs::remove_file(overlay).await.is_ok() {
            tracing::info!(path = %overlay.display(), "removed cloned image after failure");
        }
        result
    }
}
