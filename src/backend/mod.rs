pub mod libvirt;

use std::fmt;
use std::path::PathBuf;

use facet::Facet;

use crate::error::ProvisionError;

/// Opaque reference to a defined domain, returned by the backend.
#[derive(Debug, Clone)]
pub struct DomainHandle {
    pub name: String,
    pub uuid: String,
}

/// Domain run state as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    Running,
    Blocked,
    Paused,
    ShuttingDown,
    ShutOff,
    Crashed,
    Suspended,
    Unknown,
}

impl DomainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainState::Running => "running",
            DomainState::Blocked => "blocked",
            DomainState::Paused => "paused",
            DomainState::ShuttingDown => "shutting down",
            DomainState::ShutOff => "shut off",
            DomainState::Crashed => "crashed",
            DomainState::Suspended => "suspended",
            DomainState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `provision list` output.
#[derive(Debug, Clone, Facet)]
pub struct DomainSummary {
    pub name: String,
    pub state: String,
    pub memory_mb: u64,
    pub vcpus: u64,
}

/// Interface to the virtualization daemon.
///
/// The engine is generic over this trait so provisioning logic can be
/// exercised against an in-memory backend in tests while production
/// talks to libvirt.
#[allow(async_fn_in_trait)] // trait is internal-only
pub trait BackendClient {
    /// Define (but do not start) a domain from the given XML.
    async fn define_domain(&self, xml: &str) -> Result<DomainHandle, ProvisionError>;

    /// Start a previously defined domain.
    async fn start_domain(&self, handle: &DomainHandle) -> Result<(), ProvisionError>;

    async fn domain_exists(&self, name: &str) -> Result<bool, ProvisionError>;

    async fn network_exists(&self, name: &str) -> Result<bool, ProvisionError>;

    /// Resolve a defined domain by name, `DomainNotFound` otherwise.
    async fn lookup_domain(&self, name: &str) -> Result<DomainHandle, ProvisionError>;

    async fn domain_state(&self, name: &str) -> Result<DomainState, ProvisionError>;

    async fn list_domains(&self) -> Result<Vec<DomainSummary>, ProvisionError>;

    /// Request an ACPI shutdown. Returns once the request is delivered,
    /// not when the guest has finished powering off.
    async fn shutdown_domain(&self, name: &str) -> Result<(), ProvisionError>;

    /// Force the domain off immediately.
    async fn destroy_domain(&self, name: &str) -> Result<(), ProvisionError>;

    /// Remove the domain definition from the backend.
    async fn undefine_domain(&self, name: &str) -> Result<(), ProvisionError>;

    /// Primary disk path from the domain's XML, if any.
    async fn domain_disk_path(&self, name: &str) -> Result<Option<PathBuf>, ProvisionError>;

    /// Allocated VNC port, if the domain has a VNC display and is running.
    async fn vnc_port(&self, name: &str) -> Result<Option<u16>, ProvisionError>;
}
