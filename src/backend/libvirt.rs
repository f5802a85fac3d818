use std::path::PathBuf;

use virt::connect::Connect;
use virt::domain::Domain;
use virt::error as virt_error;
use virt::network::Network;

use crate::backend::{BackendClient, DomainHandle, DomainState, DomainSummary};
use crate::domain_xml;
use crate::error::ProvisionError;

struct ConnGuard(Connect);

impl std::ops::Deref for ConnGuard {
    type Target = Connect;
    fn deref(&self) -> &Connect {
        &self.0
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.0.close().ok();
    }
}

/// Backend talking to a libvirt daemon over the configured URI.
pub struct LibvirtBackend {
    conn: ConnGuard,
}

impl LibvirtBackend {
    /// Open a connection to libvirt. Fails with `BackendUnavailable`
    /// before any state is touched if the daemon is unreachable.
    pub fn connect(uri: &str) -> Result<Self, ProvisionError> {
        // Suppress libvirt's default error handler that prints to stderr.
        // Errors are surfaced through Result only, not by the C library.
        virt_error::clear_error_callback();

        let conn = Connect::open(Some(uri)).map_err(|e| ProvisionError::BackendUnavailable {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        Ok(LibvirtBackend {
            conn: ConnGuard(conn),
        })
    }

    fn lookup(&self, name: &str) -> Result<Domain, ProvisionError> {
        Domain::lookup_by_name(&self.conn, name).map_err(|_| ProvisionError::DomainNotFound {
            name: name.to_string(),
        })
    }
}

fn map_state(state: u32) -> DomainState {
    match state {
        virt::sys::VIR_DOMAIN_RUNNING => DomainState::Running,
        virt::sys::VIR_DOMAIN_BLOCKED => DomainState::Blocked,
        virt::sys::VIR_DOMAIN_PAUSED => DomainState::Paused,
        virt::sys::VIR_DOMAIN_SHUTDOWN => DomainState::ShuttingDown,
        virt::sys::VIR_DOMAIN_SHUTOFF => DomainState::ShutOff,
        virt::sys::VIR_DOMAIN_CRASHED => DomainState::Crashed,
        virt::sys::VIR_DOMAIN_PMSUSPENDED => DomainState::Suspended,
        _ => DomainState::Unknown,
    }
}

fn handle_of(dom: &Domain) -> Result<DomainHandle, ProvisionError> {
    Ok(DomainHandle {
        name: dom.get_name().map_err(|e| ProvisionError::Libvirt {
            message: format!("failed to read domain name: {e}"),
            hint: "the domain may have been undefined concurrently".into(),
        })?,
        uuid: dom.get_uuid_string().map_err(|e| ProvisionError::Libvirt {
            message: format!("failed to read domain UUID: {e}"),
            hint: "the domain may have been undefined concurrently".into(),
        })?,
    })
}

impl BackendClient for LibvirtBackend {
    async fn define_domain(&self, xml: &str) -> Result<DomainHandle, ProvisionError> {
        let dom = Domain::define_xml(&self.conn, xml).map_err(|e| ProvisionError::Libvirt {
            message: format!("failed to define domain: {e}"),
            hint: "check the generated domain XML for errors".into(),
        })?;
        handle_of(&dom)
    }

    async fn start_domain(&self, handle: &DomainHandle) -> Result<(), ProvisionError> {
        let dom = self.lookup(&handle.name)?;
        dom.create().map_err(|e| ProvisionError::Libvirt {
            message: format!("failed to start domain '{}': {e}", handle.name),
            hint: format!("check `virsh start {}` for details", handle.name),
        })?;
        tracing::info!(name = %handle.name, "domain started");
        Ok(())
    }

    async fn domain_exists(&self, name: &str) -> Result<bool, ProvisionError> {
        Ok(Domain::lookup_by_name(&self.conn, name).is_ok())
    }

    async fn network_exists(&self, name: &str) -> Result<bool, ProvisionError> {
        Ok(Network::lookup_by_name(&self.conn, name).is_ok())
    }

    async fn lookup_domain(&self, name: &str) -> Result<DomainHandle, ProvisionError> {
        handle_of(&self.lookup(name)?)
    }

    async fn domain_state(&self, name: &str) -> Result<DomainState, ProvisionError> {
        let dom = self.lookup(name)?;
        let info = dom.get_info().map_err(|e| ProvisionError::Libvirt {
            message: format!("failed to query domain '{name}': {e}"),
            hint: "check libvirt permissions".into(),
        })?;
        Ok(map_state(info.state))
    }

    async fn list_domains(&self) -> Result<Vec<DomainSummary>, ProvisionError> {
        let domains =
            self.conn
                .list_all_domains(0)
                .map_err(|e| ProvisionError::Libvirt {
                    message: format!("failed to list domains: {e}"),
                    hint: "check libvirt permissions".into(),
                })?;

        let mut summaries = Vec::with_capacity(domains.len());
        for dom in &domains {
            let name = match dom.get_name() {
                Ok(n) => n,
                Err(_) => continue, // undefined between list and query
            };
            let info = dom.get_info().map_err(|e| ProvisionError::Libvirt {
                message: format!("failed to query domain '{name}': {e}"),
                hint: "check libvirt permissions".into(),
            })?;
            summaries.push(DomainSummary {
                name,
                state: map_state(info.state).as_str().to_string(),
                memory_mb: info.memory / 1024, // libvirt reports KiB
                vcpus: info.nr_virt_cpu as u64,
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn shutdown_domain(&self, name: &str) -> Result<(), ProvisionError> {
        let dom = self.lookup(name)?;
        dom.shutdown().map_err(|e| ProvisionError::Libvirt {
            message: format!("shutdown of '{name}' failed: {e}"),
            hint: "the guest may not have ACPI support; try --force".into(),
        })?;
        tracing::info!(name, "sent ACPI shutdown");
        Ok(())
    }

    async fn destroy_domain(&self, name: &str) -> Result<(), ProvisionError> {
        let dom = self.lookup(name)?;
        dom.destroy().map_err(|e| ProvisionError::Libvirt {
            message: format!("force stop of '{name}' failed: {e}"),
            hint: "check libvirt permissions".into(),
        })?;
        tracing::info!(name, "domain force stopped");
        Ok(())
    }

    async fn undefine_domain(&self, name: &str) -> Result<(), ProvisionError> {
        let dom = self.lookup(name)?;
        dom.undefine().map_err(|e| ProvisionError::Libvirt {
            message: format!("failed to undefine domain '{name}': {e}"),
            hint: "check libvirt permissions".into(),
        })?;
        tracing::info!(name, "domain undefined");
        Ok(())
    }

    async fn domain_disk_path(&self, name: &str) -> Result<Option<PathBuf>, ProvisionError> {
        let dom = self.lookup(name)?;
        let xml = dom.get_xml_desc(0).map_err(|e| ProvisionError::Libvirt {
            message: format!("failed to read XML for '{name}': {e}"),
            hint: "check libvirt permissions".into(),
        })?;
        Ok(domain_xml::disk_source_from_xml(&xml))
    }

    async fn vnc_port(&self, name: &str) -> Result<Option<u16>, ProvisionError> {
        let dom = self.lookup(name)?;
        let xml = dom.get_xml_desc(0).map_err(|e| ProvisionError::Libvirt {
            message: format!("failed to read XML for '{name}': {e}"),
            hint: "check libvirt permissions".into(),
        })?;
        Ok(domain_xml::vnc_port_from_xml(&xml))
    }
}
