use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ProvisionError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("image path already exists: {path}")]
    #[diagnostic(help("choose a different path or delete the existing file"))]
    PathExists { path: String },

    #[error("invalid image capacity '{given}': {reason}")]
    #[diagnostic(help("capacity must be a positive size such as 100G, 512M, or a byte count"))]
    InvalidCapacity { given: String, reason: String },

    #[error("invalid guest spec: {}", .problems.join("; "))]
    InvalidSpec { problems: Vec<String> },

    #[error("cannot reach libvirt at {uri}: {message}")]
    #[diagnostic(help("ensure libvirtd is running and you have access to {uri}"))]
    BackendUnavailable { uri: String, message: String },

    #[error("a domain named '{name}' already exists")]
    #[diagnostic(help("pick another name or delete the existing domain first"))]
    NameConflict { name: String },

    #[error("virtual network '{name}' not found")]
    #[diagnostic(help("define and start it first, e.g. `virsh net-start {name}`"))]
    NetworkNotFound { name: String },

    #[error("domain '{name}' is not defined")]
    DomainNotFound { name: String },

    #[error("{message}")]
    #[diagnostic(help("{hint}"))]
    Libvirt { message: String, hint: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {message}")]
    ExternalCommand { command: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },
}

impl ProvisionError {
    /// Stable per-kind process exit code. Scripts can branch on these
    /// without parsing stderr.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::PathExists { .. } => 2,
            ProvisionError::InvalidCapacity { .. } => 3,
            ProvisionError::InvalidSpec { .. } => 4,
            ProvisionError::BackendUnavailable { .. } => 5,
            ProvisionError::NameConflict { .. } => 6,
            ProvisionError::NetworkNotFound { .. } => 7,
            ProvisionError::DomainNotFound { .. } => 8,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(
            ProvisionError::PathExists {
                path: "/tmp/a.qcow2".into()
            }
            .exit_code(),
            2
        );
        assert_eq!(
            ProvisionError::InvalidCapacity {
                given: "0".into(),
                reason: "must be greater than zero".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            ProvisionError::InvalidSpec { problems: vec![] }.exit_code(),
            4
        );
        assert_eq!(
            ProvisionError::BackendUnavailable {
                uri: "qemu:///system".into(),
                message: "connection refused".into()
            }
            .exit_code(),
            5
        );
        assert_eq!(
            ProvisionError::NameConflict { name: "vm1".into() }.exit_code(),
            6
        );
        assert_eq!(
            ProvisionError::NetworkNotFound {
                name: "default".into()
            }
            .exit_code(),
            7
        );
        assert_eq!(
            ProvisionError::DomainNotFound { name: "vm1".into() }.exit_code(),
            8
        );
        assert_eq!(
            ProvisionError::Validation {
                message: "x".into()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn invalid_spec_lists_all_problems() {
        let err = ProvisionError::InvalidSpec {
            problems: vec!["name must not be empty".into(), "vcpus must be at least 1".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("name must not be empty"));
        assert!(msg.contains("vcpus must be at least 1"));
    }
}
