use std::fmt;
use std::path::PathBuf;

use crate::error::ProvisionError;
use crate::image::DiskImage;

/// Where the guest's operating system comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    /// Boot an installer ISO against an empty disk.
    InstallMedia { iso: PathBuf },
    /// The disk already contains a bootable system.
    ImportExisting,
}

/// Guest display wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Vnc,
    None,
}

/// Name of a virtual network that must already exist at the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRef(String);

impl NetworkRef {
    pub fn new(name: impl Into<String>) -> Self {
        NetworkRef(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully validated guest definition, consumed exactly once by the
/// provision engine. After the domain is defined, its lifecycle belongs
/// to the backend, not to this tool.
#[derive(Debug, Clone)]
pub struct GuestSpec {
    pub name: String,
    pub memory_mb: u64,
    pub vcpus: u32,
    pub disk: DiskImage,
    pub source: SourceMode,
    pub os_variant: Option<String>,
    pub network: NetworkRef,
    pub display: DisplayMode,
}

#[derive(Debug, Clone)]
enum SourceField {
    InstallMedia(Option<PathBuf>),
    ImportExisting,
}

/// Assembles and validates a [`GuestSpec`].
///
/// `build` collects every missing or conflicting field and reports them
/// all at once, so an operator fixes the whole invocation in one pass
/// instead of replaying it error by error.
#[derive(Debug, Default)]
pub struct GuestSpecBuilder {
    name: Option<String>,
    memory_mb: Option<u64>,
    vcpus: Option<u32>,
    disk: Option<PathBuf>,
    source: Option<SourceField>,
    os_variant: Option<String>,
    network: Option<String>,
    display: Option<DisplayMode>,
}

impl GuestSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    pub fn vcpus(mut self, vcpus: u32) -> Self {
        self.vcpus = Some(vcpus);
        self
    }

    pub fn disk(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk = Some(path.into());
        self
    }

    /// Install from an ISO. `None` records the intent without media so
    /// that `build` can report the missing ISO alongside other problems.
    pub fn install_media(mut self, iso: Option<PathBuf>) -> Self {
        self.source = Some(SourceField::InstallMedia(iso));
        self
    }

    /// The disk already carries a bootable system.
    pub fn import_existing(mut self) -> Self {
        self.source = Some(SourceField::ImportExisting);
        self
    }

    pub fn os_variant(mut self, variant: Option<String>) -> Self {
        self.os_variant = variant;
        self
    }

    pub fn network(mut self, name: impl Into<String>) -> Self {
        self.network = Some(name.into());
        self
    }

    pub fn display(mut self, display: DisplayMode) -> Self {
        self.display = Some(display);
        self
    }

    /// Validate all fields and assemble the spec.
    ///
    /// Fails with `InvalidSpec` listing every problem found.
    pub fn build(self) -> Result<GuestSpec, ProvisionError> {
        let mut problems = Vec::new();

        let name = match self.name.as_deref() {
            None | Some("") => {
                problems.push("name must not be empty".to_string());
                String::new()
            }
            Some(n) => n.to_string(),
        };

        let memory_mb = match self.memory_mb {
            None => {
                problems.push("memory_mb is required".to_string());
                0
            }
            Some(0) => {
                problems.push("memory_mb must be greater than zero".to_string());
                0
            }
            Some(m) => m,
        };

        let vcpus = match self.vcpus {
            None => {
                problems.push("vcpus is required".to_string());
                0
            }
            Some(0) => {
                problems.push("vcpus must be at least 1".to_string());
                0
            }
            Some(c) => c,
        };

        let disk = match &self.disk {
            None => {
                problems.push("disk path is required".to_string());
                None
            }
            Some(path) => match DiskImage::existing(path) {
                Ok(img) => Some(img),
                Err(_) => {
                    problems.push(format!(
                        "disk image not found or unreadable: {}",
                        path.display()
                    ));
                    None
                }
            },
        };

        let source = match self.source {
            None => {
                problems.push("source mode is required (install media or import)".to_string());
                None
            }
            Some(SourceField::InstallMedia(None)) => {
                problems.push("install media requires an ISO path (--cdrom)".to_string());
                None
            }
            Some(SourceField::InstallMedia(Some(iso))) => {
                if iso.exists() {
                    Some(SourceMode::InstallMedia { iso })
                } else {
                    problems.push(format!("install ISO not found: {}", iso.display()));
                    None
                }
            }
            Some(SourceField::ImportExisting) => Some(SourceMode::ImportExisting),
        };

        if !problems.is_empty() {
            return Err(ProvisionError::InvalidSpec { problems });
        }

        Ok(GuestSpec {
            name,
            memory_mb,
            vcpus,
            // problems is empty, so both resolved above
            disk: disk.expect("validated"),
            source: source.expect("validated"),
            os_variant: self.os_variant,
            network: NetworkRef::new(self.network.unwrap_or_else(|| "default".to_string())),
            display: self.display.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{self, ImageFormat};

    fn disk_in(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("disk.qcow2");
        image::create_image(&path, ImageFormat::Qcow2, 1024 * 1024 * 1024).unwrap();
        path
    }

    #[test]
    fn valid_import_spec_builds() {
        let dir = tempfile::tempdir().unwrap();
        let disk = disk_in(&dir);

        let spec = GuestSpecBuilder::new()
            .name("web01")
            .memory_mb(2048)
            .vcpus(2)
            .disk(&disk)
            .import_existing()
            .build()
            .unwrap();

        assert_eq!(spec.name, "web01");
        assert_eq!(spec.memory_mb, 2048);
        assert_eq!(spec.vcpus, 2);
        assert_eq!(spec.source, SourceMode::ImportExisting);
        assert_eq!(spec.network.name(), "default");
        assert_eq!(spec.display, DisplayMode::Vnc);
    }

    #[test]
    fn install_media_without_iso_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let disk = disk_in(&dir);

        let err = GuestSpecBuilder::new()
            .name("web01")
            .memory_mb(2048)
            .vcpus(2)
            .disk(&disk)
            .install_media(None)
            .build()
            .unwrap_err();

        match err {
            ProvisionError::InvalidSpec { problems } => {
                assert!(problems.iter().any(|p| p.contains("ISO")));
            }
            other => panic!("expected InvalidSpec, got {other:?}"),
        }
    }

    #[test]
    fn all_problems_reported_at_once() {
        let err = GuestSpecBuilder::new()
            .name("")
            .memory_mb(0)
            .vcpus(0)
            .build()
            .unwrap_err();

        match err {
            ProvisionError::InvalidSpec { problems } => {
                assert!(problems.iter().any(|p| p.contains("name")));
                assert!(problems.iter().any(|p| p.contains("memory_mb")));
                assert!(problems.iter().any(|p| p.contains("vcpus")));
                assert!(problems.iter().any(|p| p.contains("disk")));
                assert!(problems.iter().any(|p| p.contains("source mode")));
            }
            other => panic!("expected InvalidSpec, got {other:?}"),
        }
    }

    #[test]
    fn missing_disk_file_is_rejected() {
        let err = GuestSpecBuilder::new()
            .name("web01")
            .memory_mb(2048)
            .vcpus(2)
            .disk("/nonexistent/disk.qcow2")
            .import_existing()
            .build()
            .unwrap_err();

        match err {
            ProvisionError::InvalidSpec { problems } => {
                assert!(problems.iter().any(|p| p.contains("disk image not found")));
            }
            other => panic!("expected InvalidSpec, got {other:?}"),
        }
    }

    #[test]
    fn install_media_with_iso_builds() {
        let dir = tempfile::tempdir().unwrap();
        let disk = disk_in(&dir);
        let iso = dir.path().join("installer.iso");
        std::fs::write(&iso, b"iso").unwrap();

        let spec = GuestSpecBuilder::new()
            .name("web01")
            .memory_mb(4096)
            .vcpus(4)
            .disk(&disk)
            .install_media(Some(iso.clone()))
            .network("lab")
            .display(DisplayMode::None)
            .build()
            .unwrap();

        assert_eq!(spec.source, SourceMode::InstallMedia { iso });
        assert_eq!(spec.network.name(), "lab");
        assert_eq!(spec.display, DisplayMode::None);
    }

    #[test]
    fn missing_iso_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let disk = disk_in(&dir);

        let err = GuestSpecBuilder::new()
            .name("web01")
            .memory_mb(2048)
            .vcpus(2)
            .disk(&disk)
            .install_media(Some(PathBuf::from("/nonexistent/installer.iso")))
            .build()
            .unwrap_err();

        match err {
            ProvisionError::InvalidSpec { problems } => {
                assert!(problems.iter().any(|p| p.contains("install ISO not found")));
            }
            other => panic!("expected InvalidSpec, got {other:?}"),
        }
    }
}
