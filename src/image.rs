use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ProvisionError;
use crate::qcow2;

/// On-disk format of a virtual disk image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Qcow2,
    Raw,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Qcow2 => "qcow2",
            ImageFormat::Raw => "raw",
        }
    }

    /// Guess the format of an existing image from its file extension.
    /// Cloud images ship as `.img`/`.raw` for raw and `.qcow2` for qcow2;
    /// anything unrecognized is treated as qcow2, the libvirt default.
    pub fn from_path(path: &Path) -> ImageFormat {
        match path.extension().and_then(|e| e.to_str()) {
            Some("raw") | Some("img") => ImageFormat::Raw,
            _ => ImageFormat::Qcow2,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qcow2" => Ok(ImageFormat::Qcow2),
            "raw" => Ok(ImageFormat::Raw),
            other => Err(ProvisionError::Validation {
                message: format!("unknown image format: '{other}' (use qcow2 or raw)"),
            }),
        }
    }
}

/// A virtual disk image file. Created once and immutable afterwards;
/// the guest owns its content from the moment the domain starts.
#[derive(Debug, Clone)]
pub struct DiskImage {
    pub path: PathBuf,
    pub format: ImageFormat,
    pub capacity_bytes: u64,
}

impl DiskImage {
    /// Reference an image file that already exists on disk.
    ///
    /// For qcow2 files the capacity is the virtual size from the header;
    /// for raw files it is the file length.
    pub fn existing(path: &Path) -> Result<DiskImage, ProvisionError> {
        let meta = std::fs::metadata(path).map_err(|e| ProvisionError::Io {
            context: format!("disk image not found: {}", path.display()),
            source: e,
        })?;

        match qcow2::read_virtual_size(path) {
            Some(virtual_size) => Ok(DiskImage {
                path: path.to_path_buf(),
                format: ImageFormat::Qcow2,
                capacity_bytes: virtual_size,
            }),
            None => Ok(DiskImage {
                path: path.to_path_buf(),
                format: ImageFormat::from_path(path),
                capacity_bytes: meta.len(),
            }),
        }
    }
}

/// Create a new empty disk image at `path`.
///
/// Fails with `PathExists` if a file is already present at `path` and
/// `InvalidCapacity` if `capacity_bytes` is zero. qcow2 images are
/// generated natively; raw images are created as sparse files.
pub fn create_image(
    path: &Path,
    format: ImageFormat,
    capacity_bytes: u64,
) -> Result<DiskImage, ProvisionError> {
    if capacity_bytes == 0 {
        return Err(ProvisionError::InvalidCapacity {
            given: "0".into(),
            reason: "capacity must be greater than zero".into(),
        });
    }
    if path.exists() {
        return Err(ProvisionError::PathExists {
            path: path.display().to_string(),
        });
    }

    match format {
        ImageFormat::Qcow2 => qcow2::create_qcow2(path, capacity_bytes)?,
        ImageFormat::Raw => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ProvisionError::Io {
                    context: format!("creating directory {}", parent.display()),
                    source: e,
                })?;
            }
            let file = std::fs::File::create(path).map_err(|e| ProvisionError::Io {
                context: format!("creating raw image {}", path.display()),
                source: e,
            })?;
            // Sparse: allocates on demand as the guest writes.
            file.set_len(capacity_bytes).map_err(|e| ProvisionError::Io {
                context: format!("sizing raw image {}", path.display()),
                source: e,
            })?;
            tracing::info!(path = %path.display(), capacity_bytes, "created raw image");
        }
    }

    Ok(DiskImage {
        path: path.to_path_buf(),
        format,
        capacity_bytes,
    })
}

/// Clone a template image into a copy-on-write qcow2 overlay at `dest`.
///
/// Goes through `qemu-img create -b`: only metadata is written up front,
/// data is copied from the base as the guest writes. The base image must
/// not be modified while overlays reference it.
pub async fn clone_image(base: &Path, dest: &Path) -> Result<DiskImage, ProvisionError> {
    if !base.exists() {
        return Err(ProvisionError::Io {
            context: format!("base image not found: {}", base.display()),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        });
    }
    if dest.exists() {
        return Err(ProvisionError::PathExists {
            path: dest.display().to_string(),
        });
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ProvisionError::Io {
                context: format!("creating directory {}", parent.display()),
                source: e,
            })?;
    }

    let base_format = ImageFormat::from_path(base);
    let output = tokio::process::Command::new("qemu-img")
        .args(["create", "-f", "qcow2", "-b"])
        .arg(base)
        .args(["-F", base_format.as_str()])
        .arg(dest)
        .output()
        .await
        .map_err(|e| ProvisionError::Io {
            context: "running qemu-img".into(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(ProvisionError::ExternalCommand {
            command: "qemu-img".into(),
            message: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    tracing::info!(base = %base.display(), dest = %dest.display(), "cloned image");
    DiskImage::existing(dest)
}
