//! Minimal QCOW2 writer for empty virtual disks.
//!
//! QCOW2 (QEMU Copy-On-Write version 2) is the native disk image format
//! for QEMU/KVM guests.  A freshly created image only needs the metadata
//! structures, so we generate valid QCOW2 v2 images directly instead of
//! shelling out to `qemu-img create` (cloning with a backing file is the
//! one case that still goes through `qemu-img`, see `image::clone_image`).
//!
//! An empty image is exactly 4 clusters (64 KB each):
//!
//! ```text
//! ┌───────────┬──────────────────────────────────────────────────┐
//! │  Cluster  │ Contents                                         │
//! ├───────────┼──────────────────────────────────────────────────┤
//! │     0     │ Header (72 bytes) + padding                      │
//! │     1     │ L1 table (all zeros — no data allocated)         │
//! │     2     │ Refcount table (one entry → cluster 3)           │
//! │     3     │ Refcount block (marks clusters 0–3 as used)      │
//! └───────────┴──────────────────────────────────────────────────┘
//! ```
//!
//! Reference: <https://github.com/qemu/qemu/blob/master/docs/interop/qcow2.txt>

use std::io::{Read, Write};
use std::path::Path;

use crate::error::ProvisionError;

/// Cluster size: 64 KB (2^16 bytes), the default used by `qemu-img create`.
const CLUSTER_BITS: u32 = 16;
const CLUSTER_SIZE: usize = 1 << CLUSTER_BITS; // 65536

/// QCOW2 magic number: the ASCII bytes `QFI` followed by `0xFB`.
const QCOW2_MAGIC: u32 = 0x514649FB;

/// Version 2 is the most widely compatible and sufficient for empty images.
const QCOW2_VERSION: u32 = 2;

/// Create an empty QCOW2 disk image at `path` with the given virtual size.
///
/// The resulting file is sparse metadata only: a "100G" image occupies
/// ~256 KB on disk.
pub fn create_qcow2(path: &Path, virtual_size: u64) -> Result<(), ProvisionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ProvisionError::Io {
            context: format!("creating directory {}", parent.display()),
            source: e,
        })?;
    }

    let image = build_qcow2(virtual_size);

    let mut file = std::fs::File::create(path).map_err(|e| ProvisionError::Io {
        context: format!("creating qcow2 image {}", path.display()),
        source: e,
    })?;
    file.write_all(&image).map_err(|e| ProvisionError::Io {
        context: format!("writing qcow2 image {}", path.display()),
        source: e,
    })?;

    tracing::info!(path = %path.display(), virtual_size, "created qcow2 image");
    Ok(())
}

/// Read the virtual size from a QCOW2 header, or `None` if the file is
/// not QCOW2 (wrong magic, too short, unreadable).
///
/// Only the first 32 bytes are read; populated guest disks can be tens
/// of gigabytes.
pub fn read_virtual_size(path: &Path) -> Option<u64> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut header = [0u8; 32];
    file.read_exact(&mut header).ok()?;
    let magic = u32::from_be_bytes(header[0..4].try_into().ok()?);
    if magic != QCOW2_MAGIC {
        return None;
    }
    Some(u64::from_be_bytes(header[24..32].try_into().ok()?))
}

/// Build a complete QCOW2 v2 image as a byte vector.
fn build_qcow2(virtual_size: u64) -> Vec<u8> {
    let mut image = vec![0u8; CLUSTER_SIZE * 4];

    // ── Cluster 0: Header ───────────────────────────────────────────
    //
    // 72 bytes for version 2, all multi-byte fields big-endian:
    //
    //   Offset  Size  Field
    //   ──────  ────  ─────
    //     0       4   Magic number (0x514649FB)
    //     4       4   Version (2)
    //     8       8   Backing file offset (0 = none)
    //    16       4   Backing file name length (0)
    //    20       4   Cluster bits (16 → 64 KB clusters)
    //    24       8   Virtual size in bytes
    //    32       4   Encryption method (0 = none)
    //    36       4   L1 table entry count
    //    40       8   L1 table offset (cluster 1)
    //    48       8   Refcount table offset (cluster 2)
    //    56       4   Refcount table clusters (1)
    //    60       4   Number of snapshots (0)
    //    64       8   Snapshots offset (0)

    let l1_entries = l1_table_entries(virtual_size);
    let l1_offset: u64 = CLUSTER_SIZE as u64; // cluster 1
    let refcount_table_offset: u64 = (CLUSTER_SIZE * 2) as u64; // cluster 2

    write_be32(&mut image, 0, QCOW2_MAGIC);
    write_be32(&mut image, 4, QCOW2_VERSION);
    // bytes 8..20: no backing file (already zero)
    write_be32(&mut image, 20, CLUSTER_BITS);
    write_be64(&mut image, 24, virtual_size);
    // bytes 32..36: crypt method = 0 (already zero)
    write_be32(&mut image, 36, l1_entries);
    write_be64(&mut image, 40, l1_offset);
    write_be64(&mut image, 48, refcount_table_offset);
    write_be32(&mut image, 56, 1); // refcount table clusters
    // bytes 60..72: snapshots = 0 (already zero)

    // ── Cluster 1: L1 table ─────────────────────────────────────────
    //
    // All entries zero ("not yet allocated") for an empty disk, so the
    // cluster stays all-zeros.

    // ── Cluster 2: Refcount table ───────────────────────────────────
    //
    // One 8-byte entry pointing to the refcount block in cluster 3.

    let refcount_block_offset: u64 = (CLUSTER_SIZE * 3) as u64;
    let rt_start = CLUSTER_SIZE * 2;
    write_be64(&mut image, rt_start, refcount_block_offset);

    // ── Cluster 3: Refcount block ───────────────────────────────────
    //
    // 16-bit reference counts, one per cluster.  Clusters 0–3 hold the
    // metadata above, so they get refcount = 1.

    let rb_start = CLUSTER_SIZE * 3;
    for i in 0..4u16 {
        write_be16(&mut image, rb_start + (i as usize) * 2, 1);
    }

    image
}

/// Number of L1 table entries for a given virtual size.
///
/// With 64 KB clusters an L2 table has 8192 entries, so one L1 entry
/// covers 8192 × 64 KB = 512 MB.
fn l1_table_entries(virtual_size: u64) -> u32 {
    let l2_entries = CLUSTER_SIZE as u64 / 8;
    let bytes_per_l1 = l2_entries * CLUSTER_SIZE as u64;
    virtual_size.div_ceil(bytes_per_l1) as u32
}

// QCOW2 is big-endian regardless of host architecture.

fn write_be16(buf: &mut [u8], offset: usize, val: u16) {
    buf[offset..offset + 2].copy_from_slice(&val.to_be_bytes());
}

fn write_be32(buf: &mut [u8], offset: usize, val: u32) {
    buf[offset..offset + 4].copy_from_slice(&val.to_be_bytes());
}

fn write_be64(buf: &mut [u8], offset: usize, val: u64) {
    buf[offset..offset + 8].copy_from_slice(&val.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qcow2_has_magic() {
        let image = build_qcow2(1024 * 1024 * 1024);
        assert_eq!(&image[0..4], &[0x51, 0x46, 0x49, 0xFB]);
    }

    #[test]
    fn qcow2_has_correct_virtual_size() {
        let size: u64 = 100 * 1024 * 1024 * 1024;
        let image = build_qcow2(size);
        let stored = u64::from_be_bytes(image[24..32].try_into().unwrap());
        assert_eq!(stored, size);
    }

    #[test]
    fn qcow2_is_four_clusters() {
        let image = build_qcow2(1024 * 1024 * 1024);
        assert_eq!(image.len(), CLUSTER_SIZE * 4);
    }

    #[test]
    fn l1_entries_small_disk() {
        // 1 GB needs ceil(1 GB / 512 MB) = 2 L1 entries
        assert_eq!(l1_table_entries(1024 * 1024 * 1024), 2);
    }

    #[test]
    fn l1_entries_large_disk() {
        // 100 GB needs ceil(100 GB / 512 MB) = 200 L1 entries
        assert_eq!(l1_table_entries(100 * 1024 * 1024 * 1024), 200);
    }

    #[test]
    fn create_then_read_virtual_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.qcow2");
        create_qcow2(&path, 20 * 1024 * 1024 * 1024).unwrap();
        assert_eq!(read_virtual_size(&path), Some(20 * 1024 * 1024 * 1024));
    }

    #[test]
    fn read_virtual_size_rejects_non_qcow2() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.raw");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        assert_eq!(read_virtual_size(&path), None);
    }

    #[test]
    fn read_virtual_size_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stub.qcow2");
        std::fs::write(&path, &[0x51, 0x46, 0x49, 0xFB, 0, 0]).unwrap();
        assert_eq!(read_virtual_size(&path), None);
    }

    #[test]
    fn read_virtual_size_only_needs_the_header() {
        // A populated image has data well past the header; the size must
        // come out of the first 32 bytes alone.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("populated.qcow2");
        create_qcow2(&path, 4 * 1024 * 1024 * 1024).unwrap();
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        file.write_all(&vec![0xAB; 2 * CLUSTER_SIZE]).unwrap();
        assert_eq!(read_virtual_size(&path), Some(4 * 1024 * 1024 * 1024));
    }
}
