use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn provision() -> assert_cmd::Command {
    cargo_bin_cmd!("provision").into()
}

#[test]
fn help_works() {
    provision()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Provision libvirt/QEMU guests"));
}

#[test]
fn create_image_writes_qcow2() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.qcow2");

    provision()
        .args([
            "create-image",
            "--path",
            path.to_str().unwrap(),
            "--format",
            "qcow2",
            "--size",
            "1G",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created qcow2 image"));

    let data = std::fs::read(&path).unwrap();
    assert_eq!(&data[0..4], &[0x51, 0x46, 0x49, 0xFB]);
    let stored = u64::from_be_bytes(data[24..32].try_into().unwrap());
    assert_eq!(stored, 1024 * 1024 * 1024);
}

#[test]
fn create_image_twice_fails_with_path_exists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.qcow2");
    let args = [
        "create-image",
        "--path",
        path.to_str().unwrap(),
        "--size",
        "100G",
    ];

    provision().args(args).assert().success();
    provision()
        .args(args)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn create_image_zero_size_is_invalid_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.qcow2");

    provision()
        .args([
            "create-image",
            "--path",
            path.to_str().unwrap(),
            "--size",
            "0",
        ])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("capacity"));
    assert!(!path.exists());
}

#[test]
fn create_image_bad_suffix_is_invalid_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.qcow2");

    provision()
        .args([
            "create-image",
            "--path",
            path.to_str().unwrap(),
            "--size",
            "10X",
        ])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("invalid image capacity"));
}

#[test]
fn create_image_raw_has_full_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.raw");

    provision()
        .args([
            "create-image",
            "--path",
            path.to_str().unwrap(),
            "--format",
            "raw",
            "--size",
            "16M",
        ])
        .assert()
        .success();

    let meta = std::fs::metadata(&path).unwrap();
    assert_eq!(meta.len(), 16 * 1024 * 1024);
}

#[test]
fn install_without_cdrom_is_invalid_spec() {
    let dir = tempfile::tempdir().unwrap();
    let disk = dir.path().join("vm.qcow2");
    provision()
        .args([
            "create-image",
            "--path",
            disk.to_str().unwrap(),
            "--size",
            "10G",
        ])
        .assert()
        .success();

    provision()
        .args([
            "install",
            "--name",
            "test-vm",
            "--disk",
            disk.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .code(4)
        .stderr(
            predicate::str::contains("invalid guest spec")
                .and(predicate::str::contains("ISO")),
        );
}

#[test]
fn install_with_zero_ram_is_invalid_spec() {
    let dir = tempfile::tempdir().unwrap();
    let disk = dir.path().join("vm.qcow2");
    let iso = dir.path().join("installer.iso");
    provision()
        .args([
            "create-image",
            "--path",
            disk.to_str().unwrap(),
            "--size",
            "10G",
        ])
        .assert()
        .success();
    std::fs::write(&iso, b"iso").unwrap();

    provision()
        .args([
            "install",
            "--name",
            "test-vm",
            "--ram",
            "0",
            "--disk",
            disk.to_str().unwrap(),
            "--cdrom",
            iso.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("memory_mb"));
}

#[test]
fn import_with_missing_disk_is_invalid_spec() {
    provision()
        .args([
            "import",
            "--name",
            "test-vm",
            "--disk",
            "/nonexistent/vm.qcow2",
        ])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("disk image not found"));
}

#[test]
fn missing_explicit_config_shows_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.qcow2");

    provision()
        .args([
            "--config",
            "/nonexistent/provision.toml",
            "create-image",
            "--path",
            path.to_str().unwrap(),
            "--size",
            "1G",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn config_file_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("provision.toml");
    std::fs::write(
        &config_path,
        r#"
libvirt_uri = "qemu:///session"
storage_pool = "/tmp/provision-images"
"#,
    )
    .unwrap();

    let image_path = dir.path().join("a.qcow2");
    provision()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "create-image",
            "--path",
            image_path.to_str().unwrap(),
            "--size",
            "1G",
        ])
        .assert()
        .success();
}
