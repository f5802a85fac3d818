use std::path::PathBuf;

use crate::spec::{DisplayMode, GuestSpec, SourceMode};

/// Generate libvirt domain XML from a validated guest spec.
pub fn generate_domain_xml(spec: &GuestSpec) -> String {
    let name = &spec.name;
    let memory_mb = spec.memory_mb;
    let vcpus = spec.vcpus;
    let disk = spec.disk.path.display();
    let disk_format = spec.disk.format.as_str();
    let network = spec.network.name();

    let description = match &spec.os_variant {
        Some(v) => format!("\n  <description>os-variant={v}</description>"),
        None => String::new(),
    };

    // Installer media boots first so a fresh disk falls through to it.
    let boot = match &spec.source {
        SourceMode::InstallMedia { .. } => "<boot dev='cdrom'/>\n    <boot dev='hd'/>",
        SourceMode::ImportExisting => "<boot dev='hd'/>",
    };

    let cdrom = match &spec.source {
        SourceMode::InstallMedia { iso } => format!(
            r#"
    <disk type='file' device='cdrom'>
      <driver name='qemu' type='raw'/>
      <source file='{}'/>
      <target dev='sda' bus='sata'/>
      <readonly/>
    </disk>"#,
            iso.display()
        ),
        SourceMode::ImportExisting => String::new(),
    };

    let graphics = match spec.display {
        DisplayMode::Vnc => {
            "\n    <graphics type='vnc' port='-1' autoport='yes' listen='127.0.0.1'/>\n    <video>\n      <model type='qxl'/>\n    </video>"
        }
        DisplayMode::None => "",
    };

    format!(
        r#"<domain type='kvm'>
  <name>{name}</name>{description}
  <memory unit='MiB'>{memory_mb}</memory>
  <currentMemory unit='MiB'>{memory_mb}</currentMemory>
  <vcpu placement='static'>{vcpus}</vcpu>
  <os>
    <type arch='x86_64' machine='q35'>hvm</type>
    {boot}
  </os>
  <features>
    <acpi/>
    <apic/>
  </features>
  <cpu mode='host-passthrough' check='none'/>
  <on_poweroff>destroy</on_poweroff>
  <on_reboot>restart</on_reboot>
  <on_crash>destroy</on_crash>
  <devices>
    <disk type='file' device='disk'>
      <driver name='qemu' type='{disk_format}'/>
      <source file='{disk}'/>
      <target dev='vda' bus='virtio'/>
    </disk>{cdrom}
    <interface type='network'>
      <source network='{network}'/>
      <model type='virtio'/>
    </interface>
    <serial type='pty'>
      <target port='0'/>
    </serial>
    <console type='pty'>
      <target type='serial' port='0'/>
    </console>{graphics}
  </devices>
</domain>
"#
    )
}

/// Extract the allocated VNC port from a domain's live XML description.
/// Returns `None` when there is no VNC graphics device or the port has
/// not been allocated yet (libvirt reports -1 until the domain runs).
pub fn vnc_port_from_xml(xml: &str) -> Option<u16> {
    let mut rest = xml;
    while let Some(start) = rest.find("<graphics") {
        let tag_end = rest[start..].find('>')? + start;
        let tag = &rest[start..tag_end];
        if attr_value(tag, "type") == Some("vnc") {
            let port: i32 = attr_value(tag, "port")?.parse().ok()?;
            return if port > 0 {
                u16::try_from(port).ok()
            } else {
                None
            };
        }
        rest = &rest[tag_end..];
    }
    None
}

/// Extract the primary disk's source file from a domain XML description.
pub fn disk_source_from_xml(xml: &str) -> Option<PathBuf> {
    let mut rest = xml;
    while let Some(start) = rest.find("<disk") {
        let block_end = rest[start..].find("</disk>")? + start;
        let block = &rest[start..block_end];
        let open_tag_end = block.find('>')?;
        if attr_value(&block[..open_tag_end], "device") == Some("disk") {
            let src_start = block.find("<source")?;
            let src_end = block[src_start..].find('>')? + src_start;
            return attr_value(&block[src_start..src_end], "file").map(PathBuf::from);
        }
        rest = &rest[block_end..];
    }
    None
}

/// Pull an attribute value out of a single XML tag. Handles both quote
/// styles since libvirt normalizes to single quotes but user-supplied
/// XML may not be.
fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let pat = format!(" {name}=");
    let i = tag.find(&pat)? + pat.len();
    let mut chars = tag[i..].chars();
    let quote = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let rest = &tag[i + 1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}
