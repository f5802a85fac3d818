use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use indicatif::ProgressBar;
use tracing_subscriber::EnvFilter;

use provision::backend::libvirt::LibvirtBackend;
use provision::backend::{BackendClient, DomainHandle, DomainState};
use provision::cli::{Cli, Command, OutputFormat};
use provision::config;
use provision::engine::ProvisionEngine;
use provision::error::ProvisionError;
use provision::spec::{DisplayMode, GuestSpecBuilder};
use provision::{image, util};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("provision=debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("provision=info".parse().expect("valid log directive"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<(), ProvisionError> {
    let config = config::load_config(cli.config.as_deref())?;
    let uri = cli
        .connect
        .clone()
        .unwrap_or_else(|| config.libvirt_uri.clone());
    let output = cli.output;

    match cli.command {
        Command::CreateImage { path, format, size } => {
            let capacity = util::parse_size(&size)?;
            let img = image::create_image(&path, format.into(), capacity)?;
            println!(
                "Created {} image {} ({})",
                img.format,
                img.path.display(),
                util::format_size(img.capacity_bytes)
            );
            Ok(())
        }

        Command::Install {
            name,
            ram,
            vcpus,
            disk,
            cdrom,
            os_variant,
            network,
            graphics,
        } => {
            // Spec validation happens before the backend is contacted, so
            // an incomplete invocation never depends on libvirtd being up.
            let spec = GuestSpecBuilder::new()
                .name(name)
                .memory_mb(ram)
                .vcpus(vcpus)
                .disk(disk)
                .install_media(cdrom)
                .os_variant(os_variant)
                .network(network)
                .display(graphics.into())
                .build()?;
            let engine = connect_engine(&uri)?;
            let display = spec.display;
            let handle = engine.provision(spec).await?;
            report_provisioned(&engine, &handle, display).await
        }

        Command::Import {
            name,
            ram,
            vcpus,
            disk,
            os_variant,
            network,
            graphics,
        } => {
            let spec = GuestSpecBuilder::new()
                .name(name)
                .memory_mb(ram)
                .vcpus(vcpus)
                .disk(disk)
                .import_existing()
                .os_variant(os_variant)
                .network(network)
                .display(graphics.into())
                .build()?;
            let engine = connect_engine(&uri)?;
            let display = spec.display;
            let handle = engine.provision(spec).await?;
            report_provisioned(&engine, &handle, display).await
        }

        Command::Clone {
            name,
            base,
            ram,
            vcpus,
            os_variant,
            network,
            graphics,
        } => {
            let base = match base.or_else(|| config.base_image.clone().map(PathBuf::from)) {
                Some(b) => b,
                None => {
                    return Err(ProvisionError::Validation {
                        message: "no template image: pass --base or set base_image in the config"
                            .into(),
                    });
                }
            };
            // Connect before writing anything so an unreachable backend
            // never leaves an overlay behind.
            let engine = connect_engine(&uri)?;
            let dest = Path::new(&config.storage_pool).join(format!("{name}.qcow2"));
            let img = image::clone_image(&base, &dest).await?;

            let builder = GuestSpecBuilder::new()
                .name(name.clone())
                .memory_mb(ram)
                .vcpus(vcpus)
                .disk(&img.path)
                .import_existing()
                .os_variant(os_variant)
                .network(network)
                .display(graphics.into());
            let (handle, display) = engine.provision_cloned(&dest, builder).await?;
            report_provisioned(&engine, &handle, display).await
        }

        Command::List => {
            let engine = connect_engine(&uri)?;
            let domains = engine.backend().list_domains().await?;
            if output == OutputFormat::Json {
                println!(
                    "{}",
                    facet_json::to_string(&domains).expect("JSON serialization")
                );
            } else if domains.is_empty() {
                println!("No domains defined.");
            } else {
                println!("{:<24} {:<14} {:>10} {:>6}", "NAME", "STATE", "MEMORY", "VCPUS");
                for d in &domains {
                    println!(
                        "{:<24} {:<14} {:>10} {:>6}",
                        d.name,
                        d.state,
                        format!("{} MB", d.memory_mb),
                        d.vcpus
                    );
                }
            }
            Ok(())
        }

        Command::Status { name } => {
            let engine = connect_engine(&uri)?;
            let backend = engine.backend();
            let state = backend.domain_state(&name).await?;
            let vnc_port = backend.vnc_port(&name).await?;
            let disk = backend.domain_disk_path(&name).await?;

            if output == OutputFormat::Json {
                println!(
                    "{}",
                    facet_json::to_string(&StatusJson {
                        name: name.clone(),
                        state: state.to_string(),
                        vnc_port,
                        disk: disk.map(|p| p.display().to_string()),
                    })
                    .expect("JSON serialization")
                );
            } else {
                println!("Domain '{name}': {state}");
                if let Some(port) = vnc_port {
                    println!("  VNC: 127.0.0.1:{port}");
                }
                if let Some(disk) = disk {
                    println!("  Disk: {}", disk.display());
                }
            }
            Ok(())
        }

        Command::Start { name } => {
            let engine = connect_engine(&uri)?;
            let backend = engine.backend();
            let handle = backend.lookup_domain(&name).await?;
            if backend.domain_state(&name).await? == DomainState::Running {
                println!("Domain '{name}' is already running.");
                return Ok(());
            }
            backend.start_domain(&handle).await?;
            println!("Domain '{name}' started.");
            Ok(())
        }

        Command::Stop { name, force } => {
            let engine = connect_engine(&uri)?;
            stop_domain(engine.backend(), &name, force).await
        }

        Command::Delete { name, keep_disk } => {
            let engine = connect_engine(&uri)?;
            let backend = engine.backend();
            backend.lookup_domain(&name).await?;

            // Read the disk path before undefining; it is gone afterwards.
            let disk = backend.domain_disk_path(&name).await?;

            if backend.domain_state(&name).await? == DomainState::Running {
                backend.destroy_domain(&name).await?;
            }
            backend.undefine_domain(&name).await?;

            if !keep_disk {
                if let Some(disk) = disk {
                    if disk.exists() {
                        tokio::fs::remove_file(&disk)
                            .await
                            .map_err(|e| ProvisionError::Io {
                                context: format!("removing disk image {}", disk.display()),
                                source: e,
                            })?;
                        println!("Removed disk image {}.", disk.display());
                    }
                }
            }
            println!("Domain '{name}' deleted.");
            Ok(())
        }
    }
}

fn connect_engine(uri: &str) -> Result<ProvisionEngine<LibvirtBackend>, ProvisionError> {
    Ok(ProvisionEngine::new(LibvirtBackend::connect(uri)?))
}

async fn report_provisioned<B: BackendClient>(
    engine: &ProvisionEngine<B>,
    handle: &DomainHandle,
    display: DisplayMode,
) -> Result<(), ProvisionError> {
    println!(
        "Domain '{}' defined and started (uuid {}).",
        handle.name, handle.uuid
    );
    if display == DisplayMode::Vnc {
        match engine.backend().vnc_port(&handle.name).await? {
            Some(port) => println!("  VNC: 127.0.0.1:{port}"),
            None => println!("  VNC: port not yet allocated"),
        }
    }
    Ok(())
}

/// ACPI shutdown with a 30 s grace period, then force off. `--force`
/// skips straight to the hard stop.
async fn stop_domain<B: BackendClient>(
    backend: &B,
    name: &str,
    force: bool,
) -> Result<(), ProvisionError> {
    backend.lookup_domain(name).await?;
    if backend.domain_state(name).await? != DomainState::Running {
        println!("Domain '{name}' is not running.");
        return Ok(());
    }

    if force {
        backend.destroy_domain(name).await?;
        println!("Domain '{name}' force stopped.");
        return Ok(());
    }

    backend.shutdown_domain(name).await?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Waiting for domain '{name}' to shut down..."));
    spinner.enable_steady_tick(Duration::from_millis(120));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        if backend.domain_state(name).await? != DomainState::Running {
            spinner.finish_with_message(format!("Domain '{name}' stopped."));
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            spinner.finish_and_clear();
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        spinner.tick();
    }

    tracing::warn!(name, "ACPI shutdown timed out, force stopping");
    backend.destroy_domain(name).await?;
    println!("Domain '{name}' force stopped.");
    Ok(())
}

// ── JSON output structs ─────────────────────────────────────────────

#[derive(facet::Facet)]
struct StatusJson {
    name: String,
    state: String,
    vnc_port: Option<u16>,
    disk: Option<String>,
}
