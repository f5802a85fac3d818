use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::image::ImageFormat;
use crate::spec::DisplayMode;

#[derive(Parser, Debug)]
#[command(name = "provision", about = "Provision libvirt/QEMU guests from the command line")]
pub struct Cli {
    /// Libvirt connection URI (overrides config)
    #[arg(short = 'c', long, value_name = "URI")]
    pub connect: Option<String>,

    /// Path to config file (default: provision.toml if present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output format for list/status
    #[arg(long, value_enum, default_value = "plain")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FormatArg {
    Qcow2,
    Raw,
}

impl From<FormatArg> for ImageFormat {
    fn from(f: FormatArg) -> ImageFormat {
        match f {
            FormatArg::Qcow2 => ImageFormat::Qcow2,
            FormatArg::Raw => ImageFormat::Raw,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum GraphicsArg {
    Vnc,
    None,
}

impl From<GraphicsArg> for DisplayMode {
    fn from(g: GraphicsArg) -> DisplayMode {
        match g {
            GraphicsArg::Vnc => DisplayMode::Vnc,
            GraphicsArg::None => DisplayMode::None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty virtual disk image
    CreateImage {
        /// Where to create the image
        #[arg(long)]
        path: PathBuf,

        /// Image format
        #[arg(long, value_enum, default_value = "qcow2")]
        format: FormatArg,

        /// Virtual capacity, e.g. 100G or 512M
        #[arg(long)]
        size: String,
    },

    /// Define and start a guest that boots an installer ISO
    Install {
        /// Guest name (must be unique among domains)
        #[arg(long)]
        name: String,

        /// Memory in MiB
        #[arg(long, default_value_t = 2048)]
        ram: u64,

        /// Number of virtual CPUs
        #[arg(long, default_value_t = 2)]
        vcpus: u32,

        /// Path to the guest's disk image
        #[arg(long)]
        disk: PathBuf,

        /// Path to the installer ISO
        #[arg(long)]
        cdrom: Option<PathBuf>,

        /// OS variant hint, recorded in the domain description
        #[arg(long)]
        os_variant: Option<String>,

        /// Virtual network to attach (must already exist)
        #[arg(long, default_value = "default")]
        network: String,

        /// Display wiring
        #[arg(long, value_enum, default_value = "vnc")]
        graphics: GraphicsArg,
    },

    /// Define and start a guest from a disk that already boots
    Import {
        /// Guest name (must be unique among domains)
        #[arg(long)]
        name: String,

        /// Memory in MiB
        #[arg(long, default_value_t = 2048)]
        ram: u64,

        /// Number of virtual CPUs
        #[arg(long, default_value_t = 2)]
        vcpus: u32,

        /// Path to the bootable disk image
        #[arg(long)]
        disk: PathBuf,

        /// OS variant hint, recorded in the domain description
        #[arg(long)]
        os_variant: Option<String>,

        /// Virtual network to attach (must already exist)
        #[arg(long, default_value = "default")]
        network: String,

        /// Display wiring
        #[arg(long, value_enum, default_value = "vnc")]
        graphics: GraphicsArg,
    },

    /// Clone a template image copy-on-write and start a guest from it
    Clone {
        /// Guest name (must be unique among domains)
        #[arg(long)]
        name: String,

        /// Template image to clone (default: base_image from config)
        #[arg(long)]
        base: Option<PathBuf>,

        /// Memory in MiB
        #[arg(long, default_value_t = 2048)]
        ram: u64,

        /// Number of virtual CPUs
        #[arg(long, default_value_t = 2)]
        vcpus: u32,

        /// OS variant hint, recorded in the domain description
        #[arg(long)]
        os_variant: Option<String>,

        /// Virtual network to attach (must already exist)
        #[arg(long, default_value = "default")]
        network: String,

        /// Display wiring
        #[arg(long, value_enum, default_value = "vnc")]
        graphics: GraphicsArg,
    },

    /// List all domains known to the backend
    List,

    /// Show a domain's state, VNC port, and disk
    Status {
        #[arg(long)]
        name: String,
    },

    /// Start a defined domain
    Start {
        #[arg(long)]
        name: String,
    },

    /// Shut a domain down (ACPI, then force after a grace period)
    Stop {
        #[arg(long)]
        name: String,

        /// Skip ACPI shutdown and force off immediately
        #[arg(long)]
        force: bool,
    },

    /// Undefine a domain and remove its disk image
    Delete {
        #[arg(long)]
        name: String,

        /// Keep the disk image on disk
        #[arg(long)]
        keep_disk: bool,
    },
}
