//! CLI argument parsing using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::partition::PartitionKind;
use crate::store::{DirectoryContext, Technology};
use crate::topology::Transport;

/// dirpart - directory partitions and replication topology
#[derive(Parser, Debug)]
#[command(name = "dirpart")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./dirpart.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a new directory snapshot at the configured path
    Init {
        #[arg(long, value_enum, default_value_t = TechnologyArg::Primary)]
        technology: TechnologyArg,

        /// Root naming context, e.g. DC=corp,DC=com
        #[arg(long)]
        root: String,

        /// `host[:port]@site[#version]`; the first server owns the naming role
        #[arg(long = "server", required = true)]
        servers: Vec<String>,

        /// Refuse automatic cross-reference creation on head commit
        #[arg(long)]
        manual_cross_ref: bool,
    },

    /// Directory partitions
    #[command(subcommand)]
    Partition(PartitionCommand),

    /// Site links
    #[command(subcommand)]
    Link(LinkCommand),
}

#[derive(Subcommand, Debug)]
pub enum PartitionCommand {
    /// Create and commit a partition
    Create {
        #[command(flatten)]
        target: TargetArgs,

        /// Partition DN, e.g. DC=apps,DC=corp,DC=com
        dn: String,

        /// Defaults to the technology of the target server
        #[arg(long, value_enum, conflicts_with = "class")]
        kind: Option<TechnologyArg>,

        /// Explicit head object class (secondary technology only)
        #[arg(long)]
        class: Option<String>,

        #[arg(long)]
        security_reference_domain: Option<String>,

        /// Extra replica server, by name
        #[arg(long = "replica")]
        replicas: Vec<String>,
    },

    /// Look up a committed partition
    Find {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, required_unless_present = "dns_name", conflicts_with = "dns_name")]
        dn: Option<String>,

        #[arg(long)]
        dns_name: Option<String>,
    },

    /// Delete a committed partition's cross-reference
    Delete {
        #[command(flatten)]
        target: TargetArgs,

        dn: String,
    },

    /// Servers hosting a partition
    Servers {
        #[command(flatten)]
        target: TargetArgs,

        dn: String,

        #[arg(long)]
        site: Option<String>,

        #[arg(long, value_enum, default_value_t = ServerSource::Locator)]
        source: ServerSource,

        /// Bypass the locator cache
        #[arg(long)]
        force: bool,
    },

    /// Change a partition's replica set and save it
    Replicas {
        #[command(flatten)]
        target: TargetArgs,

        dn: String,

        #[arg(long = "add")]
        add: Vec<String>,

        #[arg(long = "remove")]
        remove: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum LinkCommand {
    /// Create a site link
    Create {
        #[command(flatten)]
        link: LinkArgs,

        /// Member site, by name
        #[arg(long = "site")]
        sites: Vec<String>,
    },

    /// Show a site link
    Show {
        #[command(flatten)]
        link: LinkArgs,
    },

    /// Change a site link
    Set {
        #[command(flatten)]
        link: LinkArgs,

        #[command(flatten)]
        changes: LinkChanges,
    },

    /// Delete a site link
    Delete {
        #[command(flatten)]
        link: LinkArgs,
    },
}

/// Context the command binds with
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Server, forest or configuration set name
    #[arg(long)]
    pub target: String,

    #[arg(long, value_enum, default_value_t = TargetKind::Server)]
    pub target_kind: TargetKind,
}

impl TargetArgs {
    pub fn context(&self) -> DirectoryContext {
        match self.target_kind {
            TargetKind::Server => DirectoryContext::server(self.target.as_str()),
            TargetKind::Forest => DirectoryContext::forest(self.target.as_str()),
            TargetKind::ConfigurationSet => DirectoryContext::configuration_set(self.target.as_str()),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Link name
    pub name: String,

    /// `ip` or `smtp`
    #[arg(long, default_value = "ip")]
    pub transport: Transport,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LinkChanges {
    #[arg(long)]
    pub cost: Option<i32>,

    /// Replication interval in minutes
    #[arg(long)]
    pub interval: Option<i64>,

    #[arg(long)]
    pub notification: Option<bool>,

    #[arg(long)]
    pub reciprocal: Option<bool>,

    #[arg(long)]
    pub compression: Option<bool>,

    #[arg(long = "add-site")]
    pub add_sites: Vec<String>,

    #[arg(long = "remove-site")]
    pub remove_sites: Vec<String>,

    /// Availability window `<day|daily> HH:MM-HH:MM`; replaces the schedule
    #[arg(long = "window", conflicts_with = "clear_schedule")]
    pub windows: Vec<String>,

    /// Remove the schedule (always available)
    #[arg(long)]
    pub clear_schedule: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Server,
    Forest,
    ConfigurationSet,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechnologyArg {
    Primary,
    Secondary,
}

impl From<TechnologyArg> for Technology {
    fn from(arg: TechnologyArg) -> Self {
        match arg {
            TechnologyArg::Primary => Technology::Primary,
            TechnologyArg::Secondary => Technology::Secondary,
        }
    }
}

impl From<TechnologyArg> for PartitionKind {
    fn from(arg: TechnologyArg) -> Self {
        PartitionKind::from(Technology::from(arg))
    }
}

/// Where `partition servers` looks
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSource {
    /// Locator for primary partitions, registry for secondary ones
    Locator,
    /// Every server recorded as hosting the partition
    Registry,
    /// Locator enumeration only
    Discoverable,
    /// A single server
    One,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
