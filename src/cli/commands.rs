//! CLI command implementations
//!
//! Each command:
//! 1. Loads and validates the configuration
//! 2. Loads the directory snapshot into an `InMemoryDirectory`
//! 3. Runs one partition or link operation
//! 4. Saves the snapshot, whether or not the operation succeeded
//! 5. Writes exactly one JSON response to stdout
//!
//! The snapshot is saved after failures too: a partially applied commit
//! leaves the same traces a real directory would.

use std::path::Path;

use chrono::{Duration, Weekday};
use serde_json::{json, Value};

use crate::config::Config;
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::partition::{Partition, PartitionKind, PartitionManager};
use crate::replica::{ReplicaServer, ServerVersion};
use crate::store::{DirectorySnapshot, DistinguishedName, InMemoryDirectory, RootInfo, ServerSpec, Technology};
use crate::topology::{QuarterHour, Schedule, SiteRef, TopologyLink};

use super::args::{Command, LinkArgs, LinkChanges, LinkCommand, PartitionCommand, ServerSource, TargetArgs};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Version recorded for primary servers given without `#version`
const DEFAULT_PRIMARY_VERSION: &str = "6.3";
/// Port for secondary instances given without `:port`
const DEFAULT_SECONDARY_PORT: u16 = 389;

/// Main CLI entry point
///
/// Parses arguments, runs the command and writes its response.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    match run_command(&cli.config, cli.command) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Run one command and return its response payload
pub fn run_command(config_path: &Path, cmd: Command) -> CliResult<Value> {
    let config = Config::load(config_path)?;
    Logger::set_min_severity(config.severity()?);
    log_event_with_fields(Event::ConfigLoaded, &[("path", &config_path.display().to_string())]);

    match cmd {
        Command::Init {
            technology,
            root,
            servers,
            manual_cross_ref,
        } => init(&config, technology.into(), &root, &servers, manual_cross_ref),
        Command::Partition(command) => with_directory(&config, |dir| partition(dir, &config, command)),
        Command::Link(command) => with_directory(&config, |dir| link(dir, &config, command)),
    }
}

// ==================
// Snapshot handling
// ==================

/// Write a fresh snapshot. Refuses to overwrite an existing one.
pub fn init(
    config: &Config,
    technology: Technology,
    root: &str,
    servers: &[String],
    manual_cross_ref: bool,
) -> CliResult<Value> {
    let path = config.snapshot_path.as_path();
    if path.exists() {
        return Err(CliError::snapshot_exists(path));
    }
    DistinguishedName::parse(root)?;
    if servers.is_empty() {
        return Err(CliError::invalid_input("at least one --server is required"));
    }

    let mut snapshot = DirectorySnapshot::new(technology, root);
    for text in servers {
        snapshot = snapshot.with_server(parse_server_spec(text, technology)?);
    }
    let snapshot = snapshot.with_manual_cross_ref(manual_cross_ref);

    snapshot.save(path)?;
    log_event_with_fields(Event::SnapshotSaved, &[("path", &path.display().to_string())]);

    Ok(json!({
        "snapshot": path.display().to_string(),
        "technology": technology.as_str(),
        "root": root,
        "servers": snapshot.server_names(),
    }))
}

fn with_directory<F>(config: &Config, operation: F) -> CliResult<Value>
where
    F: FnOnce(&InMemoryDirectory) -> CliResult<Value>,
{
    let path = config.snapshot_path.as_path();
    let path_text = path.display().to_string();
    let snapshot = DirectorySnapshot::load(path)
        .map_err(|e| CliError::snapshot_error(format!("Failed to load snapshot {}: {}", path_text, e)))?;
    log_event_with_fields(Event::SnapshotLoaded, &[("path", &path_text)]);

    let dir = InMemoryDirectory::new(snapshot);
    let result = operation(&dir);

    let updated = dir
        .snapshot()
        .map_err(|e| CliError::snapshot_error(e.to_string()))?;
    updated
        .save(path)
        .map_err(|e| CliError::snapshot_error(format!("Failed to save snapshot {}: {}", path_text, e)))?;
    log_event_with_fields(Event::SnapshotSaved, &[("path", &path_text)]);

    result
}

/// Parse `host[:port]@site[#version]`.
///
/// Primary servers take an optional version and no port; secondary
/// instances take an optional port and no version.
pub fn parse_server_spec(text: &str, technology: Technology) -> CliResult<ServerSpec> {
    let invalid = |reason: &str| CliError::invalid_input(format!("server '{}': {}", text, reason));

    let (address, rest) = text
        .split_once('@')
        .ok_or_else(|| invalid("expected host[:port]@site[#version]"))?;
    let (site, version) = match rest.split_once('#') {
        Some((site, version)) => (site, Some(version)),
        None => (rest, None),
    };
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid("bad port"))?)),
        None => (address, None),
    };
    if host.is_empty() || site.is_empty() {
        return Err(invalid("host and site are required"));
    }

    match technology {
        Technology::Primary => {
            if port.is_some() {
                return Err(invalid("primary servers take no port"));
            }
            let version = version.unwrap_or(DEFAULT_PRIMARY_VERSION);
            version.parse::<ServerVersion>()?;
            Ok(ServerSpec::primary(host, site, version))
        }
        Technology::Secondary => {
            if version.is_some() {
                return Err(invalid("secondary instances take no version"));
            }
            Ok(ServerSpec::secondary(host, port.unwrap_or(DEFAULT_SECONDARY_PORT), site))
        }
    }
}

// ==================
// Partitions
// ==================

fn partition(dir: &InMemoryDirectory, config: &Config, command: PartitionCommand) -> CliResult<Value> {
    let manager = PartitionManager::new(dir, dir, config.partition_policy()?);

    match command {
        PartitionCommand::Create {
            target,
            dn,
            kind,
            class,
            security_reference_domain,
            replicas,
        } => {
            let context = target.context();
            let mut partition = match class {
                Some(class) => manager.create_with_class(&context, &dn, &class)?,
                None => {
                    let kind = match kind {
                        Some(kind) => PartitionKind::from(kind),
                        None => PartitionKind::from(RootInfo::read(dir, &context)?.technology),
                    };
                    manager.create(&context, &dn, kind)?
                }
            };
            if let Some(domain) = security_reference_domain {
                partition.set_security_reference_domain(Some(&domain))?;
            }
            add_replicas(dir, &manager, &mut partition, &replicas)?;
            manager.commit(&mut partition)?;
            partition_view(&manager, &mut partition)
        }

        PartitionCommand::Find { target, dn, dns_name } => {
            let context = target.context();
            let mut partition = match (dn, dns_name) {
                (Some(dn), _) => manager.find_by_name(&context, &dn)?,
                (None, Some(name)) => manager.open(&context, &name)?,
                (None, None) => return Err(CliError::invalid_input("--dn or --dns-name is required")),
            };
            partition_view(&manager, &mut partition)
        }

        PartitionCommand::Delete { target, dn } => {
            let partition = manager.find_by_name(&target.context(), &dn)?;
            manager.delete(&partition)?;
            Ok(json!({ "deleted": partition.dn() }))
        }

        PartitionCommand::Servers {
            target,
            dn,
            site,
            source,
            force,
        } => {
            let partition = manager.find_by_name(&target.context(), &dn)?;
            let site = site.as_deref();
            let servers = match source {
                ServerSource::Locator => manager.find_servers(&partition, site, force)?,
                ServerSource::Registry => manager.find_all_servers(&partition, site)?,
                ServerSource::Discoverable => manager.find_discoverable_servers(&partition, site)?,
                ServerSource::One => vec![manager.find_server(&partition, site, force)?],
            };
            Ok(json!({
                "partition": partition.dn(),
                "servers": serde_json::to_value(servers)?,
            }))
        }

        PartitionCommand::Replicas {
            target,
            dn,
            add,
            remove,
        } => {
            let mut partition = manager.find_by_name(&target.context(), &dn)?;
            for name in &remove {
                let set = manager.replica_set(&mut partition)?;
                let server = set
                    .index_of_name(name)
                    .and_then(|i| set.get(i))
                    .cloned()
                    .ok_or_else(|| CliError::invalid_input(format!("'{}' is not a replica of {}", name, dn)))?;
                set.remove(dir, &server)?;
            }
            add_replicas(dir, &manager, &mut partition, &add)?;
            manager.commit(&mut partition)?;
            partition_view(&manager, &mut partition)
        }
    }
}

fn add_replicas(
    dir: &InMemoryDirectory,
    manager: &PartitionManager<'_>,
    partition: &mut Partition,
    names: &[String],
) -> CliResult<()> {
    for name in names {
        let server = ReplicaServer::find(dir, partition.context(), name)?;
        manager.replica_set(partition)?.add(dir, server)?;
    }
    Ok(())
}

fn partition_view(manager: &PartitionManager<'_>, partition: &mut Partition) -> CliResult<Value> {
    let summary = serde_json::to_value(partition.summary())?;
    let replicas: Vec<String> = manager
        .replica_set(partition)?
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    Ok(json!({
        "partition": summary,
        "replicas": replicas,
    }))
}

// ==================
// Site links
// ==================

fn link(dir: &InMemoryDirectory, config: &Config, command: LinkCommand) -> CliResult<Value> {
    match command {
        LinkCommand::Create { link, sites } => {
            let context = link.target.context();
            let mut topology_link =
                TopologyLink::create(dir, &context, &link.name, link.transport, config.link_policy())?;
            for site in &sites {
                topology_link.add_site(SiteRef::find(dir, &context, site)?)?;
            }
            topology_link.save()?;
            describe(&mut topology_link)
        }

        LinkCommand::Show { link } => {
            let mut topology_link = find_link(dir, &link)?;
            describe(&mut topology_link)
        }

        LinkCommand::Set { link, changes } => {
            let mut topology_link = find_link(dir, &link)?;
            apply_changes(dir, &link.target, &mut topology_link, &changes)?;
            topology_link.save()?;
            describe(&mut topology_link)
        }

        LinkCommand::Delete { link } => {
            let mut topology_link = find_link(dir, &link)?;
            topology_link.delete()?;
            Ok(json!({ "deleted": link.name, "transport": link.transport }))
        }
    }
}

fn find_link<'a>(dir: &'a InMemoryDirectory, link: &LinkArgs) -> CliResult<TopologyLink<'a>> {
    Ok(TopologyLink::find_by_name(
        dir,
        &link.target.context(),
        &link.name,
        link.transport,
    )?)
}

fn describe(link: &mut TopologyLink<'_>) -> CliResult<Value> {
    Ok(serde_json::to_value(link.describe()?)?)
}

fn apply_changes(
    dir: &InMemoryDirectory,
    target: &TargetArgs,
    link: &mut TopologyLink<'_>,
    changes: &LinkChanges,
) -> CliResult<()> {
    if let Some(cost) = changes.cost {
        link.set_cost(cost)?;
    }
    if let Some(minutes) = changes.interval {
        link.set_replication_interval(Duration::minutes(minutes))?;
    }
    if let Some(enabled) = changes.notification {
        link.set_notification_enabled(enabled)?;
    }
    if let Some(enabled) = changes.reciprocal {
        link.set_reciprocal_replication_enabled(enabled)?;
    }
    if let Some(enabled) = changes.compression {
        link.set_data_compression_enabled(enabled)?;
    }

    let context = target.context();
    for site in &changes.add_sites {
        link.add_site(SiteRef::find(dir, &context, site)?)?;
    }
    for site in &changes.remove_sites {
        link.remove_site(site)?;
    }

    if changes.clear_schedule {
        link.set_schedule(None)?;
    } else if !changes.windows.is_empty() {
        let mut schedule = Schedule::new();
        for window in &changes.windows {
            parse_window(&mut schedule, window)?;
        }
        link.set_schedule(Some(&schedule))?;
    }
    Ok(())
}

/// Mark `<day|daily> HH:MM-HH:MM` available on `schedule`.
pub fn parse_window(schedule: &mut Schedule, text: &str) -> CliResult<()> {
    let invalid = || CliError::invalid_input(format!("window '{}': expected <day|daily> HH:MM-HH:MM", text));

    let mut parts = text.split_whitespace();
    let (day, range) = match (parts.next(), parts.next(), parts.next()) {
        (Some(day), Some(range), None) => (day, range),
        _ => return Err(invalid()),
    };
    let (from, to) = range.split_once('-').ok_or_else(invalid)?;
    let (from_hour, from_quarter) = parse_time(from).ok_or_else(invalid)?;
    let (to_hour, to_quarter) = parse_time(to).ok_or_else(invalid)?;
    let from_quarter = QuarterHour::from_minute(from_quarter)?;
    let to_quarter = QuarterHour::from_minute(to_quarter)?;

    if day.eq_ignore_ascii_case("daily") {
        schedule.set_daily_range(from_hour, from_quarter, to_hour, to_quarter)?;
    } else {
        let day = day.parse::<Weekday>().map_err(|_| invalid())?;
        schedule.set_range(day, from_hour, from_quarter, to_hour, to_quarter)?;
    }
    Ok(())
}

fn parse_time(text: &str) -> Option<(u32, u32)> {
    let (hour, minute) = text.split_once(':')?;
    Some((hour.parse().ok()?, minute.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliErrorCode;

    #[test]
    fn test_parse_primary_server_spec() {
        assert!(parse_server_spec("dc1.corp.com@Site1#10.0", Technology::Primary).is_ok());
        assert!(parse_server_spec("dc1.corp.com@Site1", Technology::Primary).is_ok());
        assert!(parse_server_spec("dc1.corp.com:389@Site1", Technology::Primary).is_err());
        assert!(parse_server_spec("dc1.corp.com", Technology::Primary).is_err());
    }

    #[test]
    fn test_parse_secondary_server_spec() {
        assert!(parse_server_spec("ad1.corp.com:50000@Site1", Technology::Secondary).is_ok());
        assert!(parse_server_spec("ad1.corp.com@Site1#6.3", Technology::Secondary).is_err());
        let err = parse_server_spec("ad1.corp.com:port@Site1", Technology::Secondary).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::InvalidInput);
    }

    #[test]
    fn test_parse_window() {
        let mut schedule = Schedule::new();
        parse_window(&mut schedule, "mon 08:00-09:45").unwrap();
        assert!(schedule.is_available(Weekday::Mon, 9, QuarterHour::FortyFive).unwrap());
        assert!(!schedule.is_available(Weekday::Mon, 10, QuarterHour::Zero).unwrap());
        assert!(!schedule.is_available(Weekday::Tue, 8, QuarterHour::Zero).unwrap());

        parse_window(&mut schedule, "daily 22:00-22:15").unwrap();
        assert!(schedule.is_available(Weekday::Sun, 22, QuarterHour::Fifteen).unwrap());
    }

    #[test]
    fn test_parse_window_rejects_bad_minutes() {
        let mut schedule = Schedule::new();
        let err = parse_window(&mut schedule, "mon 08:10-09:00").unwrap_err();
        assert_eq!(err.code_str(), "DIRPART_INVALID_ARGUMENT");
        assert!(parse_window(&mut schedule, "someday 08:00-09:00").is_err());
        assert!(parse_window(&mut schedule, "mon 08:00").is_err());
    }
}
