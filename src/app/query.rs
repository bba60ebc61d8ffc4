use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::Result;
use crate::cli::{InfoArgs, ValidateArgs};
use crate::config::DriverConfig;
use crate::core::Driver;
use crate::core::outcome::{InstanceInfo, NodeInfo};
use crate::core::params::HvParams;

use super::common::{open_driver, print_json};

#[derive(Debug, Serialize)]
struct InfoView<'a> {
    #[serde(flatten)]
    info: &'a InstanceInfo,
    started_at: Option<String>,
}

impl<'a> InfoView<'a> {
    fn new(info: &'a InstanceInfo) -> Self {
        Self {
            info,
            started_at: started_at(info.uptime),
        }
    }
}

fn started_at(uptime: Duration) -> Option<String> {
    if uptime.is_zero() {
        return None;
    }
    (OffsetDateTime::now_utc() - uptime).format(&Rfc3339).ok()
}

pub fn handle_info(args: InfoArgs, config: DriverConfig, json: bool) -> Result<()> {
    let driver = open_driver(config)?;
    let info = driver.get_info(&args.name)?;
    if json {
        print_json(&InfoView::new(&info));
    } else {
        print_info_table(&[info]);
    }
    Ok(())
}

pub fn handle_list(config: DriverConfig, json: bool) -> Result<()> {
    let driver = open_driver(config)?;
    let infos = driver.list_all()?;
    if json {
        let views: Vec<InfoView<'_>> = infos.iter().map(InfoView::new).collect();
        print_json(&views);
    } else if infos.is_empty() {
        println!("No instances running.");
    } else {
        print_info_table(&infos);
    }
    Ok(())
}

pub fn handle_node_info(config: DriverConfig, json: bool) -> Result<()> {
    let driver = open_driver(config)?;
    let info = driver.node_info()?;
    if json {
        print_json(&info);
    } else {
        print_node_info(&info);
    }
    Ok(())
}

/// Exit status 69 when the node cannot run instances.
pub fn handle_verify(config: DriverConfig) -> Result<ExitCode> {
    let driver = open_driver(config)?;
    match driver.verify() {
        None => {
            println!("Node OK.");
            Ok(ExitCode::SUCCESS)
        }
        Some(problem) => {
            eprintln!("{problem}");
            Ok(ExitCode::from(69))
        }
    }
}

pub fn handle_validate(args: ValidateArgs) -> Result<()> {
    let map: BTreeMap<String, String> = args.params.into_iter().collect();
    let params = HvParams::from_map(&map)?;
    <Driver>::validate_syntax(&params)?;
    if args.runtime {
        <Driver>::validate_runtime(&params)?;
    }
    println!("Hypervisor parameters are valid.");
    Ok(())
}

fn print_info_table(infos: &[InstanceInfo]) {
    let name_width = infos
        .iter()
        .map(|info| info.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    println!(
        "{:<name_width$}  {:>8}  {:>8}  {:>5}  {:<6}  UPTIME",
        "NAME", "PID", "MEMORY", "VCPUS", "STATE"
    );
    for info in infos {
        println!(
            "{:<name_width$}  {:>8}  {:>7}M  {:>5}  {:<6}  {}",
            info.name,
            info.pid,
            info.memory,
            info.vcpus,
            info.state,
            format_uptime(info.uptime)
        );
    }
}

fn print_node_info(info: &NodeInfo) {
    println!("memory_total: {} MiB", info.memory_total);
    println!("memory_free:  {} MiB", info.memory_free);
    match info.memory_used {
        Some(used) => println!("memory_used:  {used} MiB"),
        None => println!("memory_used:  unknown"),
    }
    println!("cpu_total:    {}", info.cpu_total);
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}
