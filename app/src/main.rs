// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `xproc-clusterd`: a host-side tool for driving the cross-processor IPC
//! substrate against a cluster manifest.
//!
//! This binary doesn't talk to real companion-core hardware -- it wires
//! the same `xproc-kern`/`xproc-client` code real drivers use up to the
//! software stand-ins in `drv-xproc-mmu` and `drv-xproc-procctrl-api`, so
//! the attach/detach/status flow can be exercised and demonstrated on a
//! development host.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use drv_xproc_fwload::GoblinFirmwareImage;
use drv_xproc_fwload_api::FirmwareImage;
use drv_xproc_mmu::SoftwareMmu;
use drv_xproc_mmu_api::MmuMapper;
use drv_xproc_nameserver::{name as fixed_name, NameTable, Published};
use drv_xproc_procctrl_api::{NullProcessorControl, ProcessorControl};
use xproc_abi::{CoreId, GateDescriptor, LocalProtectionKind, RemoteProtectionKind};
use xproc_client::{Peer, XprocClient};

use xproc_clusterd::ClusterConfig;

#[derive(Parser, Debug)]
#[clap(name = "xproc-clusterd", max_term_width = 80)]
struct Args {
    /// Path to the cluster manifest, in TOML.
    #[clap(long, default_value = "cluster.toml")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists the configured companion cores and their firmware images.
    Status,
    /// Runs the attach handshake against one configured core.
    Attach { core: String },
    /// Runs the detach handshake against one configured core.
    Detach { core: String },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ClusterConfig::load(&args.config)?;

    match args.command {
        Command::Status => status(&config),
        Command::Attach { core } => attach(&config, &core),
        Command::Detach { core } => detach(&config, &core),
    }
}

fn status(config: &ClusterConfig) -> anyhow::Result<()> {
    println!("cluster: {}", config.name);
    for (name, core) in &config.cores {
        let parsed = std::fs::read(&core.firmware)
            .map_err(anyhow::Error::from)
            .and_then(GoblinFirmwareImage::parse);
        match parsed {
            Ok(image) => {
                let (offset, len) = image.resource_table().unwrap_or((0, 0));
                let mut mmu = SoftwareMmu::default();
                // Sanity check: the resource table's own byte range must be
                // mappable before the orchestrator can patch carveouts into it.
                let mappable = unsafe { mmu.map(u64::from(offset), len) }.is_ok();
                println!(
                    "  {name} (remote-id {}): entry=0x{:x} resource-table=@{offset:#x}+{len} mappable={mappable}",
                    core.remote_id,
                    image.entry_point()
                );
            }
            Err(err) => {
                println!(
                    "  {name} (remote-id {}): firmware unreadable: {err}",
                    core.remote_id
                );
            }
        }
    }
    Ok(())
}

fn attach(config: &ClusterConfig, name: &str) -> anyhow::Result<()> {
    let core = config
        .cores
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("no such core `{name}` in cluster manifest"))?;

    let mut procctrl = NullProcessorControl::default();
    let remote = CoreId(core.remote_id);
    procctrl.hold_in_reset(remote)?;

    let client = XprocClient::from_env()?;
    client.attach(remote)?;
    procctrl.release_from_reset(remote)?;

    let mut names = NameTable::<16>::default();
    let descriptor = GateDescriptor::new(
        core.remote_id,
        RemoteProtectionKind::SYSTEM,
        LocalProtectionKind::NONE,
        remote,
    );
    names.publish(fixed_name(name), Published::Gate(descriptor));

    println!("attached to `{name}` (remote-id {})", core.remote_id);
    Ok(())
}

fn detach(config: &ClusterConfig, name: &str) -> anyhow::Result<()> {
    let core = config
        .cores
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("no such core `{name}` in cluster manifest"))?;

    let client = XprocClient::from_env()?;
    let peer = Peer {
        local: client.local,
        remote: CoreId(core.remote_id),
    };
    client.detach(peer)?;

    println!("detached from `{name}` (remote-id {})", core.remote_id);
    Ok(())
}
