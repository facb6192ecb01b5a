// CLASSIFICATION: COMMUNITY
// Filename: sealbootctl.rs v0.3
// Date Modified: 2026-07-31
// Author: Lukas Bower

//! Thin driver for the sealboot core.
//!
//! Runs the full update cycle: trust new assets, reseal against the union
//! of old and new boot images, install shim and kernels, commit the boot
//! variables and fallback CSV, collect obsolete kernels, and reseal again
//! over what survived. Exit codes: 0 on success, 1 on any core error, 2
//! when writing the `--output-json` dump fails.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;

use sealboot::assets::TrustedAssets;
use sealboot::bootmgr::BootManager;
use sealboot::efivars::mock::MockEfiVariables;
use sealboot::efivars::HostEfiVariables;
use sealboot::fs::{Fs as _, HostFs};
use sealboot::kernel::KernelManager;
use sealboot::reseal::{reseal_key, Services};
use sealboot::secboot::{HostAuxKeySource, HostKeyring, HostTpm, MeasuredBootPolicy};
use sealboot::shim::install_shim;
use sealboot::CoreContext;

const DEFAULT_ESP: &str = "/boot/efi";
const DEFAULT_KERNEL_SOURCE: &str = "/usr/lib/linux/efi";
const DEFAULT_SHIM_SOURCE: &str = "/usr/lib/sealboot/shim";
const DEFAULT_VENDOR: &str = "ubuntu";

/// Keep kernels, boot variables and the sealed-key policy in sync.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Arguments {
    /// Skip both reseal passes.
    #[arg(long)]
    no_tpm: bool,

    /// Use an in-memory variable store instead of the firmware.
    #[arg(long)]
    no_efivars: bool,

    /// Write the in-memory variable store as JSON after the run
    /// (implies --no-efivars).
    #[arg(long, value_name = "PATH")]
    output_json: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = Arguments::parse();
    std::process::exit(run(&args));
}

fn run(args: &Arguments) -> i32 {
    let fs = Rc::new(HostFs);

    let mock = if args.no_efivars || args.output_json.is_some() {
        Some(Rc::new(MockEfiVariables::new(fs.clone())))
    } else {
        None
    };
    let ctx = match &mock {
        Some(mock) => CoreContext::new(fs, mock.clone()),
        None => CoreContext::new(fs, Rc::new(HostEfiVariables::new())),
    };

    let mut code = 0;
    if let Err(e) = update(&ctx, args.no_tpm) {
        log::error!("{e:#}");
        code = 1;
    }

    if let Some(path) = &args.output_json {
        let mock = mock.expect("dump requested, mock backend in use");
        if let Err(e) = write_json_dump(&mock, path) {
            log::error!("{e:#}");
            if code == 0 {
                code = 2;
            }
        }
    }

    code
}

fn update(ctx: &CoreContext, no_tpm: bool) -> Result<()> {
    let esp = Path::new(DEFAULT_ESP);
    let kernel_source = Path::new(DEFAULT_KERNEL_SOURCE);
    let shim_source = Path::new(DEFAULT_SHIM_SOURCE);
    let vendor = DEFAULT_VENDOR;
    let vendor_dir = esp.join("EFI").join(vendor);

    let mut assets = TrustedAssets::read(ctx).context("cannot read trusted assets")?;
    for dir in [vendor_dir.as_path(), shim_source, kernel_source] {
        if ctx.fs.stat(dir).is_ok() {
            assets
                .trust_new_from_dir(ctx, dir)
                .with_context(|| format!("cannot trust assets from {}", dir.display()))?;
        }
    }

    let boot_manager = BootManager::load(ctx).context("cannot load boot manager")?;
    let mut km = KernelManager::new(ctx, esp, kernel_source, vendor, Some(boot_manager))
        .context("cannot create kernel manager")?;

    let policy = MeasuredBootPolicy;
    let aux_key = HostAuxKeySource;
    let keyring = HostKeyring;
    let tpm = HostTpm;
    let services = Services {
        policy: &policy,
        aux_key: &aux_key,
        keyring: &keyring,
        tpm: &tpm,
    };

    // Bind the policy to old and new images before anything changes, so an
    // interrupted run still boots.
    if !no_tpm {
        reseal_key(ctx, &services, &assets, &km, esp, shim_source, vendor)
            .context("cannot reseal before install")?;
    }

    if ctx.fs.stat(shim_source).is_ok() {
        if install_shim(ctx, esp, shim_source, vendor).context("cannot install shim")? {
            log::info!("updated shim");
        }
    }

    km.install_kernels(ctx).context("cannot install kernels")?;
    km.commit_to_boot_loader(ctx)
        .context("cannot commit to boot loader")?;
    km.remove_obsolete_kernels(ctx)
        .context("cannot remove obsolete kernels")?;
    km.commit_to_boot_loader(ctx)
        .context("cannot commit to boot loader")?;

    assets.remove_obsolete();
    assets.save(ctx).context("cannot save trusted assets")?;

    if !no_tpm {
        reseal_key(ctx, &services, &assets, &km, esp, shim_source, vendor)
            .context("cannot reseal after cleanup")?;
    }

    Ok(())
}

fn write_json_dump(mock: &MockEfiVariables, path: &Path) -> Result<()> {
    let payload = serde_json::to_string_pretty(&mock.to_json())
        .context("cannot serialize variable dump")?;
    std::fs::write(path, payload + "\n")
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}
