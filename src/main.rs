use std::{fs::OpenOptions, path::Path, sync::Mutex};

use clap::Parser;
use dialoguer::Confirm;
use tracing_subscriber::EnvFilter;

use arch_installer::{
    cli::Cli,
    cmd::{CommandRunner, SystemRunner},
    config::InstallConfig,
    error::{InstallerError, Result},
    hardware::{self, HardwareProfile, Sources},
    packages::PackageSelection,
    steps::{self, TOTAL_STEPS},
    ui,
};

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_file, cli.verbose);

    if let Err(e) = run(&cli) {
        tracing::error!(error = %e, "installation aborted");
        println!();
        ui::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}

/// Logs go to a file so they never interleave with the prompts. `RUST_LOG`
/// overrides the level.
fn init_logging(path: &Path, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        Err(e) => ui::print_warning(&format!("Logging disabled, cannot open {}: {}", path.display(), e)),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut runner = SystemRunner::new(cli.dry_run);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), dry_run = cli.dry_run, "starting");

    // ── Welcome ───────────────────────────────────────────────────────────────
    ui::print_banner();

    if runner.is_dry_run() {
        ui::print_warning("DRY-RUN MODE: no disk will be touched, no command will run.");
    }

    ui::print_info("This wizard installs Arch Linux on an encrypted LVM volume.");
    ui::print_info("Nothing is changed until you confirm the summary.");

    // ── Step 1: Pre-flight checks ─────────────────────────────────────────────
    ui::print_step(1, TOTAL_STEPS, "Pre-flight Checks");
    steps::preflight::run(&mut runner)?;

    // ── Step 2: Questions ─────────────────────────────────────────────────────
    ui::print_step(2, TOTAL_STEPS, "Installation Options");
    let answers = steps::prompt::collect(&mut runner)?;
    let config = InstallConfig::from_answers(answers, cli.localization(), &cli.mount_point)?;

    // ── Step 3: Hardware + summary ────────────────────────────────────────────
    ui::print_step(3, TOTAL_STEPS, "Hardware Detection");
    let hw = hardware::detect(&mut runner, &Sources::default(), config.gaming);
    let selection = PackageSelection::assemble(&config, &hw);
    print_summary(&config, &hw, &selection);
    confirm_destroy(&config)?;

    // ── Steps 4-6: Disk, packages, configuration ─────────────────────────────
    steps::execute(&mut runner, &config, &hw, &selection)?;

    println!();
    ui::print_success("Installation complete.");
    ui::print_info(&format!(
        "Unmount with `umount -R {}` and reboot. You will be asked for the disk passphrase at boot.",
        config.target_root.display()
    ));
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn print_summary(config: &InstallConfig, hw: &HardwareProfile, selection: &PackageSelection) {
    println!();
    ui::print_kv_box(
        "Installation Summary",
        &[
            ("Hostname", config.hostname.clone()),
            ("Disk", config.disk.path.display().to_string()),
            ("EFI", config.efi_partition.display().to_string()),
            ("Encrypted", config.root_partition.display().to_string()),
            ("Kernel", config.kernel.display_name().to_string()),
            ("Swap", config.swap.display_name().to_string()),
            ("Desktop", config.desktop.display_name().to_string()),
            ("AUR helper", if config.aur_helper { "paru".into() } else { "none".into() }),
            ("User", config.username.clone()),
            ("CPU", hw.cpu.to_string()),
            ("GPU", hw.gpu_summary()),
            ("Chassis", hw.chassis.to_string()),
            ("Packages", selection.packages().len().to_string()),
        ],
    );
    println!();
}

fn confirm_destroy(config: &InstallConfig) -> Result<()> {
    ui::print_warning(&format!(
        "ALL DATA on {} will be permanently destroyed.",
        config.disk.path.display()
    ));
    println!();

    if !Confirm::new()
        .with_prompt(format!("Erase {} and install?", config.disk.path.display()))
        .default(false)
        .interact()?
    {
        return Err(InstallerError::Cancelled);
    }
    Ok(())
}
