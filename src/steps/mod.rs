pub mod configure;
pub mod disk;
pub mod install;
pub mod preflight;
pub mod prompt;

use crate::{
    cmd::CommandRunner, config::InstallConfig, error::Result, hardware::HardwareProfile,
    packages::PackageSelection, ui,
};

pub const TOTAL_STEPS: u8 = 6;

/// The destructive half of the install: everything after the user has
/// confirmed the summary. Stops at the first critical failure.
pub fn execute<R: CommandRunner + ?Sized>(
    runner: &mut R,
    config: &InstallConfig,
    hw: &HardwareProfile,
    selection: &PackageSelection,
) -> Result<()> {
    ui::print_step(4, TOTAL_STEPS, "Disk Preparation");
    disk::prepare(runner, config)?;

    ui::print_step(5, TOTAL_STEPS, "Package Installation");
    install::run(runner, config, selection)?;

    ui::print_step(6, TOTAL_STEPS, "System Configuration");
    configure::run(runner, config, hw, selection)?;

    tracing::info!(hostname = %config.hostname, "installation finished");
    Ok(())
}
