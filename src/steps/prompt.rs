use console::style;
use dialoguer::{Confirm, Input, Password, Select};

use crate::{
    cmd::CommandRunner,
    config::{self, Answers, Desktop, Disk, Secret, DEFAULT_HOSTNAME},
    error::{InstallerError, Result},
    lsblk, ui,
};

/// Asks every installation question. Only reads; nothing is changed on the
/// system until the caller has confirmed the resulting configuration.
pub fn collect<R: CommandRunner + ?Sized>(runner: &mut R) -> Result<Answers> {
    let hostname: String = Input::new()
        .with_prompt(format!("Hostname (empty for '{}')", DEFAULT_HOSTNAME))
        .allow_empty(true)
        .validate_with(|h: &String| -> std::result::Result<(), String> {
            if h.trim().is_empty() {
                return Ok(());
            }
            config::validate_hostname(h.trim()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let disk = ask_disk(runner)?;

    println!();
    let gaming = Confirm::new()
        .with_prompt("Gaming profile? (zen kernel, GPU driver detection, Steam)")
        .default(false)
        .interact()?;

    let hibernate = Confirm::new()
        .with_prompt("Enable hibernation? (adds a swap volume; otherwise zram is used)")
        .default(false)
        .interact()?;

    let desktop = ask_desktop()?;

    let aur_helper = Confirm::new()
        .with_prompt("Bootstrap the paru AUR helper?")
        .default(false)
        .interact()?;

    println!();
    let username: String = Input::new()
        .with_prompt("Username")
        .validate_with(|u: &String| -> std::result::Result<(), String> {
            config::validate_username(u.trim()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let password = Password::new()
        .with_prompt(format!("Password for {} (also used for root)", username.trim()))
        .with_confirmation("Repeat password", "Passwords do not match")
        .validate_with(|p: &String| -> std::result::Result<(), &str> {
            if p.is_empty() {
                Err("Password must not be empty")
            } else {
                Ok(())
            }
        })
        .interact()?;

    Ok(Answers {
        hostname,
        disk,
        gaming,
        hibernate,
        desktop,
        aur_helper,
        username,
        password: Secret::new(password),
    })
}

// ── Disk ──────────────────────────────────────────────────────────────────────

fn ask_disk<R: CommandRunner + ?Sized>(runner: &mut R) -> Result<String> {
    let disks = lsblk::list_disks(runner);

    println!();
    if disks.is_empty() {
        ui::print_warning("Could not detect disks automatically.");
    } else {
        println!(
            "  {:<12}  {:>8}   {}",
            style("DISK").dim(),
            style("SIZE").dim(),
            style("MODEL").dim()
        );
        println!("  {}", style("─".repeat(44)).dim());
        for d in &disks {
            println!("  {}", d.display());
        }
        println!();
    }

    let default = disks.first().map(|d| d.name.clone()).unwrap_or_else(|| "sda".to_string());
    let input: String = Input::new()
        .with_prompt("Target disk (e.g. sda or nvme0n1)")
        .default(default)
        .interact_text()?;

    let disk = Disk::parse(&input)?;
    ensure_block_device(&disk, runner.is_dry_run())?;
    Ok(disk.name)
}

/// The one input check performed against the live system.
pub fn ensure_block_device(disk: &Disk, dry_run: bool) -> Result<()> {
    if config::is_block_device(&disk.path) {
        return Ok(());
    }
    if dry_run {
        ui::print_warning(&format!(
            "{} is not a block device; continuing because this is a dry run.",
            disk.path.display()
        ));
        return Ok(());
    }
    Err(InstallerError::NotBlockDevice(disk.path.display().to_string()))
}

// ── Desktop ───────────────────────────────────────────────────────────────────

fn ask_desktop() -> Result<Desktop> {
    let labels: Vec<String> = Desktop::ALL
        .iter()
        .map(|d| {
            format!(
                "{:<11}  {}",
                style(d.display_name()).cyan().bold(),
                style(format!("login manager: {}", d.display_manager())).dim()
            )
        })
        .collect();

    let idx = Select::new()
        .with_prompt("Desktop environment")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(Desktop::ALL[idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_disk_fails_outside_dry_run() {
        let disk = Disk::parse("definitely-not-a-disk0").unwrap();
        let err = ensure_block_device(&disk, false).unwrap_err();
        assert!(matches!(err, InstallerError::NotBlockDevice(ref p) if p == "/dev/definitely-not-a-disk0"));
        assert!(ensure_block_device(&disk, true).is_ok());
    }

    #[test]
    fn regular_file_is_not_a_block_device() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(!config::is_block_device(file.path()));
    }
}
