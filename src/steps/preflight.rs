use std::{
    net::{TcpStream, ToSocketAddrs},
    path::Path,
    time::Duration,
};

use crate::{
    cmd::{Cmd, CommandRunner},
    error::{InstallerError, Result},
    ui,
};

pub const EFI_VARS: &str = "/sys/firmware/efi/efivars";

/// archlinux.org over HTTPS; TCP connect is enough, nothing is sent.
pub const PROBE_HOST: &str = "archlinux.org:443";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Root, UEFI and network checks, in that order, then a best-effort clock
/// sync. Nothing destructive happens before this passes.
pub fn run<R: CommandRunner + ?Sized>(runner: &mut R) -> Result<()> {
    let dry_run = runner.is_dry_run();

    check_root(dry_run)?;
    check_uefi(Path::new(EFI_VARS), dry_run)?;
    check_network(dry_run)?;
    sync_clock(runner);

    Ok(())
}

// ── Root ──────────────────────────────────────────────────────────────────────

/// Effective UID from the `Uid:` line of `/proc/self/status`
/// (`Uid: real effective saved fs`).
pub fn effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find(|l| l.starts_with("Uid:"))
        .and_then(|l| l.split_whitespace().nth(2))
        .and_then(|v| v.parse().ok())
}

fn check_root(dry_run: bool) -> Result<()> {
    let uid = std::fs::read_to_string("/proc/self/status")
        .ok()
        .as_deref()
        .and_then(effective_uid);

    match uid {
        Some(0) => {
            ui::print_success("Running as root.");
            Ok(())
        }
        _ if dry_run => {
            ui::print_warning("Not root; continuing because this is a dry run.");
            Ok(())
        }
        _ => Err(InstallerError::NotRoot),
    }
}

// ── UEFI ──────────────────────────────────────────────────────────────────────

pub fn check_uefi(efivars: &Path, dry_run: bool) -> Result<()> {
    if efivars.exists() {
        ui::print_success("UEFI mode detected.");
        return Ok(());
    }
    if dry_run {
        ui::print_warning("No EFI variables found; simulating UEFI for the dry run.");
        return Ok(());
    }
    Err(InstallerError::NotUefi(efivars.display().to_string()))
}

// ── Network ───────────────────────────────────────────────────────────────────

fn probe(host: &str, timeout: Duration) -> std::result::Result<(), String> {
    let addrs = host.to_socket_addrs().map_err(|e| format!("cannot resolve {}: {}", host, e))?;

    let mut last = format!("no addresses for {}", host);
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(()),
            Err(e) => last = format!("{}: {}", addr, e),
        }
    }
    Err(last)
}

fn check_network(dry_run: bool) -> Result<()> {
    let pb = ui::spinner(format!("Checking connectivity to {}…", PROBE_HOST));
    match probe(PROBE_HOST, PROBE_TIMEOUT) {
        Ok(()) => {
            tracing::info!(host = PROBE_HOST, "network reachable");
            ui::done_spinner(pb, "Network reachable.");
            Ok(())
        }
        Err(reason) => {
            pb.finish_and_clear();
            if dry_run {
                ui::print_warning(&format!("Offline ({}); ignored for the dry run.", reason));
                Ok(())
            } else {
                Err(InstallerError::Offline(reason))
            }
        }
    }
}

// ── Clock ─────────────────────────────────────────────────────────────────────

/// An accurate clock prevents package-signature validation errors.
fn sync_clock<R: CommandRunner + ?Sized>(runner: &mut R) {
    if runner.run_best_effort(&Cmd::new("timedatectl").args(["set-ntp", "true"])) {
        ui::print_success("System clock synchronised via NTP.");
    } else {
        ui::print_warning("Could not enable NTP; beware of signature errors if the clock is off.");
    }
}
