//! Renders the configuration files written into the installed system.
//!
//! Everything here is a pure function of the install configuration (and, for
//! read-modify-write files, the distribution default). Nothing touches disk.

use crate::{
    config::{Desktop, InstallConfig, KernelVariant, SwapStrategy, LUKS_MAPPING},
    error::{InstallerError, Result},
    hardware::{GpuVendor, HardwareProfile},
};

pub const PARALLEL_DOWNLOADS: u8 = 10;

// ── Identity and locale ───────────────────────────────────────────────────────

pub fn hostname(config: &InstallConfig) -> String {
    format!("{}\n", config.hostname)
}

pub fn hosts(config: &InstallConfig) -> String {
    format!(
        "127.0.0.1   localhost\n::1         localhost\n127.0.1.1   {0}.localdomain {0}\n",
        config.hostname
    )
}

pub fn locale_conf(config: &InstallConfig) -> String {
    format!("LANG={}\n", config.localization.locale)
}

pub fn vconsole_conf(config: &InstallConfig) -> String {
    format!("KEYMAP={}\n", config.localization.keymap)
}

/// Uncomments the `<locale> UTF-8` line, appending it if the distribution
/// file does not list it.
pub fn enable_locale(locale_gen: &str, locale: &str) -> String {
    let charset = locale.rsplit('.').next().filter(|c| *c != locale).unwrap_or("UTF-8");
    let wanted = format!("{} {}", locale, charset);

    let mut found = false;
    let mut out: Vec<String> = locale_gen
        .lines()
        .map(|line| {
            // `#  en_US.UTF-8 UTF-8` in the header is an example, not an entry.
            let entry = line.strip_prefix('#').unwrap_or(line).trim_end();
            if !found && entry == wanted {
                found = true;
                wanted.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !found {
        out.push(wanted);
    }
    out.join("\n") + "\n"
}

// ── pacman.conf ───────────────────────────────────────────────────────────────

/// Turns on colour output and parallel downloads, and enables `[multilib]`
/// when requested. Lines already in the desired state are left alone.
pub fn tune_pacman_conf(pacman_conf: &str, multilib: bool) -> String {
    let tuned: Vec<String> = pacman_conf
        .lines()
        .map(|line| {
            let bare = line.trim_start_matches('#').trim();
            if bare == "Color" {
                "Color".to_string()
            } else if bare.starts_with("ParallelDownloads") {
                format!("ParallelDownloads = {}", PARALLEL_DOWNLOADS)
            } else {
                line.to_string()
            }
        })
        .collect();
    let tuned = tuned.join("\n") + "\n";

    if multilib {
        enable_multilib(&tuned)
    } else {
        tuned
    }
}

/// Uncomments the `[multilib]` section and its `Include`, appending the
/// section if the file has none. Nothing else is touched.
pub fn enable_multilib(pacman_conf: &str) -> String {
    let mut out = Vec::new();
    let mut found = false;
    let mut in_multilib = false;

    for line in pacman_conf.lines() {
        let bare = line.trim_start_matches('#').trim();

        if bare.starts_with('[') {
            in_multilib = bare == "[multilib]";
            if in_multilib {
                found = true;
                out.push(bare.to_string());
                continue;
            }
        }

        if in_multilib && bare.starts_with("Include") {
            out.push(bare.to_string());
        } else {
            out.push(line.to_string());
        }
    }

    if !found {
        out.push(String::new());
        out.push("[multilib]".to_string());
        out.push("Include = /etc/pacman.d/mirrorlist".to_string());
    }

    out.join("\n") + "\n"
}

// ── Initramfs ─────────────────────────────────────────────────────────────────

/// mkinitcpio hooks for an encrypted LVM root. The proprietary NVIDIA driver
/// does not work with early KMS, so `kms` is dropped when it is present.
pub fn initramfs_hooks(swap: SwapStrategy, hw: &HardwareProfile) -> Vec<&'static str> {
    let mut hooks = vec![
        "base",
        "udev",
        "autodetect",
        "microcode",
        "modconf",
        "kms",
        "keyboard",
        "keymap",
        "consolefont",
        "block",
        "encrypt",
        "lvm2",
    ];
    if hw.has_gpu(GpuVendor::Nvidia) {
        hooks.retain(|h| *h != "kms");
    }
    if swap.is_hibernate() {
        hooks.push("resume");
    }
    hooks.extend(["filesystems", "fsck"]);
    hooks
}

/// `encrypt` must unlock the device before `lvm2` scans it, and `resume`
/// needs the swap volume from `lvm2` before `filesystems` mounts root.
pub fn validate_hook_order(hooks: &[&str]) -> Result<()> {
    let pos = |name: &str| hooks.iter().position(|h| *h == name);
    let before = |a: &str, b: &str| -> Result<()> {
        match (pos(a), pos(b)) {
            (Some(x), Some(y)) if x < y => Ok(()),
            (Some(_), Some(_)) => Err(InstallerError::HookOrder(format!("'{}' must precede '{}'", a, b))),
            _ => Err(InstallerError::HookOrder(format!("'{}' and '{}' are both required", a, b))),
        }
    };

    before("encrypt", "lvm2")?;
    before("lvm2", "filesystems")?;
    if pos("resume").is_some() {
        before("lvm2", "resume")?;
        before("resume", "filesystems")?;
    }
    Ok(())
}

/// Replaces the active `HOOKS=` line, or appends one if there is none.
pub fn set_hooks(mkinitcpio_conf: &str, hooks: &[&str]) -> String {
    let line = format!("HOOKS=({})", hooks.join(" "));
    let mut replaced = false;
    let mut out: Vec<String> = mkinitcpio_conf
        .lines()
        .map(|l| {
            if l.trim_start().starts_with("HOOKS=") {
                replaced = true;
                line.clone()
            } else {
                l.to_string()
            }
        })
        .collect();
    if !replaced {
        out.push(line);
    }
    out.join("\n") + "\n"
}

// ── Boot loader ───────────────────────────────────────────────────────────────

pub fn loader_conf() -> String {
    "default arch.conf\ntimeout 3\nconsole-mode max\neditor no\n".to_string()
}

pub fn kernel_cmdline(config: &InstallConfig, hw: &HardwareProfile, luks_uuid: &str) -> String {
    let mut opts = vec![
        format!("cryptdevice=UUID={}:{}", luks_uuid, LUKS_MAPPING),
        format!("root={}", config.root_volume().display()),
        "rw".to_string(),
    ];
    if let Some(swap) = config.swap_volume() {
        opts.push(format!("resume={}", swap.display()));
    }
    if hw.has_gpu(GpuVendor::Nvidia) {
        opts.push("nvidia_drm.modeset=1".to_string());
    }
    opts.push("quiet".to_string());
    opts.join(" ")
}

pub fn boot_entry(kernel: KernelVariant, cmdline: &str, fallback: bool) -> String {
    let title = if fallback {
        "Arch Linux (fallback initramfs)"
    } else {
        "Arch Linux"
    };
    format!(
        "title   {}\nlinux   {}\ninitrd  {}\noptions {}\n",
        title,
        kernel.image(),
        kernel.initramfs(fallback),
        cmdline
    )
}

// ── Swap and sysctl ───────────────────────────────────────────────────────────

pub fn zram_generator_conf() -> String {
    "[zram0]\nzram-size = min(ram / 2, 8192)\ncompression-algorithm = zstd\n".to_string()
}

pub fn sysctl_conf(swap: SwapStrategy) -> String {
    match swap {
        // zram is cheap to swap to; favour it over dropping page cache.
        SwapStrategy::Zram => "vm.swappiness = 180\n\
                               vm.watermark_boost_factor = 0\n\
                               vm.watermark_scale_factor = 125\n\
                               vm.page-cluster = 0\n"
            .to_string(),
        SwapStrategy::Hibernate => "vm.swappiness = 10\nvm.vfs_cache_pressure = 50\n".to_string(),
    }
}

// ── Fstab ─────────────────────────────────────────────────────────────────────

/// Tightens world-readable vfat masks left by genfstab. Returns `None` when
/// there is nothing to change.
pub fn tighten_fstab(fstab: &str) -> Option<String> {
    if !fstab.contains("fmask=0022") && !fstab.contains("dmask=0022") {
        return None;
    }
    Some(fstab.replace("fmask=0022", "fmask=0077").replace("dmask=0022", "dmask=0077"))
}

// ── Sudo ──────────────────────────────────────────────────────────────────────

pub fn wheel_sudoers() -> String {
    "%wheel ALL=(ALL:ALL) ALL\n".to_string()
}

/// Passwordless grant for the AUR bootstrap; removed when it finishes.
pub fn temporary_sudoers(username: &str) -> String {
    format!("{} ALL=(ALL) NOPASSWD: ALL\n", username)
}

// ── Desktop environment ───────────────────────────────────────────────────────

pub fn desktop_environment_vars(desktop: Desktop) -> &'static [(&'static str, &'static str)] {
    match desktop {
        Desktop::Plasma => &[("QT_QPA_PLATFORM", "wayland;xcb")],
        Desktop::Gnome => &[("MOZ_ENABLE_WAYLAND", "1")],
        Desktop::Xfce => &[("QT_QPA_PLATFORMTHEME", "gtk2")],
    }
}

/// Appends each `KEY=value` whose key is not yet assigned.
pub fn merge_environment(existing: &str, vars: &[(&str, &str)]) -> Option<String> {
    let assigned = |key: &str| {
        existing
            .lines()
            .any(|l| l.trim_start().split('=').next().map(str::trim) == Some(key))
    };

    let missing: Vec<String> = vars
        .iter()
        .filter(|(k, _)| !assigned(k))
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    if missing.is_empty() {
        return None;
    }

    let mut out = existing.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    for line in missing {
        out.push_str(&line);
        out.push('\n');
    }
    Some(out)
}

/// Per-desktop files seeded into `/etc/skel`, as (path relative to the home
/// directory, contents).
pub fn desktop_skeleton(desktop: Desktop) -> Vec<(&'static str, &'static str)> {
    match desktop {
        Desktop::Plasma => vec![
            (".config/kwinrc", "[Compositing]\nLatencyPolicy=Low\n\n[Wayland]\nInputMethod[$e]=\n"),
            (".config/kdeglobals", "[KDE]\nSingleClick=false\n"),
        ],
        Desktop::Gnome => vec![(
            ".config/gtk-3.0/settings.ini",
            "[Settings]\ngtk-application-prefer-dark-theme=1\n",
        )],
        Desktop::Xfce => vec![
            (
                ".config/gtk-3.0/settings.ini",
                "[Settings]\ngtk-application-prefer-dark-theme=1\n",
            ),
            (".config/xfce4/terminal/terminalrc", "[Configuration]\nMiscDefaultGeometry=120x36\n"),
        ],
    }
}
