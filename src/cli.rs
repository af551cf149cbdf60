//! Command-line flags. Everything install-specific is asked interactively;
//! the flags only cover run mode and the locale policy.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Localization;

#[derive(Debug, Parser)]
#[command(
    name = "arch-installer",
    version,
    about = "Interactive Arch Linux installer (LUKS2 + LVM, systemd-boot)"
)]
pub struct Cli {
    /// Print every command and file write instead of performing it
    #[arg(long)]
    pub dry_run: bool,

    /// Timezone linked to /etc/localtime
    #[arg(long, default_value = "UTC")]
    pub timezone: String,

    /// Locale enabled in locale.gen and written to locale.conf
    #[arg(long, default_value = "en_US.UTF-8")]
    pub locale: String,

    /// Console keymap written to vconsole.conf
    #[arg(long, default_value = "us")]
    pub keymap: String,

    /// Where the new system is mounted
    #[arg(long, default_value = "/mnt")]
    pub mount_point: PathBuf,

    /// Log destination (RUST_LOG overrides the level)
    #[arg(long, default_value = "/tmp/arch-installer.log")]
    pub log_file: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn localization(&self) -> Localization {
        Localization {
            timezone: self.timezone.clone(),
            locale: self.locale.clone(),
            keymap: self.keymap.clone(),
        }
    }
}
