//! Interactive Arch Linux installer: LUKS2 + LVM on a single disk,
//! systemd-boot, hardware-aware package selection.
//!
//! The binary collects answers, then hands an immutable [`config::InstallConfig`]
//! to [`steps::execute`]. Every external effect goes through
//! [`cmd::CommandRunner`], so the execute phase also runs against
//! [`recorder::Recorder`] in tests.

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod hardware;
pub mod lsblk;
pub mod packages;
pub mod recorder;
pub mod render;
pub mod script;
pub mod steps;
pub mod ui;
