//! Typed chroot script.
//!
//! The chroot stage is a list of argument vectors rather than a text
//! template; every argument is single-quoted on render so values from the
//! prompts can never be interpreted by the shell.

use std::path::PathBuf;

use crate::{
    config::InstallConfig,
    error::{InstallerError, Result},
    hardware::HardwareProfile,
    packages,
};

/// Where the script lives inside the target root while it runs.
pub const SCRIPT_PATH: &str = "/root/arch-installer-setup.sh";

/// Passwordless sudo drop-in used only while building the AUR helper.
pub const AUR_SUDOERS: &str = "/etc/sudoers.d/99-arch-installer-aur";

const AUR_HELPER_REPO: &str = "https://aur.archlinux.org/paru-bin.git";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Aborts the script on failure.
    Run(Vec<String>),
    /// Logs a warning on failure and carries on.
    BestEffort(Vec<String>),
    /// Runs as `user` from `dir`; aborts on failure.
    RunAs {
        user: String,
        dir: String,
        argv: Vec<String>,
    },
    /// Registered as an `EXIT` trap so it runs however the script ends.
    OnExit(Vec<String>),
}

impl Step {
    fn argv(&self) -> &[String] {
        match self {
            Step::Run(a) | Step::BestEffort(a) | Step::OnExit(a) => a,
            Step::RunAs { argv, .. } => argv,
        }
    }
}

fn argv<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Wraps `s` in single quotes, escaping embedded single quotes.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn join_quoted(argv: &[String]) -> String {
    argv.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChrootScript {
    steps: Vec<Step>,
}

impl ChrootScript {
    /// Builds the configuration script for the installed system.
    pub fn for_install(config: &InstallConfig, hw: &HardwareProfile) -> Self {
        let mut s = ChrootScript::default();
        let loc = &config.localization;
        let user = config.username.as_str();

        if config.aur_helper {
            s.push(Step::OnExit(argv(["rm", "-f", AUR_SUDOERS])));
        }

        s.push(Step::Run(vec![
            "ln".into(),
            "-sf".into(),
            format!("/usr/share/zoneinfo/{}", loc.timezone),
            "/etc/localtime".into(),
        ]));
        s.push(Step::Run(argv(["hwclock", "--systohc"])));
        s.push(Step::Run(argv(["locale-gen"])));
        s.push(Step::Run(argv(["useradd", "-m", "-G", "wheel", "-s", "/bin/bash", user])));

        s.push(Step::Run(argv(["bootctl", "install"])));
        s.push(Step::Run(argv(["mkinitcpio", "-P"])));

        for unit in ["NetworkManager", config.desktop.display_manager()] {
            s.push(Step::Run(argv(["systemctl", "enable", unit])));
        }
        let mut auxiliary = vec!["bluetooth", "systemd-timesyncd", "ufw", "docker", "fstrim.timer"];
        if hw.chassis.is_laptop() {
            auxiliary.push("power-profiles-daemon");
        }
        for unit in auxiliary {
            s.push(Step::BestEffort(argv(["systemctl", "enable", unit])));
        }
        s.push(Step::BestEffort(argv(["usermod", "-aG", "docker", user])));

        if config.aur_helper {
            let build_dir = format!("/home/{}/.cache/paru-bin", user);
            let home = format!("/home/{}", user);
            s.push(Step::RunAs {
                user: user.to_string(),
                dir: home.clone(),
                argv: vec!["git".into(), "clone".into(), AUR_HELPER_REPO.into(), build_dir.clone()],
            });
            s.push(Step::RunAs {
                user: user.to_string(),
                dir: build_dir.clone(),
                argv: argv(["makepkg", "-si", "--noconfirm"]),
            });
            let mut paru = argv(["paru", "-S", "--noconfirm", "--needed"]);
            paru.extend(packages::aur_packages(config).iter().map(|p| p.to_string()));
            s.push(Step::RunAs {
                user: user.to_string(),
                dir: home,
                argv: paru,
            });
            s.push(Step::Run(vec!["rm".into(), "-rf".into(), build_dir]));
        }

        s
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Rejects empty commands and NUL bytes, which no quoting can carry.
    pub fn validate(&self) -> Result<()> {
        for step in &self.steps {
            let argv = step.argv();
            if argv.is_empty() || argv[0].is_empty() {
                return Err(InstallerError::invalid_config("empty command in chroot script"));
            }
            let mut fields = argv.iter();
            let extra = match step {
                Step::RunAs { user, dir, .. } => vec![user, dir],
                _ => vec![],
            };
            if fields.any(|a| a.contains('\0')) || extra.iter().any(|a| a.contains('\0') || a.is_empty()) {
                return Err(InstallerError::invalid_config(format!(
                    "chroot script argument for '{}' is not representable",
                    argv[0]
                )));
            }
        }
        Ok(())
    }

    pub fn render(&self) -> Result<String> {
        self.validate()?;

        let mut out = String::from("#!/bin/bash\nset -euo pipefail\n\n");
        for step in &self.steps {
            let line = match step {
                Step::Run(a) => join_quoted(a),
                Step::BestEffort(a) => format!(
                    "{} || echo {} >&2",
                    join_quoted(a),
                    shell_quote(&format!("warning: '{}' failed, continuing", a.join(" ")))
                ),
                Step::RunAs { user, dir, argv } => format!(
                    "(cd {} && sudo -u {} {})",
                    shell_quote(dir),
                    shell_quote(user),
                    join_quoted(argv)
                ),
                Step::OnExit(a) => format!("trap {} EXIT", shell_quote(&join_quoted(a))),
            };
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    /// Path of the script inside the target root, e.g. `/mnt/root/...`.
    pub fn host_path(config: &InstallConfig) -> PathBuf {
        config.target(SCRIPT_PATH)
    }
}
