use std::collections::HashMap;

use crate::cmd::{Cmd, CommandRunner};

// ── Data types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub name: String,  // nvme0n1
    pub size: String,  // 476.9G
    pub model: String, // Samsung SSD 980 PRO
}

impl BlockDevice {
    /// One-line row of the disk table shown before the disk prompt.
    pub fn display(&self) -> String {
        format!("{:<12}  {:>8}   {}", self.name, self.size, self.model)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// All whole disks visible to the system. Empty if `lsblk` fails.
pub fn list_disks<R: CommandRunner + ?Sized>(runner: &mut R) -> Vec<BlockDevice> {
    let output = match runner.run_capture(
        &Cmd::new("lsblk").args(["--pairs", "--output", "NAME,SIZE,TYPE,MODEL", "--nodeps"]),
    ) {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!(error = %e, "could not list disks");
            return vec![];
        }
    };
    parse_disks(&output)
}

pub fn parse_disks(output: &str) -> Vec<BlockDevice> {
    output
        .lines()
        .filter_map(|line| {
            let m = parse_pairs(line);
            if m.get("TYPE").map(String::as_str) != Some("disk") {
                return None;
            }
            let name = m.get("NAME").cloned().filter(|n| !n.is_empty())?;
            Some(BlockDevice {
                name,
                size: m.get("SIZE").cloned().unwrap_or_default(),
                model: m
                    .get("MODEL")
                    .cloned()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "-".to_string()),
            })
        })
        .collect()
}

// ── lsblk --pairs parser ──────────────────────────────────────────────────────
//
// Each line looks like:   NAME="sda" SIZE="20G" TYPE="disk" MODEL="QEMU HARDDISK"

fn parse_pairs(line: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].split_whitespace().last().unwrap_or("").to_string();
        rest = &rest[eq + 1..];

        let Some(quoted) = rest.strip_prefix('"') else { break };
        let Some(close) = quoted.find('"') else { break };
        let value = quoted[..close].to_string();
        rest = &quoted[close + 1..];

        if !key.is_empty() {
            map.insert(key, value);
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::Recorder;

    const SAMPLE: &str = r#"NAME="loop0" SIZE="795.5M" TYPE="loop" MODEL=""
NAME="sda" SIZE="28.7G" TYPE="disk" MODEL="Ultra Fit"
NAME="nvme0n1" SIZE="476.9G" TYPE="disk" MODEL="Samsung SSD 980 PRO 500GB"
NAME="sr0" SIZE="1024M" TYPE="rom" MODEL="DVD-RW"
"#;

    #[test]
    fn parses_only_disks() {
        let disks = parse_disks(SAMPLE);
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[1].name, "nvme0n1");
        assert_eq!(disks[1].model, "Samsung SSD 980 PRO 500GB");
        assert_eq!(disks[0].size, "28.7G");
    }

    #[test]
    fn empty_model_gets_placeholder() {
        let disks = parse_disks(r#"NAME="vda" SIZE="40G" TYPE="disk" MODEL="""#);
        assert_eq!(disks[0].model, "-");
    }

    #[test]
    fn lsblk_failure_yields_empty_list() {
        let mut runner = Recorder::new().failing("lsblk");
        assert!(list_disks(&mut runner).is_empty());

        let mut runner = Recorder::new().with_capture("lsblk", SAMPLE);
        assert_eq!(list_disks(&mut runner).len(), 2);
    }
}
