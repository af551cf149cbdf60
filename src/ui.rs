use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// ── Terminal helpers ──────────────────────────────────────────────────────────

fn term_width() -> usize {
    Term::stdout().size().1.max(60) as usize
}

fn rule() -> String {
    "─".repeat(term_width().min(56))
}

// ── Banner ────────────────────────────────────────────────────────────────────

pub fn print_banner() {
    let _ = Term::stdout().clear_screen();

    let logo = [
        r"      _             _       ",
        r"     / \   _ __ ___| |__    ",
        r"    / _ \ | '__/ __| '_ \   ",
        r"   / ___ \| | | (__| | | |  ",
        r"  /_/   \_\_|  \___|_| |_|  ",
    ];

    println!();
    for line in &logo {
        println!("{}", style(line).cyan().bold());
    }
    println!();
    println!(
        "{}",
        style(format!(
            "   Encrypted Installer  ·  LUKS2 + LVM  ·  v{}",
            env!("CARGO_PKG_VERSION")
        ))
        .dim()
        .italic()
    );
    println!();
    println!("{}", style(rule()).dim());
    println!();
}

// ── Step header ───────────────────────────────────────────────────────────────

/// Prints a numbered step header.
pub fn print_step(step: u8, total: u8, title: &str) {
    tracing::info!(step, total, title, "entering step");
    println!();
    let tag = style(format!(" {}/{} ", step, total)).black().on_cyan().bold();
    let heading = style(format!("  {}", title)).white().bold();
    println!("{}{}", tag, heading);
    println!("{}", style(rule()).dim());
}

// ── Feedback messages ─────────────────────────────────────────────────────────

pub fn print_success(msg: &str) {
    println!("  {}  {}", style("✓").green().bold(), style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("  {}  {}", style("→").blue().bold(), msg);
}

pub fn print_warning(msg: &str) {
    tracing::warn!("{}", msg);
    println!("  {}  {}", style("⚠").yellow().bold(), style(msg).yellow());
}

/// Written to stderr.
pub fn print_error(msg: &str) {
    eprintln!("  {}  {}", style("✗").red().bold(), style(msg).red());
}

/// What a dry run would have executed.
pub fn print_dry_run(what: &str) {
    println!("  {}  {}", style("$").magenta().bold(), style(what).dim());
}

// ── Info box ──────────────────────────────────────────────────────────────────

/// Renders a bordered key/value box.
///
/// ```text
/// ┌─ Installation Summary ──────────────────┐
/// │  Disk          /dev/nvme0n1
/// │  EFI           /dev/nvme0n1p1
/// └─────────────────────────────────────────┘
/// ```
pub fn print_kv_box(title: &str, rows: &[(&str, String)]) {
    const BOX_INNER: usize = 44;

    let dashes = "─".repeat(BOX_INNER.saturating_sub(title.chars().count() + 2));
    println!("  ┌─ {} {}┐", style(title).white().bold(), style(&dashes).dim());

    for (key, val) in rows {
        println!("  │  {:<14}{}", style(*key).dim(), style(val).white().bold());
    }

    println!("  └{}┘", style("─".repeat(BOX_INNER + 2)).dim());
}

// ── Spinner ───────────────────────────────────────────────────────────────────

/// Returns a running braille spinner; finish it with `done_spinner` or
/// `finish_and_clear`.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("  {spinner:.cyan.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn done_spinner(pb: ProgressBar, msg: &str) {
    pb.finish_and_clear();
    print_success(msg);
}
