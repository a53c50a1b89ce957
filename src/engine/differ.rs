//! Diff and plan display - devbox-specific UI

use colored::Colorize;
use converge::{Action, Changes, StateDiff};
use std::fmt::Display;

/// Display a diff in a user-friendly format
pub fn display_diff(diff: &StateDiff) {
    if diff.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Machine Diff".bold()
    );
    println!("│");

    display_changes("Mounts", &diff.mounts);
    display_changes("Sites", &diff.sites);
    display_changes("Databases", &diff.databases);

    if !diff.start_databases.is_empty() {
        println!("│ {}", "Stopped databases".bold());
        for database in &diff.start_databases {
            println!("│   {} {:<30} {}", "~".yellow(), database.to_string(), "→ start".dimmed());
        }
        println!("│");
    }

    if let Some(php) = &diff.php {
        println!("│ {}", "PHP".bold());
        println!("│   {} {:<30} {}", "~".yellow(), "version", format!("→ {php}").dimmed());
        println!("│");
    }

    let summary = diff.summary();
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to add, {} to remove, {} to change)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.removals.to_string().red(),
        summary.modifications.to_string().yellow()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn display_changes<T: Display>(title: &str, changes: &Changes<T>) {
    if changes.is_empty() {
        return;
    }
    println!("│ {}", title.bold());
    for item in &changes.remove {
        println!("│   {} {}", "-".red(), item);
    }
    for item in &changes.add {
        println!("│   {} {}", "+".green(), item);
    }
    println!("│");
}

/// Display the commands a plan will run
pub fn display_actions(binary: &str, actions: &[Action]) {
    if actions.is_empty() {
        return;
    }
    println!();
    println!("  {} {} commands:", "→".cyan(), actions.len());
    for action in actions {
        println!("    {}", format!("{binary} {action}").dimmed());
    }
}
