//! Colored output helpers for CLI
//!
//! Status lines and tables go to stdout through [`Output`]; errors go to
//! stderr. Logs are written to stderr by the subscriber, so piping a
//! command's stdout only captures results.

use crate::types::SearchResult;
use owo_colors::OwoColorize;
use std::io::{self, Write};

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a step message (for multi-step operations)
    pub fn step(&self, step_num: usize, total: usize, message: &str) {
        if self.colored {
            println!(
                "  {} {}",
                format!("[{}/{}]", step_num, total).dimmed(),
                message.bright_white()
            );
        } else {
            println!("  [{}/{}] {}", step_num, total, message);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    /// Print a subheader
    pub fn subheader(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.cyan().bold());
        } else {
            println!("\n  --- {} ---", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if self.colored {
            println!("    {} {}", "•".blue(), item);
        } else {
            println!("    - {}", item);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {}", message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    /// Print a model or tool result, unindented so it can be copied as-is
    pub fn result(&self, text: &str) {
        println!("{}", text);
    }

    /// Print a fragment of a streamed response without a newline
    pub fn fragment(&self, text: &str) {
        print!("{}", text);
        io::stdout().flush().ok();
    }

    /// Print a speaker label and block of text, as in a chat transcript
    pub fn turn(&self, speaker: &str, text: &str) {
        if self.colored {
            println!("{} {}", format!("{}:", speaker).bright_cyan().bold(), text);
        } else {
            println!("{}: {}", speaker, text);
        }
    }

    /// Print an input prompt and flush so it shows before reading stdin
    pub fn prompt(&self, label: &str) {
        if self.colored {
            print!("{} ", format!("{}>", label).bright_yellow().bold());
        } else {
            print!("{}> ", label);
        }
        io::stdout().flush().ok();
    }

    /// Print one retrieved passage with its rank and score
    pub fn search_hit(&self, rank: usize, hit: &SearchResult) {
        let source = hit.document.metadata.source.as_str();
        if self.colored {
            println!(
                "\n  {} {} {}",
                format!("#{}", rank).bright_white().bold(),
                format!("{:.4}", hit.score).green(),
                source.dimmed()
            );
        } else {
            println!("\n  #{} {:.4} {}", rank, hit.score, source);
        }
        for line in hit.document.content.lines() {
            println!("    {}", line);
        }
    }

    /// Print completion message
    pub fn complete(&self, message: &str) {
        if self.colored {
            println!("\n  {}", message.bright_green().bold());
        } else {
            println!("\n  [DONE] {}", message);
        }
    }

    /// Print a table header row
    pub fn table_header(&self, columns: &[&str]) {
        let header: String = columns
            .iter()
            .map(|c| format!("{:<15}", c))
            .collect::<Vec<_>>()
            .join(" ");
        if self.colored {
            println!("    {}", header.bright_white().bold());
            println!("    {}", "─".repeat(columns.len() * 16).dimmed());
        } else {
            println!("    {}", header);
            println!("    {}", "-".repeat(columns.len() * 16));
        }
    }

    /// Print a table row
    pub fn table_row(&self, values: &[&str]) {
        let row: String = values
            .iter()
            .map(|v| format!("{:<15}", v))
            .collect::<Vec<_>>()
            .join(" ");
        println!("    {}", row);
    }

    /// Print newline
    pub fn newline(&self) {
        println!();
    }
}
