//! ANSI color codes for `keystonectl`'s human-readable output.
//!
//! These are plain escape sequences, not a `anstream`/`anstyle` builder --
//! `anstream`'s wrapped `println!`/`eprintln!` (see `crate::{println,
//! eprintln}`) already strip them when the destination isn't a color
//! terminal, so the command modules can embed them unconditionally.

pub const RED: &str = "\u{1b}[31m";
pub const GREEN: &str = "\u{1b}[32m";
pub const YELLOW: &str = "\u{1b}[33m";
pub const BLUE: &str = "\u{1b}[34m";
pub const GRAY: &str = "\u{1b}[90m";
pub const BOLD: &str = "\u{1b}[1m";
pub const RESET: &str = "\u{1b}[0m";
