//! Terminal styling for command output.

use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::{OwoColorize, Style};

static NO_COLOR: AtomicBool = AtomicBool::new(false);

pub fn set_no_color(value: bool) {
    NO_COLOR.store(value, Ordering::SeqCst);
}

fn no_color() -> bool {
    NO_COLOR.load(Ordering::SeqCst)
}

/// Semantic roles output can be painted in.
#[derive(Debug, Clone, Copy)]
pub enum Role {
    Ok,
    Fault,
    Muted,
    Header,
    Code,
}

impl Role {
    fn style(self) -> Style {
        match self {
            Role::Ok => Style::new().green().bold(),
            Role::Fault => Style::new().red().bold(),
            Role::Muted => Style::new().dimmed(),
            Role::Header => Style::new().bold(),
            Role::Code => Style::new().blue(),
        }
    }
}

pub trait Paint {
    fn paint(&self, role: Role) -> String;
}

impl<T: std::fmt::Display> Paint for T {
    fn paint(&self, role: Role) -> String {
        if no_color() {
            self.to_string()
        } else {
            self.style(role.style()).to_string()
        }
    }
}

pub fn print_ok(msg: &str) {
    println!("{} {msg}", "✓".paint(Role::Ok));
}

pub fn print_header(title: &str) {
    println!("{}", title.paint(Role::Header));
}

pub fn print_labeled(key: &str, value: &str) {
    println!("  {}: {value}", key.paint(Role::Muted));
}
