use std::io::IsTerminal;
use std::time::Duration;

use anstyle::{AnsiColor, Style};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() {
        return OutputStyle::Plain;
    }
    if std::io::stdout().is_terminal() {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

fn success_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::Green.into())).bold()
}

fn warning_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::Yellow.into())).bold()
}

fn colorize(style: Style, text: &str) -> String {
    format!("{style}{text}{style:#}")
}

pub fn print_line(message: &str) {
    println!("{message}");
}

pub fn print_success(message: &str) {
    match current_output_style() {
        OutputStyle::Plain => println!("{message}"),
        OutputStyle::Rich => println!("{}", colorize(success_style(), message)),
    }
}

pub fn print_warning(message: &str) {
    match current_output_style() {
        OutputStyle::Plain => eprintln!("Warning: {message}"),
        OutputStyle::Rich => {
            eprintln!("{} {message}", colorize(warning_style(), "Warning:"));
        }
    }
}

pub fn start_spinner(label: &str) -> ProgressBar {
    if current_output_style() == OutputStyle::Rich {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(label.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    } else {
        println!("{label}");
        ProgressBar::hidden()
    }
}

pub fn finish_spinner(spinner: &ProgressBar, message: &str) {
    if spinner.is_hidden() {
        println!("{message}");
    } else {
        spinner.finish_with_message(message.to_string());
    }
}
