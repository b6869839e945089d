use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::habits::HabitView;
use crate::item::CheckIn;
use crate::journals::Journal;
use crate::streak::{self, WINDOW_DAYS};

const PROGRESS_CELLS: usize = 10;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, items))]
    pub fn print_checkins(&self, items: &[CheckIn], version: u64) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if items.is_empty() {
            writeln!(out, "No check-ins.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Time".to_string(),
            "Title".to_string(),
            "Done".to_string(),
            "Active".to_string(),
        ];

        let rows = items
            .iter()
            .map(|item| {
                let done = if item.completed {
                    self.paint("yes", "32")
                } else {
                    "no".to_string()
                };
                let active = if item.active {
                    "yes".to_string()
                } else {
                    self.paint("no", "90")
                };
                vec![
                    self.paint(&item.id.to_string(), "33"),
                    item.time.clone(),
                    item.title.clone(),
                    done,
                    active,
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        writeln!(out, "\n{} check-ins (v{version})", items.len())?;
        Ok(())
    }

    #[tracing::instrument(skip(self, views))]
    pub fn print_habits(&self, views: &[HabitView], today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if views.is_empty() {
            writeln!(out, "No habits yet.")?;
            return Ok(());
        }

        let labels = streak::day_labels(today);
        let mut headers = vec!["ID".to_string(), "Habit".to_string()];
        headers.extend(labels.iter().map(|label| label.to_string()));
        headers.extend([
            "Streak".to_string(),
            "Target".to_string(),
            "Progress".to_string(),
        ]);

        let rows = views
            .iter()
            .map(|view| {
                let mut row = vec![
                    self.paint(&view.habit.id.to_string(), "33"),
                    view.habit.name.clone(),
                ];
                row.extend(self.day_cells(&view.days));
                row.push(view.streak.to_string());
                row.push(view.habit.target.to_string());
                row.push(progress_bar(view.progress));
                row
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_streak(&self, days: &[bool; WINDOW_DAYS], today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = streak::day_labels(today)
            .iter()
            .map(|label| label.to_string())
            .collect();
        write_table(&mut out, headers, vec![self.day_cells(days)])?;
        writeln!(out, "\nstreak: {}", streak::streak(days))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, entries))]
    pub fn print_journals(&self, entries: &[Journal]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if entries.is_empty() {
            writeln!(out, "Journal is empty.")?;
            return Ok(());
        }

        for entry in entries {
            let stamp = entry
                .created_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(out, "{}  {}", self.paint(&stamp, "36"), entry.content)?;
        }
        Ok(())
    }

    pub fn notice(&self, message: &str) {
        eprintln!("{}", self.paint(message, "31"));
    }

    fn day_cells(&self, days: &[bool; WINDOW_DAYS]) -> Vec<String> {
        days.iter()
            .map(|done| {
                if *done {
                    self.paint("x", "32")
                } else {
                    ".".to_string()
                }
            })
            .collect()
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn progress_bar(progress: f64) -> String {
    let filled = (progress.clamp(0.0, 1.0) * PROGRESS_CELLS as f64).round() as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "#".repeat(filled),
        " ".repeat(PROGRESS_CELLS - filled),
        progress * 100.0
    )
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, &width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for &width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, &width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
