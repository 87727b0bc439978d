use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::notify::{Notice, NoticeKind, Notifier};
use crate::stats::{AreaProgress, Stats};
use crate::task::{Priority, Task, format_deadline};

const BAR_WIDTH: usize = 20;

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

    #[tracing::instrument(skip(self, tasks, today))]
    pub fn print_task_table(&mut self, tasks: &[Task], today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if tasks.is_empty() {
            writeln!(out, "No tasks found")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Area".to_string(),
            "Description".to_string(),
            "Status".to_string(),
            "Deadline".to_string(),
            "Pri".to_string(),
            "Done".to_string(),
            "Comments".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let deadline = format_deadline(task.deadline);
            let deadline = if task.is_overdue(today) {
                self.paint(&deadline, "31")
            } else {
                deadline
            };

            let priority = match task.priority {
                Priority::High => self.paint("high", "31"),
                Priority::Medium => self.paint("medium", "33"),
                Priority::Low => "low".to_string(),
            };

            let done = if task.completed {
                self.paint("x", "32")
            } else {
                String::new()
            };
            let comments = if task.comments.is_empty() {
                String::new()
            } else {
                format!("{} comment(s)", task.comments.len())
            };

            rows.push(vec![
                self.paint(&task.id, "33"),
                task.area.clone(),
                task.description.clone(),
                task.status.clone(),
                deadline,
                priority,
                done,
                comments,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "area        {}", task.area)?;
        writeln!(out, "description {}", task.description)?;
        writeln!(out, "status      {}", task.status)?;
        writeln!(out, "deadline    {}", format_deadline(task.deadline))?;
        writeln!(out, "priority    {}", task.priority)?;
        writeln!(out, "completed   {}", if task.completed { "yes" } else { "no" })?;
        if !task.notes.is_empty() {
            writeln!(out, "notes       {}", task.notes)?;
        }

        if task.comments.is_empty() {
            writeln!(out, "comments    none")?;
        } else {
            writeln!(out, "comments")?;
            for comment in &task.comments {
                writeln!(
                    out,
                    "  {}  {}",
                    comment.timestamp.format("%Y-%m-%d %H:%M"),
                    comment.text
                )?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_stats(&mut self, stats: &Stats, progress: &[AreaProgress]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "total     {}", stats.total)?;
        writeln!(out, "completed {}", self.paint(&stats.completed.to_string(), "32"))?;
        writeln!(out, "pending   {}", stats.pending)?;
        let overdue = stats.overdue.to_string();
        let overdue = if stats.overdue > 0 {
            self.paint(&overdue, "31")
        } else {
            overdue
        };
        writeln!(out, "overdue   {overdue}")?;
        writeln!(out)?;

        let label_width = progress
            .iter()
            .map(|p| UnicodeWidthStr::width(p.label.as_str()))
            .max()
            .unwrap_or(0);
        for p in progress {
            let filled = (p.percent as usize * BAR_WIDTH) / 100;
            let bar = format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled));
            let pad = label_width.saturating_sub(UnicodeWidthStr::width(p.label.as_str()));
            writeln!(
                out,
                "{}{} [{}] {:>3}%  ({}/{})",
                p.label,
                " ".repeat(pad),
                self.paint(&bar, "32"),
                p.percent,
                p.completed,
                p.total
            )?;
        }

        Ok(())
    }

    pub fn print_lines(&mut self, lines: &[String]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for line in lines {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Prints notices to stderr, one line each.
#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    color: bool,
}

impl ConsoleNotifier {
    pub fn new(cfg: &Config) -> Self {
        let color = cfg.get_bool("color").unwrap_or(true) && io::stderr().is_terminal();
        Self { color }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        let (tag, code) = match notice.kind {
            NoticeKind::Info => ("..", "36"),
            NoticeKind::Success => ("ok", "32"),
            NoticeKind::Failure => ("!!", "31"),
            NoticeKind::Busy => ("~~", "33"),
        };
        let tag = if self.color {
            format!("\x1b[{code}m{tag}\x1b[0m")
        } else {
            tag.to_string()
        };
        eprintln!("{tag} {}", notice.message);
    }
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
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
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
