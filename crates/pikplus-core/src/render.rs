use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::Local;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::pagination::{PageItem, PaginationVariant, format_page_items};
use crate::record::{LocalShare, LocalTask, TaskRecord};
use crate::view::TaskView;

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

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_local_tasks(&mut self, tasks: &[LocalTask]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "No local tasks.")?;
            return Ok(());
        }

        let headers = ["ID", "Added", "Status", "Name", "Size", "Link"]
            .map(str::to_string)
            .to_vec();

        let rows = tasks
            .iter()
            .map(|task| {
                vec![
                    self.paint(&task.id.to_string(), "33"),
                    task.timestamp
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M")
                        .to_string(),
                    task.status.clone(),
                    task.name.clone().unwrap_or_default(),
                    task.file_size.map(format_size).unwrap_or_default(),
                    shorten(&task.url, 48),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, shares))]
    pub fn print_shares(&mut self, shares: &[LocalShare]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if shares.is_empty() {
            writeln!(out, "No shares.")?;
            return Ok(());
        }

        let headers = ["ID", "Created", "File", "Link", "Code"]
            .map(str::to_string)
            .to_vec();

        let rows = shares
            .iter()
            .map(|share| {
                vec![
                    self.paint(&share.id.to_string(), "33"),
                    share
                        .timestamp
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M")
                        .to_string(),
                    share.file_name.clone(),
                    share.share_url.clone(),
                    share.pass_code.clone().unwrap_or_default(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, view))]
    pub fn print_task_view(&mut self, view: &TaskView) -> anyhow::Result<()> {
        {
            let mut out = io::stdout().lock();
            if view.rows.is_empty() {
                writeln!(out, "No tasks.")?;
            } else {
                let headers = ["ID", "Mine", "Name", "Phase", "Progress", "Size"]
                    .map(str::to_string)
                    .to_vec();
                let rows = view.rows.iter().map(|task| self.task_row(task)).collect();
                write_table(&mut out, headers, rows)?;
            }

            if view.range.is_displayable() {
                writeln!(
                    out,
                    "\nShowing {}-{} of {}",
                    view.range.start, view.range.end, view.range.total
                )?;
            }
        }

        match view.variant {
            PaginationVariant::Full => {
                self.print_page_strip(&view.pages, view.pagination.current_page)
            }
            PaginationVariant::Compact => {
                let mut out = io::stdout().lock();
                writeln!(
                    out,
                    "Page {} of {}",
                    view.pagination.current_page,
                    view.pagination.total_pages.max(1)
                )?;
                Ok(())
            }
        }
    }

    pub fn print_page_strip(&mut self, items: &[PageItem], current: u32) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", format_page_items(items, current))?;
        Ok(())
    }

    fn task_row(&self, task: &TaskRecord) -> Vec<String> {
        let mine = if task.is_local {
            self.paint("*", "32")
        } else {
            String::new()
        };
        let phase = task
            .phase
            .as_ref()
            .map(|phase| phase.label().to_string())
            .unwrap_or_default();
        let progress = task
            .progress
            .map(|pct| format!("{pct}%"))
            .unwrap_or_default();

        vec![
            self.paint(&task.id.to_string(), "33"),
            mine,
            task.display_name(),
            phase,
            progress,
            task.size.map(format_size).unwrap_or_default(),
        ]
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{head}…")
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

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aligns_wide_characters() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".to_string(), "Name".to_string()],
            vec![
                vec!["1".to_string(), "电影".to_string()],
                vec!["\x1b[33m22\x1b[0m".to_string(), "ab".to_string()],
            ],
        )
        .unwrap();

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID Name ");
        assert_eq!(lines[1], "-- ---- ");
        assert_eq!(lines[2], "1  电影 ");
        assert_eq!(lines[3], "\x1b[33m22\x1b[0m ab   ");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn long_links_are_shortened() {
        assert_eq!(shorten("abcdef", 4), "abc…");
        assert_eq!(shorten("abc", 4), "abc");
    }
}
