use std::io::{self, Write};

use finder_core::{AppViewModel, RecordRow};

const NAME_WIDTH: usize = 32;
const FOLLOWERS_WIDTH: usize = 10;
const OWNER_WIDTH: usize = 20;
const EMAIL_WIDTH: usize = 28;
const DESCRIPTION_WIDTH: usize = 40;

/// Draws status changes and an in-place progress line on a terminal stream.
pub struct ProgressRenderer<W: Write> {
    out: W,
    last_status: Option<String>,
    progress_shown: bool,
}

impl<W: Write> ProgressRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_status: None,
            progress_shown: false,
        }
    }

    pub fn render(&mut self, view: &AppViewModel) -> io::Result<()> {
        if view.status != self.last_status {
            self.end_progress()?;
            if let Some(status) = &view.status {
                writeln!(self.out, "{status}")?;
            }
            if let Some(total) = &view.total {
                writeln!(self.out, "{}", total.label())?;
            }
            self.last_status = view.status.clone();
        }
        if view.session.is_active() {
            write!(self.out, "\r{}", progress_line(view))?;
            self.progress_shown = true;
        }
        self.out.flush()
    }

    /// Terminates the progress line so later output starts on a fresh line.
    pub fn end_progress(&mut self) -> io::Result<()> {
        if self.progress_shown {
            writeln!(self.out)?;
            self.progress_shown = false;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

pub fn progress_line(view: &AppViewModel) -> String {
    match (view.total, view.progress_fraction()) {
        (Some(total), Some(fraction)) => format!(
            "Processed {} of ~{} playlists (estimate, {:.0}%) | {} in table",
            view.processed,
            total.count,
            fraction * 100.0,
            view.rows.len()
        ),
        _ => format!(
            "Processed {} playlists | {} in table",
            view.processed,
            view.rows.len()
        ),
    }
}

pub fn results_table(rows: &[RecordRow]) -> String {
    let mut table = String::new();
    push_line(
        &mut table,
        ["Name", "Followers", "Owner", "Owner Email", "Description", "Link"],
    );
    for row in rows {
        let followers = row.followers.to_string();
        push_line(
            &mut table,
            [
                row.name.as_str(),
                followers.as_str(),
                row.owner.as_str(),
                row.owner_email.as_str(),
                row.description.as_str(),
                row.link.as_str(),
            ],
        );
    }
    table
}

fn push_line(table: &mut String, [name, followers, owner, email, description, link]: [&str; 6]) {
    let line = format!(
        "{:<nw$}  {:>fw$}  {:<ow$}  {:<ew$}  {:<dw$}  {}",
        fit(name, NAME_WIDTH),
        fit(followers, FOLLOWERS_WIDTH),
        fit(owner, OWNER_WIDTH),
        fit(email, EMAIL_WIDTH),
        fit(description, DESCRIPTION_WIDTH),
        link,
        nw = NAME_WIDTH,
        fw = FOLLOWERS_WIDTH,
        ow = OWNER_WIDTH,
        ew = EMAIL_WIDTH,
        dw = DESCRIPTION_WIDTH,
    );
    table.push_str(line.trim_end());
    table.push('\n');
}

/// Flattens whitespace and cuts `text` to `width` characters.
fn fit(text: &str, width: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= width {
        return flat;
    }
    let mut cut: String = flat.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
