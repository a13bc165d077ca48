use std::io::{BufRead, Write};

use anyhow::Result;

use crate::index::{Entry, EntryState, RadioIndex, Station};
use crate::markup::line_column;
use crate::scanner::{CommentScan, find_all_commented_entries, find_commented_entries};

const COMMENTED_ONLY: &str = "u";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuOutcome {
    /// Nothing to write; the reason has already been printed.
    Exit,
    /// SoundNames to toggle, in document order.
    Toggle(Vec<String>),
}

/// Drives the station, playlist and entry prompts over `input` and `out`.
pub struct Menu<'a, R, W> {
    raw: &'a str,
    index: &'a RadioIndex,
    input: R,
    out: W,
}

impl<'a, R: BufRead, W: Write> Menu<'a, R, W> {
    pub fn new(raw: &'a str, index: &'a RadioIndex, input: R, out: W) -> Self {
        Self {
            raw,
            index,
            input,
            out,
        }
    }

    pub fn run(mut self) -> Result<MenuOutcome> {
        let index = self.index;
        let stations = index.stations();
        writeln!(self.out, "Select a radio station:")?;
        for (idx, station) in stations.iter().enumerate() {
            writeln!(self.out, "{}) {}", idx + 1, station.label())?;
        }
        writeln!(self.out, "\nU) [Commented Entries Only]")?;

        let choice = self.ask("Choice: ")?;
        if choice == COMMENTED_ONLY {
            let scan = find_all_commented_entries(self.raw, index);
            self.print_commented(&scan, "All currently commented tracks:")?;
            return Ok(MenuOutcome::Exit);
        }
        let Some(station) = pick_index(&choice, stations.len()).map(|idx| &stations[idx]) else {
            writeln!(self.out, "Invalid choice, exiting.")?;
            return Ok(MenuOutcome::Exit);
        };

        let playlists = station.playlist_types();
        writeln!(self.out, "\nAvailable playlists for this station:")?;
        for (idx, kind) in playlists.iter().enumerate() {
            writeln!(self.out, "{}) {kind}", idx + 1)?;
        }
        writeln!(self.out, "{}) All playlists", playlists.len() + 1)?;
        writeln!(self.out, "U) Show commented entries for this station only")?;

        let choice = self.ask("Choice (number): ")?;
        if choice == COMMENTED_ONLY {
            let scan = find_commented_entries(self.raw, station, &playlists);
            let heading = format!("Commented entries in {}:", station.name);
            self.print_commented(&scan, &heading)?;
            return Ok(MenuOutcome::Exit);
        }
        let selected = match pick_index(&choice, playlists.len() + 1) {
            Some(idx) if idx < playlists.len() => vec![playlists[idx]],
            Some(_) => playlists.clone(),
            None => {
                writeln!(self.out, "Invalid choice, exiting.")?;
                return Ok(MenuOutcome::Exit);
            }
        };

        self.choose_entries(station, &selected)
    }

    fn choose_entries(&mut self, station: &Station, selected: &[&str]) -> Result<MenuOutcome> {
        let scan = find_commented_entries(self.raw, station, selected);
        self.print_skipped(&scan)?;
        let mut rows = station.live_entries(selected);
        rows.extend(scan.entries);
        if rows.is_empty() {
            writeln!(self.out, "No entries found.")?;
            return Ok(MenuOutcome::Exit);
        }

        writeln!(
            self.out,
            "\nEntries in {} {}:",
            station.name,
            selected.join(" & ")
        )?;
        let mut in_commented = false;
        for (idx, entry) in rows.iter().enumerate() {
            let tag = match entry.state {
                EntryState::Live => entry.playlist.as_str(),
                EntryState::Commented => {
                    if !in_commented {
                        writeln!(self.out)?;
                        in_commented = true;
                    }
                    "commented"
                }
            };
            writeln!(self.out, "{}. ({tag}) {}", idx + 1, entry.display_name())?;
        }

        let picks =
            self.ask("\nEnter numbers to toggle, separated by spaces (blank to cancel): ")?;
        if picks.is_empty() {
            writeln!(self.out, "No changes made.")?;
            return Ok(MenuOutcome::Exit);
        }
        let Ok(numbers) = picks
            .split_whitespace()
            .map(str::parse::<usize>)
            .collect::<Result<Vec<_>, _>>()
        else {
            writeln!(self.out, "Invalid input.")?;
            return Ok(MenuOutcome::Exit);
        };

        let mut chosen: Vec<&Entry> = Vec::new();
        for number in numbers {
            match number.checked_sub(1).and_then(|idx| rows.get(idx)) {
                Some(entry) => chosen.push(entry),
                None => writeln!(self.out, "Index {number} out of range; skipping.")?,
            }
        }
        chosen.sort_by_key(|entry| entry.span.start);
        chosen.dedup_by_key(|entry| entry.span.start);
        if chosen.is_empty() {
            writeln!(self.out, "No changes made.")?;
            return Ok(MenuOutcome::Exit);
        }

        Ok(MenuOutcome::Toggle(
            chosen
                .into_iter()
                .map(|entry| entry.sound_name().unwrap_or_default().to_string())
                .collect(),
        ))
    }

    fn print_commented(&mut self, scan: &CommentScan, heading: &str) -> Result<()> {
        self.print_skipped(scan)?;
        if scan.entries.is_empty() {
            writeln!(self.out, "No commented entries found.")?;
            return Ok(());
        }
        writeln!(self.out, "\n{heading}")?;
        for (idx, entry) in scan.entries.iter().enumerate() {
            writeln!(self.out, "{}. (commented) {}", idx + 1, entry.display_name())?;
        }
        Ok(())
    }

    fn print_skipped(&mut self, scan: &CommentScan) -> Result<()> {
        for fragment in &scan.skipped {
            let (line, _) = line_column(self.raw, fragment.offset);
            writeln!(
                self.out,
                "skipping commented entry in {} / {} at line {line}: {}",
                fragment.station, fragment.playlist, fragment.reason
            )?;
        }
        Ok(())
    }

    /// Prints `prompt` and reads one trimmed, lowercased line; EOF reads as blank.
    fn ask(&mut self, prompt: &str) -> Result<String> {
        write!(self.out, "{prompt}")?;
        self.out.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim().to_lowercase())
    }
}

/// Maps a 1-based answer onto `0..len`.
fn pick_index(answer: &str, len: usize) -> Option<usize> {
    let number = answer.parse::<usize>().ok()?;
    (1..=len).contains(&number).then(|| number - 1)
}
