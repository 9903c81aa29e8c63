//! Prints the transcript to a terminal, redrawing the streaming message in
//! place as it grows.

use std::io::{self, Write};

use crossterm::cursor::MoveToPreviousLine;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use omnichat_core::{Message, MessageId, TranscriptChange};

use crate::render::{Renderer, StyledLine};

/// Returns how many terminal rows `lines` take up once wrapped at `columns`.
///
/// Without a known width, every line is assumed to fit.
pub fn rows_for(lines: &[StyledLine], columns: Option<u16>) -> u16 {
    let columns = columns.filter(|c| *c > 0).map(usize::from);
    let rows: usize = lines
        .iter()
        .map(|line| match columns {
            Some(columns) => line.width().div_ceil(columns).max(1),
            None => 1,
        })
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

struct LiveBlock {
    id: MessageId,
    // Lines at the top of the message that were printed for good because
    // the message no longer fit on the screen.
    frozen: usize,
    // Rows taken up by the rest, which are redrawn on every update.
    rows: u16,
    // Nothing but the header has been drawn yet.
    waiting: bool,
}

/// A transcript view writing to a terminal.
///
/// Terminal messages are printed once. The streaming message is kept at the
/// bottom and redrawn on every update by moving the cursor back over the
/// rows it took up last time. The cursor cannot move above the top of the
/// screen, so once the message is taller than that, its top lines are left
/// in place and only the part that fits is redrawn.
pub struct LiveView<W> {
    out: W,
    renderer: Renderer,
    columns: Option<u16>,
    height: Option<u16>,
    live: Option<LiveBlock>,
}

impl<W: Write> LiveView<W> {
    /// Creates a view writing to `out`.
    pub fn new(out: W, renderer: Renderer) -> Self {
        Self {
            out,
            renderer,
            columns: None,
            height: None,
            live: None,
        }
    }

    /// Sets the terminal size as `(columns, rows)`, used to count wrapped
    /// rows and to bound the redrawn part of the streaming message.
    #[inline]
    pub fn set_size(&mut self, size: Option<(u16, u16)>) {
        self.columns = size.map(|(columns, _)| columns);
        self.height = size.map(|(_, rows)| rows);
    }

    /// Returns `true` while the streaming message has no text yet.
    #[inline]
    pub fn is_waiting(&self) -> bool {
        self.live.as_ref().is_some_and(|block| block.waiting)
    }

    /// Returns the underlying writer.
    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Reflects a transcript mutation on the terminal.
    pub fn apply(&mut self, change: &TranscriptChange) -> io::Result<()> {
        match change {
            TranscriptChange::Appended(msg) => {
                self.live = None;
                self.draw(msg, 0)
            }
            TranscriptChange::Updated(msg) => {
                let frozen = match self.live.take() {
                    Some(block) if block.id == msg.id() => {
                        if block.rows > 0 {
                            queue!(self.out, MoveToPreviousLine(block.rows))?;
                        }
                        queue!(self.out, Clear(ClearType::FromCursorDown))?;
                        block.frozen
                    }
                    Some(block) => {
                        trace!("update of {} while {} is live", msg.id(), block.id);
                        if msg.is_streaming() {
                            self.live = Some(block);
                            return Ok(());
                        }
                        0
                    }
                    None if msg.is_streaming() => return Ok(()),
                    None => 0,
                };
                self.draw(msg, frozen)
            }
            TranscriptChange::Reset(msgs) => {
                self.live = None;
                writeln!(self.out)?;
                for msg in msgs {
                    self.draw(msg, 0)?;
                }
                Ok(())
            }
        }
    }

    /// Prints a line of program output, outside of the transcript.
    pub fn print_info(&mut self, text: &str) -> io::Result<()> {
        for line in text.lines() {
            writeln!(self.out, "{line}")?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    // Prints `msg` without its first `frozen` lines, which are already on
    // the screen.
    fn draw(&mut self, msg: &Message, frozen: usize) -> io::Result<()> {
        let lines = self.renderer.lines(msg);
        let mut frozen = frozen.min(lines.len());
        for line in &lines[frozen..] {
            writeln!(self.out, "{}", line.paint(self.renderer.color()))?;
        }
        if msg.is_streaming() {
            // One row is left for the cursor below the message.
            let max_rows =
                self.height.map(|height| height.saturating_sub(1).max(1));
            let mut rows = rows_for(&lines[frozen..], self.columns);
            if let Some(max_rows) = max_rows {
                while rows > max_rows && frozen < lines.len() {
                    frozen += 1;
                    rows = rows_for(&lines[frozen..], self.columns);
                }
            }
            self.live = Some(LiveBlock {
                id: msg.id(),
                frozen,
                rows,
                waiting: msg.text().is_empty(),
            });
        } else {
            writeln!(self.out)?;
        }
        self.out.flush()
    }
}
