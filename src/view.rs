//! Text renderings of tape and output shared by the front ends.

use std::fmt::Write as _;

use crate::tape::{ROW_WIDTH, Tape};

/// How memory cells are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CellFormat {
    #[default]
    Hex,
    Dec,
}

impl CellFormat {
    pub fn toggle(self) -> CellFormat {
        match self {
            CellFormat::Hex => CellFormat::Dec,
            CellFormat::Dec => CellFormat::Hex,
        }
    }

    /// Cell value padded to a fixed width (2 for hex, 3 for decimal).
    pub fn cell(self, value: u8) -> String {
        match self {
            CellFormat::Hex => format!("{value:02X}"),
            CellFormat::Dec => format!("{value:>3}"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CellFormat::Hex => "hex",
            CellFormat::Dec => "dec",
        }
    }
}

/// Number of grid rows on a tape.
pub fn row_count(tape: &Tape) -> usize {
    tape.capacity().div_ceil(ROW_WIDTH)
}

/// Row that holds the data pointer.
pub fn pointer_row(tape: &Tape) -> usize {
    tape.pointer() / ROW_WIDTH
}

/// One grid row: a 4-digit hex base address, then the cells. The cell under
/// the data pointer is wrapped in brackets, others are padded with spaces.
pub fn grid_row(tape: &Tape, row: usize, format: CellFormat) -> String {
    let base = row * ROW_WIDTH;
    let mut line = format!("{base:04X}:");
    for (i, &value) in tape.window(base, ROW_WIDTH).iter().enumerate() {
        if base + i == tape.pointer() {
            let _ = write!(line, "[{}]", format.cell(value));
        } else {
            let _ = write!(line, " {} ", format.cell(value));
        }
    }
    line
}

/// Rows from 0 up to the one holding the highest touched cell.
pub fn touched_rows(tape: &Tape, format: CellFormat) -> Vec<String> {
    let last = tape.high_water_mark() / ROW_WIDTH;
    (0..=last).map(|row| grid_row(tape, row, format)).collect()
}

/// Program output as printable text, with control bytes escaped as `\xNN`.
pub fn bytes_to_escaped(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            0x20..=0x7E => out.push(b as char),
            b'\n' => out.push('\n'),
            b'\t' => out.push('\t'),
            _ => {
                let _ = write!(&mut out, "\\x{b:02X}");
            }
        }
    }
    out
}
