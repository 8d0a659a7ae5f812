//! Fixed-size byte tape with a wraparound data pointer.
//!
//! Cell arithmetic wraps modulo 256 and pointer movement wraps modulo the tape
//! capacity in both directions, so there is no out-of-range condition.

/// Default number of cells: 256 rows of 16 columns.
pub const DEFAULT_TAPE_SIZE: usize = 4096;

/// Number of cells per row when the tape is shown as a grid.
pub const ROW_WIDTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tape {
    cells: Vec<u8>,
    pointer: usize,
}

impl Default for Tape {
    fn default() -> Self {
        Self::new(DEFAULT_TAPE_SIZE)
    }
}

impl Tape {
    /// Allocate a zeroed tape. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: vec![0; capacity.max(1)],
            pointer: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Zero every cell and move the pointer back to 0.
    pub fn reset(&mut self) {
        self.cells.fill(0);
        self.pointer = 0;
    }

    pub fn get(&self) -> u8 {
        self.cells[self.pointer]
    }

    pub fn set(&mut self, value: u8) {
        self.cells[self.pointer] = value;
    }

    /// Add `amount` to the current cell, modulo 256.
    pub fn add(&mut self, amount: usize) {
        let cell = &mut self.cells[self.pointer];
        *cell = cell.wrapping_add((amount % 256) as u8);
    }

    /// Subtract `amount` from the current cell, modulo 256.
    pub fn sub(&mut self, amount: usize) {
        let cell = &mut self.cells[self.pointer];
        *cell = cell.wrapping_sub((amount % 256) as u8);
    }

    pub fn move_right(&mut self) {
        self.pointer = if self.pointer + 1 >= self.cells.len() {
            0
        } else {
            self.pointer + 1
        };
    }

    pub fn move_left(&mut self) {
        self.pointer = if self.pointer == 0 {
            self.cells.len() - 1
        } else {
            self.pointer - 1
        };
    }

    /// A view of up to `len` cells starting at `base`, clamped to the tape end.
    pub fn window(&self, base: usize, len: usize) -> &[u8] {
        let start = base.min(self.cells.len());
        let end = base.saturating_add(len).min(self.cells.len());
        &self.cells[start..end]
    }

    /// Index of the highest non-zero cell, or the pointer if that is further.
    pub fn high_water_mark(&self) -> usize {
        let last_nonzero = self.cells.iter().rposition(|&c| c != 0).unwrap_or(0);
        last_nonzero.max(self.pointer)
    }
}
