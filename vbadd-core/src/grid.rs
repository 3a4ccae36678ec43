//! The array bridge: takes either a host Range or an inline VBA array,
//! normalizes it into a 0-based grid and wraps it for return to the host.

use std::fmt;

use crate::cell::Cell;
use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Read access to a rectangular grid of cells owned by the host. Indices are
/// 0-based; implementations translate to whatever the host uses.
pub trait RangeSource {
    fn rows(&self) -> Result<usize, BridgeError>;
    fn columns(&self) -> Result<usize, BridgeError>;
    fn cell(&self, row: usize, column: usize) -> Result<Cell, BridgeError>;
}

/// A literal two dimensional array passed by value, carrying its declared
/// bounds. VBA arrays are usually 1-based (`Dim Y(1 To 5, 1 To 1)`), but any
/// lower bound is accepted. Values are stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineGrid {
    low_row: i32,
    high_row: i32,
    low_col: i32,
    high_col: i32,
    values: Vec<Cell>,
}

/// Number of indices in `low..=high`, zero when `high < low`.
fn span(low: i32, high: i32) -> usize {
    (high as i64 - low as i64 + 1).max(0) as usize
}

impl InlineGrid {
    pub fn new(
        (low_row, high_row): (i32, i32),
        (low_col, high_col): (i32, i32),
        values: Vec<Cell>,
    ) -> Result<InlineGrid, BridgeError> {
        let expected = span(low_row, high_row)
            .checked_mul(span(low_col, high_col))
            .ok_or_else(|| BridgeError::shape("array bounds overflow"))?;
        if values.len() != expected {
            return Err(BridgeError::shape(format!(
                "bounds ({}..{}, {}..{}) need {} values, got {}",
                low_row,
                high_row,
                low_col,
                high_col,
                expected,
                values.len()
            )));
        }
        Ok(InlineGrid {
            low_row,
            high_row,
            low_col,
            high_col,
            values,
        })
    }

    /// Builds a grid with the given lower bounds from nested rows.
    pub fn from_rows(
        low_row: i32,
        low_col: i32,
        rows: Vec<Vec<Cell>>,
    ) -> Result<InlineGrid, BridgeError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(BridgeError::shape("rows of an inline grid differ in length"));
        }
        let n_rows = rows.len();
        let values = rows.into_iter().flatten().collect();
        InlineGrid::new(
            (low_row, low_row + n_rows as i32 - 1),
            (low_col, low_col + cols as i32 - 1),
            values,
        )
    }

    /// A VBA style grid indexed from 1 in both dimensions.
    pub fn one_based(rows: Vec<Vec<Cell>>) -> Result<InlineGrid, BridgeError> {
        InlineGrid::from_rows(1, 1, rows)
    }

    pub fn row_bounds(&self) -> (i32, i32) {
        (self.low_row, self.high_row)
    }

    pub fn col_bounds(&self) -> (i32, i32) {
        (self.low_col, self.high_col)
    }

    /// Cell at host indices `(row, col)`, or `None` outside the bounds.
    pub fn get(&self, row: i32, col: i32) -> Option<&Cell> {
        if row < self.low_row || row > self.high_row || col < self.low_col || col > self.high_col
        {
            return None;
        }
        let r = (row as i64 - self.low_row as i64) as usize;
        let c = (col as i64 - self.low_col as i64) as usize;
        self.values.get(r * span(self.low_col, self.high_col) + c)
    }
}

/// What the host passed to the array bridge. The tag is decided once at the
/// boundary; nothing downstream inspects the value's runtime type again.
pub enum HostValue {
    Range(Box<dyn RangeSource>),
    Inline(InlineGrid),
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HostValue::Range(_) => write!(f, "HostValue::Range"),
            HostValue::Inline(g) => f.debug_tuple("HostValue::Inline").field(g).finish(),
        }
    }
}

impl HostValue {
    /// Logical extent `(rows, cols)` of the value, without reading any cells.
    pub fn extent(&self) -> Result<(usize, usize), BridgeError> {
        match self {
            HostValue::Range(range) => Ok((range.rows()?, range.columns()?)),
            HostValue::Inline(grid) => Ok((
                span(grid.low_row, grid.high_row),
                span(grid.low_col, grid.high_col),
            )),
        }
    }
}

/// A 0-based `rows x cols` grid, stored row-major. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalGrid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl CanonicalGrid {
    /// Reserves storage for a grid of the given extent. Empty extents are
    /// rejected, as are grids over `max_cells` or ones the allocator refuses.
    fn with_extent(rows: usize, cols: usize, max_cells: u64) -> Result<CanonicalGrid, BridgeError> {
        if rows == 0 || cols == 0 {
            return Err(BridgeError::shape(format!(
                "grid is empty ({} rows x {} columns)",
                rows, cols
            )));
        }
        let total = (rows as u64).saturating_mul(cols as u64);
        if total > max_cells {
            return Err(BridgeError::AllocationFailure(format!(
                "{} x {} grid exceeds the limit of {} cells",
                rows, cols, max_cells
            )));
        }
        let len = usize::try_from(total)
            .map_err(|_| BridgeError::AllocationFailure(format!("{} cells", total)))?;
        let mut cells = Vec::new();
        cells.try_reserve_exact(len)?;
        Ok(CanonicalGrid { rows, cols, cells })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row * self.cols + col)
    }
}

/// Reads every cell of `host` into a 0-based grid.
pub fn normalize(host: &HostValue, max_cells: u64) -> Result<CanonicalGrid, BridgeError> {
    let (rows, cols) = host.extent()?;
    let mut grid = CanonicalGrid::with_extent(rows, cols, max_cells)?;
    match host {
        HostValue::Range(range) => {
            for r in 0..rows {
                for c in 0..cols {
                    grid.cells.push(range.cell(r, c)?);
                }
            }
        }
        HostValue::Inline(inline) => {
            // cells land at [r - low_row][c - low_col] because both loops walk
            // the bounds in order and push row-major
            for r in inline.low_row..=inline.high_row {
                for c in inline.low_col..=inline.high_col {
                    let cell = inline.get(r, c).cloned().ok_or_else(|| {
                        BridgeError::shape(format!("no value at ({}, {})", r, c))
                    })?;
                    grid.cells.push(cell);
                }
            }
        }
    }
    log::debug!("normalized host value into {} x {} grid", rows, cols);
    Ok(grid)
}

/// A grid ready to hand back to the host. The ABI layer turns it into a
/// 0-based `VT_ARRAY | VT_VARIANT` SAFEARRAY and gives up ownership of that
/// allocation to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnedGrid {
    grid: CanonicalGrid,
}

impl ReturnedGrid {
    pub fn wrap(grid: CanonicalGrid) -> ReturnedGrid {
        ReturnedGrid { grid }
    }

    /// Builds a grid from nested rows, all of the same non-zero length.
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Result<ReturnedGrid, BridgeError> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != n_cols) {
            return Err(BridgeError::shape("rows of a returned grid differ in length"));
        }
        let mut grid =
            CanonicalGrid::with_extent(n_rows, n_cols, BridgeConfig::global().max_cells)?;
        grid.cells.extend(rows.into_iter().flatten());
        Ok(ReturnedGrid { grid })
    }

    pub fn rows(&self) -> usize {
        self.grid.rows
    }

    pub fn columns(&self) -> usize {
        self.grid.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.grid.get(row, col)
    }

    /// Cells in row-major order, paired with their 0-based `(row, col)`.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &Cell)> {
        let cols = self.grid.cols;
        self.grid
            .cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| ((i / cols, i % cols), cell))
    }

    pub fn to_rows(&self) -> Vec<Vec<Cell>> {
        self.grid
            .cells
            .chunks(self.grid.cols)
            .map(<[Cell]>::to_vec)
            .collect()
    }
}

/// Normalizes `host` and wraps the result, using the process config limits.
pub fn normalize_and_wrap(host: HostValue) -> Result<ReturnedGrid, BridgeError> {
    normalize_and_wrap_with(host, BridgeConfig::global())
}

pub fn normalize_and_wrap_with(
    host: HostValue,
    config: &BridgeConfig,
) -> Result<ReturnedGrid, BridgeError> {
    let grid = normalize(&host, config.max_cells)?;
    Ok(ReturnedGrid::wrap(grid))
}

/// Echoes the dimensions of `host` as a `1 x 2` grid `[rows, cols]`.
pub fn grid_dims(host: &HostValue) -> Result<ReturnedGrid, BridgeError> {
    let (rows, cols) = host.extent()?;
    if rows == 0 || cols == 0 {
        return Err(BridgeError::shape(format!(
            "grid is empty ({} rows x {} columns)",
            rows, cols
        )));
    }
    ReturnedGrid::from_rows(vec![vec![
        Cell::Number(rows as f64),
        Cell::Number(cols as f64),
    ]])
}
