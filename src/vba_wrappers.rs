use vbadd_core::catalog;
use vbadd_core::grid::{grid_dims, normalize_and_wrap};
use vbadd_core::text::upper_cell;
use vbadd_core::{BridgeError, BstrText, HeapText, HostCell, HostValue, NarrowText, ReturnedGrid, WideText, upper};
use vbadd_derive::vba_func;

/// File name the generated `Declare` statements point at.
pub const LIB_NAME: &str = "vba_bridge.dll";

/// Takes a Range (e.g. A1:B5) or a 2-D VBA array indexed from 1 and returns
/// its cells as a 0-based 2-D Variant array of the same size
/// * arr: Range object or 2-D array, e.g. Dim Y(1 To 5, 1 To 1) As Variant
#[vba_func]
pub fn check_excel_array(arr: HostValue) -> Result<ReturnedGrid, BridgeError> {
    let grid = normalize_and_wrap(arr)?;
    log::info!("check_excel_array: {} x {}", grid.rows(), grid.columns());
    Ok(grid)
}

/// Returns the dimensions of a Range or 2-D array as a 1 x 2 array (rows, columns)
/// * arr: Range object or 2-D array
#[vba_func]
pub fn array_dims(arr: HostValue) -> Result<ReturnedGrid, BridgeError> {
    grid_dims(&arr)
}

/// Uppercases a narrow string; the result lives on the C heap and must be released with free_heap_text
/// * s: text to uppercase
#[vba_func]
pub fn upper_heap(s: NarrowText) -> Result<HeapText, BridgeError> {
    Ok(HeapText(upper(&s.0)))
}

/// Uppercases a NUL terminated wide string and returns a BSTR
/// * s: StrPtr of the text to uppercase
#[vba_func]
pub fn upper_bstr_wchar(s: WideText) -> Result<BstrText, BridgeError> {
    Ok(BstrText(upper(&s.0)))
}

/// Uppercases a BSTR and returns a new BSTR
/// * s: StrPtr of the text to uppercase
#[vba_func]
pub fn upper_bstr_bstr(s: BstrText) -> Result<BstrText, BridgeError> {
    Ok(BstrText(upper(&s.0)))
}

/// Uppercases the text of a cell, a value or the first element of an array
/// * cell: a single cell Range, a scalar value or an array
#[vba_func]
pub fn upper_bstr_var(cell: HostCell) -> Result<BstrText, BridgeError> {
    Ok(BstrText(upper_cell(&cell)?))
}

/// Returns a VBA module declaring every function exported by this dll
#[vba_func]
pub fn bridge_declarations() -> Result<BstrText, BridgeError> {
    Ok(BstrText(catalog::declarations(LIB_NAME)))
}
