//! String call shapes. The same Rust `String` can reach native code as a
//! `char*`, a `wchar_t*` or a `BSTR`, so each shape gets its own newtype and
//! the ABI layer picks the matching pointer type from it.

use crate::cell::HostCell;
use crate::error::BridgeError;

/// NUL terminated narrow string, `ByVal s As String` on the VBA side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrowText(pub String);

/// NUL terminated UTF-16 string, passed with `StrPtr(s)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideText(pub String);

/// A `BSTR`. As a parameter it is borrowed from the caller and holds UTF-16
/// (`StrPtr(s)`); as a return value it is freshly allocated, holds the narrow
/// encoding a `Declare ... As String` expects and is owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BstrText(pub String);

/// A narrow string returned on the C heap. The caller must release it with
/// `free_heap_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapText(pub String);

/// Unicode uppercase. Idempotent, and a no-op on text without lowercase
/// letters.
pub fn upper(text: &str) -> String {
    text.to_uppercase()
}

/// Uppercases a single host cell after formatting it the way `CStr` would.
pub fn upper_cell(cell: &HostCell) -> Result<String, BridgeError> {
    Ok(upper(&cell.0.to_text()?))
}
