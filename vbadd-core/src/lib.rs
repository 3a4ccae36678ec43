//! Marshaling between a VBA host and native Rust functions.
//!
//! The platform-independent half models what crosses the boundary: cells,
//! host grids (a Range or an inline array), the returned grid, the string
//! call shapes and the error taxonomy. The `abi` module, Windows only, maps
//! those onto VARIANT, SAFEARRAY, BSTR and IDispatch.

pub mod catalog;
pub mod cell;
pub mod charset;
pub mod config;
pub mod error;
pub mod grid;
pub mod heap;
pub mod logging;
pub mod shape;
pub mod text;

#[cfg(windows)]
pub mod abi;

pub use cell::{Cell, HostCell};
pub use error::BridgeError;
pub use grid::{
    CanonicalGrid, HostValue, InlineGrid, RangeSource, ReturnedGrid, grid_dims,
    normalize_and_wrap,
};
pub use text::{BstrText, HeapText, NarrowText, WideText, upper};
