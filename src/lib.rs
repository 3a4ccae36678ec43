//! A dll for VBA hosts showing how strings and 2-D arrays/ranges cross the
//! VBA/COM boundary. Every `#[vba_func]` in `vba_wrappers` becomes an export
//! and an entry in the declarations module returned by `bridge_declarations`.

mod vba_wrappers;

pub use vba_wrappers::*;

// free_heap_text is exported from vbadd-core, next to the allocator it pairs with
pub use vbadd_core::heap::free_heap_text;
