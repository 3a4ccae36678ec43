//! Narrow strings handed to the host on the C heap, and the export the host
//! calls to give them back.

use std::ffi::c_char;
use std::ptr;

use crate::catalog::{Export, ParamInfo};
use crate::charset::encode_narrow;
use crate::error::BridgeError;
use crate::text::HeapText;

/// Copies `text`, in the narrow encoding, into a fresh `malloc` block with a
/// trailing NUL. Ownership of the block passes to the caller, who must release
/// it with [`free_heap_text`].
pub fn alloc_heap_text(text: &str) -> Result<*mut c_char, BridgeError> {
    let bytes = encode_narrow(text)?;
    let len = bytes.len();
    let block = unsafe { libc::malloc(len + 1) } as *mut u8;
    if block.is_null() {
        return Err(BridgeError::AllocationFailure(format!(
            "malloc of {} bytes failed",
            len + 1
        )));
    }
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), block, len);
        *block.add(len) = 0;
    }
    Ok(block as *mut c_char)
}

impl HeapText {
    /// Moves the text onto the C heap, handing the block to the caller.
    pub fn into_raw(self) -> Result<*mut c_char, BridgeError> {
        alloc_heap_text(&self.0)
    }
}

/// Releases a string returned by `upper_heap` (or any other export returning
/// a heap string). Null is ignored.
#[unsafe(no_mangle)]
pub extern "system" fn free_heap_text(text: *mut c_char) {
    if !text.is_null() {
        unsafe { libc::free(text as *mut libc::c_void) };
    }
}

inventory::submit! {
    Export {
        name: "free_heap_text",
        params: &[ParamInfo {
            name: "text",
            passing: "ByVal",
            vba_type: "LongPtr",
            description: "pointer returned by upper_heap",
        }],
        returns: None,
        description: "Releases a string returned on the C heap.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn heap_text_is_terminated_and_freeable() {
        let p = alloc_heap_text("ABC def").unwrap();
        let back = unsafe { CStr::from_ptr(p) }.to_bytes().to_vec();
        free_heap_text(p);
        assert_eq!(back, encode_narrow("ABC def").unwrap());
    }

    #[test]
    fn empty_text_allocates_terminator_only() {
        let p = alloc_heap_text("").unwrap();
        assert_eq!(unsafe { *p }, 0);
        free_heap_text(p);
    }

    #[test]
    fn embedded_nul_is_rejected() {
        assert!(matches!(
            alloc_heap_text("a\0b"),
            Err(BridgeError::ConversionFailure(_))
        ));
    }

    #[test]
    fn heap_text_hands_over_its_block() {
        let p = HeapText("OWNED".to_string()).into_raw().unwrap();
        assert_eq!(unsafe { CStr::from_ptr(p) }.to_bytes(), b"OWNED");
        free_heap_text(p);
    }

    #[test]
    fn freeing_null_is_a_no_op() {
        free_heap_text(ptr::null_mut());
    }

    #[test]
    fn registered_in_catalog() {
        let export = crate::catalog::find("free_heap_text").unwrap();
        assert_eq!(
            export.declare("vba_bridge.dll"),
            "Public Declare PtrSafe Sub free_heap_text Lib \"vba_bridge.dll\" (ByVal text As LongPtr)"
        );
    }
}
