//! The Windows side of the boundary: how each Rust parameter and return type
//! is spelled in the C ABI the VBA host calls through, and what sentinel a
//! failed call hands back.

use std::ffi::c_char;
use std::mem::ManuallyDrop;

use windows::Win32::Foundation::SysAllocStringByteLen;
use windows::Win32::System::Variant::VARIANT;
use windows::core::BSTR;

use crate::cell::{CVERR_VALUE, HostCell};
use crate::charset::{encode_narrow, narrow_from_ptr, wide_from_ptr, wide_to_string};
use crate::error::BridgeError;
use crate::grid::{HostValue, ReturnedGrid};
use crate::text::{BstrText, HeapText, NarrowText, WideText};

pub mod dispatch;
pub mod safearray;
pub mod variant;

/// A parameter type that can be read from its raw ABI form. The host keeps
/// ownership of whatever the raw value points at.
pub trait FromAbi: Sized {
    type Abi;
    fn from_abi(raw: Self::Abi) -> Result<Self, BridgeError>;
}

/// A return type that can be turned into its raw ABI form. Ownership of any
/// allocation in the raw value passes to the host.
pub trait IntoAbi {
    type Abi;
    fn into_abi(self) -> Result<Self::Abi, BridgeError>;
    /// The value returned to the host when the call fails.
    fn failure() -> Self::Abi;
}

/// Called first by every export wrapper.
pub fn enter(export: &str) {
    crate::logging::init();
    log::debug!("{} called", export);
}

/// Logs `err` and produces the failure sentinel for `T`.
pub fn fail<T: IntoAbi>(export: &str, err: &BridgeError) -> T::Abi {
    log::error!("{}: {}", export, err);
    T::failure()
}

/// Converts the outcome of an export into what the host receives.
pub fn finish<T: IntoAbi>(export: &str, result: Result<T, BridgeError>) -> T::Abi {
    match result.and_then(IntoAbi::into_abi) {
        Ok(raw) => {
            log::trace!("{} returned", export);
            raw
        }
        Err(e) => fail::<T>(export, &e),
    }
}

impl FromAbi for NarrowText {
    type Abi = *const c_char;
    fn from_abi(raw: Self::Abi) -> Result<Self, BridgeError> {
        Ok(NarrowText(unsafe { narrow_from_ptr(raw)? }))
    }
}

impl FromAbi for WideText {
    type Abi = *const u16;
    fn from_abi(raw: Self::Abi) -> Result<Self, BridgeError> {
        Ok(WideText(unsafe { wide_from_ptr(raw)? }))
    }
}

/// The BSTR is borrowed: wrapping it in ManuallyDrop keeps Rust from calling
/// SysFreeString on memory the host still owns. A null BSTR is the empty
/// string.
impl FromAbi for BstrText {
    type Abi = *const u16;
    fn from_abi(raw: Self::Abi) -> Result<Self, BridgeError> {
        let bstr = ManuallyDrop::new(unsafe { BSTR::from_raw(raw) });
        Ok(BstrText(wide_to_string(bstr.as_wide())?))
    }
}

impl FromAbi for HostValue {
    type Abi = *const VARIANT;
    fn from_abi(raw: Self::Abi) -> Result<Self, BridgeError> {
        unsafe { variant::host_value(raw) }
    }
}

/// A by-value VARIANT is still the caller's to clear.
impl FromAbi for HostCell {
    type Abi = ManuallyDrop<VARIANT>;
    fn from_abi(raw: Self::Abi) -> Result<Self, BridgeError> {
        variant::host_cell(&raw)
    }
}

/// A `Declare ... As String` return is read by VBA as ANSI bytes and
/// widened on its side, so the BSTR carries the narrow encoding.
impl IntoAbi for BstrText {
    type Abi = *const u16;
    fn into_abi(self) -> Result<Self::Abi, BridgeError> {
        let bytes = encode_narrow(&self.0)?;
        let raw = unsafe { SysAllocStringByteLen(Some(&bytes)) }.into_raw();
        if raw.is_null() {
            return Err(BridgeError::AllocationFailure(format!(
                "SysAllocStringByteLen({}) returned null",
                bytes.len()
            )));
        }
        Ok(raw)
    }
    fn failure() -> Self::Abi {
        std::ptr::null()
    }
}

impl IntoAbi for HeapText {
    type Abi = *mut c_char;
    fn into_abi(self) -> Result<Self::Abi, BridgeError> {
        self.into_raw()
    }
    fn failure() -> Self::Abi {
        std::ptr::null_mut()
    }
}

impl IntoAbi for ReturnedGrid {
    type Abi = VARIANT;
    fn into_abi(self) -> Result<Self::Abi, BridgeError> {
        safearray::grid_to_variant(&self)
    }
    fn failure() -> Self::Abi {
        variant::variant_error(CVERR_VALUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::heap::free_heap_text;
    use crate::shape;
    use pretty_assertions::assert_eq;
    use std::ffi::CStr;

    use variant::{OwnedVariant, vt};

    /// The bytes of a BSTR, read through its byte length prefix.
    fn bstr_bytes(raw: *const u16) -> Vec<u8> {
        unsafe {
            let len = *(raw as *const u32).sub(1) as usize;
            std::slice::from_raw_parts(raw as *const u8, len).to_vec()
        }
    }

    #[test]
    fn borrowed_bstr_is_left_alive() {
        let host = BSTR::from("borrowed");
        let text = BstrText::from_abi(host.as_ptr()).unwrap();
        assert_eq!(text.0, "borrowed");
        assert_eq!(host.to_string(), "borrowed");
    }

    #[test]
    fn null_bstr_reads_as_empty() {
        assert_eq!(BstrText::from_abi(std::ptr::null()).unwrap().0, "");
    }

    #[test]
    fn returned_bstr_carries_narrow_bytes() {
        let raw = BstrText("UPPER".to_string()).into_abi().unwrap();
        assert_eq!(bstr_bytes(raw), b"UPPER");
        drop(unsafe { BSTR::from_raw(raw) });
        assert!(BstrText("a\0b".to_string()).into_abi().is_err());
    }

    #[test]
    fn heap_text_return_is_freed_by_the_host() {
        let raw = HeapText("HEAP".to_string()).into_abi().unwrap();
        assert_eq!(unsafe { CStr::from_ptr(raw) }.to_bytes(), b"HEAP");
        free_heap_text(raw);
        assert!(<HeapText as IntoAbi>::failure().is_null());
    }

    #[test]
    fn failed_grid_becomes_value_error() {
        let v = OwnedVariant::new(<ReturnedGrid as IntoAbi>::failure());
        assert_eq!(vt(&v), shape::VT_ERROR);
        assert_eq!(variant::cell_from_variant(&v).unwrap(), Cell::Error(CVERR_VALUE));
    }

    #[test]
    fn finish_maps_errors_to_the_sentinel() {
        let raw = finish::<BstrText>("test_export", Err(BridgeError::shape("scalar")));
        assert!(raw.is_null());
    }
}
