//! VARIANT construction and inspection.
//!
//! The VARIANT struct wraps its inner unions in ManuallyDrop, so fields are set
//! with `ptr::write` rather than through DerefMut.

use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr;

use windows::Win32::Foundation::VARIANT_BOOL;
use windows::Win32::System::Com::{IDispatch, SAFEARRAY};
use windows::Win32::System::Ole::SafeArrayGetDim;
use windows::Win32::System::Variant::{
    VARENUM, VARIANT, VT_BOOL, VT_BSTR, VT_ERROR, VT_I4, VT_R8, VariantClear,
};
use windows::core::BSTR;

use crate::cell::{Cell, HostCell};
use crate::error::BridgeError;
use crate::grid::HostValue;
use crate::shape::{self, HostShape, classify_shape, describe_vt};

use super::dispatch::DispatchRange;
use super::safearray;

/// A VARIANT the bridge owns: an Invoke result, a SAFEARRAY element copy or
/// a temporary built for a put. Dropping it runs `VariantClear`, which frees
/// a BSTR, releases an object reference or destroys an array.
pub struct OwnedVariant(VARIANT);

impl OwnedVariant {
    pub fn new(v: VARIANT) -> Self {
        OwnedVariant(v)
    }

    /// Out-parameter slot for calls that fill a VARIANT.
    pub fn as_mut_ptr(&mut self) -> *mut VARIANT {
        &mut self.0
    }

    /// Releases the contents now, leaving the variant Empty.
    pub fn clear(&mut self) {
        if let Err(e) = unsafe { VariantClear(&mut self.0) } {
            log::warn!("VariantClear failed: {}", e);
        }
    }

    /// Gives up ownership of the contents, for returning them to the host.
    pub fn into_raw(self) -> VARIANT {
        let this = ManuallyDrop::new(self);
        unsafe { ptr::read(&this.0) }
    }
}

impl Default for OwnedVariant {
    fn default() -> Self {
        OwnedVariant(VARIANT::default())
    }
}

impl Deref for OwnedVariant {
    type Target = VARIANT;
    fn deref(&self) -> &VARIANT {
        &self.0
    }
}

impl Drop for OwnedVariant {
    fn drop(&mut self) {
        self.clear();
    }
}

pub fn vt(v: &VARIANT) -> u16 {
    unsafe { v.Anonymous.Anonymous.vt.0 }
}

pub fn variant_f64(val: f64) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_R8);
        ptr::write(&mut inner.Anonymous.dblVal, val);
        v
    }
}

pub fn variant_i32(val: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_I4);
        ptr::write(&mut inner.Anonymous.lVal, val);
        v
    }
}

pub fn variant_bool(val: bool) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BOOL);
        ptr::write(
            &mut inner.Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
        v
    }
}

pub fn variant_str(val: &str) -> VARIANT {
    unsafe {
        let bstr = BSTR::from(val);
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BSTR);
        ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(bstr));
        v
    }
}

/// A `VT_ERROR` variant, what `CVErr` produces in VBA.
pub fn variant_error(scode: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_ERROR);
        ptr::write(&mut inner.Anonymous.scode, scode);
        v
    }
}

/// Takes ownership of `psa` inside a `VT_ARRAY | element` variant.
pub fn variant_array(element: VARENUM, psa: *mut SAFEARRAY) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VARENUM(shape::VT_ARRAY | element.0));
        ptr::write(&mut inner.Anonymous.parray, psa);
        v
    }
}

pub fn variant_from_cell(cell: &Cell) -> VARIANT {
    match cell {
        Cell::Number(n) => variant_f64(*n),
        Cell::Text(s) => variant_str(s),
        Cell::Boolean(b) => variant_bool(*b),
        Cell::Empty => VARIANT::default(),
        Cell::Error(code) => variant_error(*code),
    }
}

/// Follows a `VT_BYREF | VT_VARIANT` indirection, as VBA produces for a
/// Variant passed `ByRef` that itself holds a Variant.
fn deref_variant(v: &VARIANT) -> Result<&VARIANT, BridgeError> {
    if vt(v) == shape::VT_BYREF | shape::VT_VARIANT {
        let inner = unsafe { v.Anonymous.Anonymous.Anonymous.pvarVal };
        if inner.is_null() {
            return Err(BridgeError::shape("null Variant reference"));
        }
        Ok(unsafe { &*inner })
    } else {
        Ok(v)
    }
}

/// Reads a scalar cell out of a variant without coercing its kind.
pub fn cell_from_variant(v: &VARIANT) -> Result<Cell, BridgeError> {
    let v = deref_variant(v)?;
    let tag = vt(v);
    unsafe {
        let val = &v.Anonymous.Anonymous.Anonymous;
        let cell = match tag {
            shape::VT_EMPTY | shape::VT_NULL => Cell::Empty,
            shape::VT_R8 | shape::VT_DATE => Cell::Number(val.dblVal),
            shape::VT_R4 => Cell::Number(val.fltVal as f64),
            shape::VT_I2 => Cell::Number(val.iVal as f64),
            shape::VT_I4 => Cell::Number(val.lVal as f64),
            shape::VT_UI1 => Cell::Number(val.bVal as f64),
            shape::VT_I8 => Cell::Number(val.llVal as f64),
            shape::VT_CY => Cell::Number(val.cyVal.int64 as f64 / 10_000.0),
            shape::VT_BOOL => Cell::Boolean(val.boolVal.0 != 0),
            shape::VT_ERROR => Cell::Error(val.scode),
            shape::VT_BSTR => Cell::Text(String::from_utf16(val.bstrVal.as_wide())?),
            _ => {
                return Err(BridgeError::shape(format!(
                    "cell value of type {} is not a scalar",
                    describe_vt(tag)
                )));
            }
        };
        Ok(cell)
    }
}

/// Extracts the object of a `VT_DISPATCH` (or by-reference dispatch) variant,
/// adding a reference the caller now owns.
fn dispatch_of(v: &VARIANT) -> Result<IDispatch, BridgeError> {
    let tag = vt(v);
    let disp: Option<IDispatch> = unsafe {
        let val = &v.Anonymous.Anonymous.Anonymous;
        if tag & shape::VT_BYREF != 0 {
            let pp = val.ppdispVal;
            if pp.is_null() { None } else { (*pp).clone() }
        } else {
            (*val.pdispVal).clone()
        }
    };
    disp.ok_or_else(|| BridgeError::shape("object reference is Nothing"))
}

/// The SAFEARRAY of an array variant, following `VT_BYREF`.
fn array_of(v: &VARIANT) -> Result<*mut SAFEARRAY, BridgeError> {
    let tag = vt(v);
    let psa = unsafe {
        let val = &v.Anonymous.Anonymous.Anonymous;
        if tag & shape::VT_BYREF != 0 {
            let pp = val.pparray;
            if pp.is_null() { ptr::null_mut() } else { *pp }
        } else {
            val.parray
        }
    };
    if psa.is_null() {
        return Err(BridgeError::shape("array is not allocated"));
    }
    Ok(psa)
}

fn array_dims(v: &VARIANT) -> u32 {
    if vt(v) & shape::VT_ARRAY == 0 {
        return 0;
    }
    match array_of(v) {
        Ok(psa) => unsafe { SafeArrayGetDim(psa) },
        Err(_) => 0,
    }
}

/// Turns the variant a host passed into a tagged `HostValue`: a Range object
/// or a two dimensional array. The variant stays owned by the host.
///
/// # Safety
/// `ptr` must be null or point at a valid VARIANT for the duration of the call.
pub unsafe fn host_value(ptr: *const VARIANT) -> Result<HostValue, BridgeError> {
    if ptr.is_null() {
        return Err(BridgeError::shape("null Variant pointer"));
    }
    let v = deref_variant(unsafe { &*ptr })?;
    match classify_shape(vt(v), array_dims(v))? {
        HostShape::Range => Ok(HostValue::Range(Box::new(DispatchRange::new(dispatch_of(v)?)))),
        HostShape::Array { element } => {
            let grid = unsafe { safearray::read_inline_grid(array_of(v)?, element)? };
            Ok(HostValue::Inline(grid))
        }
    }
}

/// Picks a single cell out of a by-value variant: the top-left cell of a
/// Range, the element at the lower bounds of an array, or the scalar itself.
pub fn host_cell(v: &VARIANT) -> Result<HostCell, BridgeError> {
    let v = deref_variant(v)?;
    let tag = vt(v);
    if tag & shape::VT_TYPEMASK == shape::VT_DISPATCH && tag & shape::VT_ARRAY == 0 {
        use crate::grid::RangeSource;
        let range = DispatchRange::new(dispatch_of(v)?);
        return Ok(HostCell(range.cell(0, 0)?));
    }
    if tag & shape::VT_ARRAY != 0 {
        let element = tag & shape::VT_TYPEMASK;
        if !shape::is_supported_element(element) {
            return Err(BridgeError::shape(format!(
                "array element type {} is not supported",
                describe_vt(element)
            )));
        }
        let cell = unsafe { safearray::first_element(array_of(v)?, element)? };
        return Ok(HostCell(cell));
    }
    Ok(HostCell(cell_from_variant(v)?))
}
