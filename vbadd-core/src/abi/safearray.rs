//! Reading host SAFEARRAYs into an `InlineGrid`, and building the 0-based
//! `VT_VARIANT` SAFEARRAY that a `ReturnedGrid` becomes on the way out.

use std::ffi::c_void;
use std::mem;

use windows::Win32::System::Com::{SAFEARRAY, SAFEARRAYBOUND};
use windows::Win32::System::Ole::{
    SafeArrayCreate, SafeArrayDestroy, SafeArrayGetDim, SafeArrayGetElement, SafeArrayGetLBound,
    SafeArrayGetUBound, SafeArrayPutElement,
};
use windows::Win32::System::Variant::{VARENUM, VARIANT, VT_VARIANT};
use windows::core::BSTR;

use crate::cell::Cell;
use crate::error::BridgeError;
use crate::grid::{InlineGrid, ReturnedGrid};
use crate::shape::{self, describe_vt};

use super::variant::{OwnedVariant, cell_from_variant, variant_array, variant_from_cell};

/// A SAFEARRAY the bridge allocated and still owns. Dropping it destroys the
/// array; [`OwnedSafeArray::into_raw`] is the single point where ownership is
/// handed to the host, after which the bridge never touches it again.
pub struct OwnedSafeArray(*mut SAFEARRAY);

impl OwnedSafeArray {
    /// A 0-based `rows x cols` array of Variants, all initially Empty.
    pub fn create_2d(rows: usize, cols: usize) -> Result<OwnedSafeArray, BridgeError> {
        OwnedSafeArray::with_bounds(VT_VARIANT, &[(0, rows), (0, cols)])
    }

    /// An array of `element` with one `(lower bound, count)` pair per
    /// dimension, leftmost first.
    pub fn with_bounds(
        element: VARENUM,
        dims: &[(i32, usize)],
    ) -> Result<OwnedSafeArray, BridgeError> {
        let mut bounds = Vec::new();
        bounds.try_reserve_exact(dims.len())?;
        for &(lower, count) in dims {
            let elements = u32::try_from(count).map_err(|_| {
                BridgeError::AllocationFailure(format!("{} elements do not fit a SAFEARRAY", count))
            })?;
            bounds.push(SAFEARRAYBOUND {
                cElements: elements,
                lLbound: lower,
            });
        }
        let psa = unsafe { SafeArrayCreate(element, bounds.len() as u32, bounds.as_ptr()) };
        if psa.is_null() {
            return Err(BridgeError::AllocationFailure(format!(
                "SafeArrayCreate({:?}) returned null",
                dims
            )));
        }
        Ok(OwnedSafeArray(psa))
    }

    pub fn as_ptr(&self) -> *mut SAFEARRAY {
        self.0
    }

    /// Copies `value` into the element at `(row, col)`. The array keeps its
    /// own copy; `value` stays the caller's.
    pub fn put(&mut self, row: usize, col: usize, value: &VARIANT) -> Result<(), BridgeError> {
        let indices = [row as i32, col as i32];
        unsafe { self.put_raw(&indices, value as *const VARIANT as *const c_void) }
    }

    /// # Safety
    /// `value` must point at an element of the array's type.
    unsafe fn put_raw(&mut self, indices: &[i32], value: *const c_void) -> Result<(), BridgeError> {
        unsafe { SafeArrayPutElement(self.0, indices.as_ptr(), value)? };
        Ok(())
    }

    /// Gives up ownership. The caller becomes responsible for destroying it.
    pub fn into_raw(self) -> *mut SAFEARRAY {
        let psa = self.0;
        mem::forget(self);
        psa
    }
}

impl Drop for OwnedSafeArray {
    fn drop(&mut self) {
        if let Err(e) = unsafe { SafeArrayDestroy(self.0) } {
            log::warn!("SafeArrayDestroy failed: {}", e);
        }
    }
}

/// Builds the `VT_ARRAY | VT_VARIANT` variant for `grid`. Either every cell is
/// copied or nothing is returned: a failed put drops (and destroys) the
/// partly filled array.
pub fn grid_to_variant(grid: &ReturnedGrid) -> Result<VARIANT, BridgeError> {
    let mut array = OwnedSafeArray::create_2d(grid.rows(), grid.columns())?;
    for ((r, c), cell) in grid.iter() {
        let value = OwnedVariant::new(variant_from_cell(cell));
        array.put(r, c, &value)?;
    }
    log::debug!(
        "returning {} x {} Variant array",
        grid.rows(),
        grid.columns()
    );
    Ok(variant_array(VT_VARIANT, array.into_raw()))
}

/// Copies out a scalar or BSTR element. BSTR copies free themselves on drop.
unsafe fn get<T: Default>(psa: *mut SAFEARRAY, indices: &[i32; 2]) -> Result<T, BridgeError> {
    let mut out = T::default();
    unsafe {
        SafeArrayGetElement(psa, indices.as_ptr(), &mut out as *mut T as *mut c_void)?;
    }
    Ok(out)
}

/// Reads one element of an array whose elements have base type `element`.
unsafe fn read_element(
    psa: *mut SAFEARRAY,
    element: u16,
    indices: &[i32; 2],
) -> Result<Cell, BridgeError> {
    unsafe {
        let cell = match element {
            shape::VT_VARIANT => {
                // SafeArrayGetElement hands back a VariantCopy
                let mut value = OwnedVariant::default();
                SafeArrayGetElement(psa, indices.as_ptr(), value.as_mut_ptr() as *mut c_void)?;
                cell_from_variant(&value)?
            }
            shape::VT_R8 | shape::VT_DATE => Cell::Number(get::<f64>(psa, indices)?),
            shape::VT_R4 => Cell::Number(get::<f32>(psa, indices)? as f64),
            shape::VT_I2 => Cell::Number(get::<i16>(psa, indices)? as f64),
            shape::VT_I4 => Cell::Number(get::<i32>(psa, indices)? as f64),
            shape::VT_UI1 => Cell::Number(get::<u8>(psa, indices)? as f64),
            shape::VT_I8 => Cell::Number(get::<i64>(psa, indices)? as f64),
            shape::VT_CY => Cell::Number(get::<i64>(psa, indices)? as f64 / 10_000.0),
            shape::VT_BOOL => Cell::Boolean(get::<i16>(psa, indices)? != 0),
            shape::VT_BSTR => Cell::Text(String::from_utf16(get::<BSTR>(psa, indices)?.as_wide())?),
            other => {
                return Err(BridgeError::shape(format!(
                    "array element type {} is not supported",
                    describe_vt(other)
                )));
            }
        };
        Ok(cell)
    }
}

/// `(lower, upper)` bound of dimension `dim` (1-based, leftmost first).
unsafe fn bounds(psa: *mut SAFEARRAY, dim: u32) -> Result<(i32, i32), BridgeError> {
    unsafe { Ok((SafeArrayGetLBound(psa, dim)?, SafeArrayGetUBound(psa, dim)?)) }
}

/// Reads a two dimensional host array, keeping its declared bounds.
///
/// # Safety
/// `psa` must be a valid, two dimensional SAFEARRAY whose element type is
/// `element`, alive for the duration of the call.
pub unsafe fn read_inline_grid(
    psa: *mut SAFEARRAY,
    element: u16,
) -> Result<InlineGrid, BridgeError> {
    let (row_bounds, col_bounds) = unsafe { (bounds(psa, 1)?, bounds(psa, 2)?) };
    let count = |(lo, hi): (i32, i32)| (hi as i64 - lo as i64 + 1).max(0) as usize;
    let total = count(row_bounds)
        .checked_mul(count(col_bounds))
        .ok_or_else(|| BridgeError::AllocationFailure("array too large".to_string()))?;
    let mut values = Vec::new();
    values.try_reserve_exact(total)?;
    for r in row_bounds.0..=row_bounds.1 {
        for c in col_bounds.0..=col_bounds.1 {
            values.push(unsafe { read_element(psa, element, &[r, c])? });
        }
    }
    InlineGrid::new(row_bounds, col_bounds, values)
}

/// The element at the lower bound of every dimension, for arrays of one or
/// two dimensions.
///
/// # Safety
/// As for [`read_inline_grid`], but any rank is accepted.
pub unsafe fn first_element(psa: *mut SAFEARRAY, element: u16) -> Result<Cell, BridgeError> {
    unsafe {
        let indices = match SafeArrayGetDim(psa) {
            1 => [SafeArrayGetLBound(psa, 1)?, 0],
            2 => [SafeArrayGetLBound(psa, 1)?, SafeArrayGetLBound(psa, 2)?],
            n => {
                return Err(BridgeError::shape(format!(
                    "cannot take a single cell from a {}-dimensional array",
                    n
                )));
            }
        };
        read_element(psa, element, &indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CVERR_NA;
    use pretty_assertions::assert_eq;
    use windows::Win32::System::Variant::VT_R8;

    use super::super::variant::{variant_f64, variant_str, vt};

    fn put_f64(array: &mut OwnedSafeArray, indices: &[i32], value: f64) {
        unsafe { array.put_raw(indices, &value as *const f64 as *const c_void) }.unwrap();
    }

    fn put_variant(array: &mut OwnedSafeArray, indices: &[i32], value: VARIANT) {
        let value = OwnedVariant::new(value);
        unsafe { array.put_raw(indices, &*value as *const VARIANT as *const c_void) }.unwrap();
    }

    #[test]
    fn returned_grid_is_zero_based() {
        let grid = ReturnedGrid::from_rows(vec![
            vec![Cell::from(1), Cell::from("a")],
            vec![Cell::from(true), Cell::Empty],
            vec![Cell::Error(CVERR_NA), Cell::from(2.5)],
        ])
        .unwrap();
        let v = OwnedVariant::new(grid_to_variant(&grid).unwrap());
        assert_eq!(vt(&v), shape::VT_ARRAY | shape::VT_VARIANT);
        let psa = unsafe { v.Anonymous.Anonymous.Anonymous.parray };
        unsafe {
            assert_eq!(SafeArrayGetDim(psa), 2);
            assert_eq!(bounds(psa, 1).unwrap(), (0, 2));
            assert_eq!(bounds(psa, 2).unwrap(), (0, 1));
            for ((r, c), cell) in grid.iter() {
                let back = read_element(psa, shape::VT_VARIANT, &[r as i32, c as i32]).unwrap();
                assert_eq!(&back, cell);
            }
        }
    }

    #[test]
    fn one_based_typed_array_keeps_its_bounds() {
        // Dim Y(1 To 3, 1 To 1) As Double
        let mut array = OwnedSafeArray::with_bounds(VT_R8, &[(1, 3), (1, 1)]).unwrap();
        for (i, value) in [10.0, 20.0, 30.0].into_iter().enumerate() {
            put_f64(&mut array, &[i as i32 + 1, 1], value);
        }
        let inline = unsafe { read_inline_grid(array.as_ptr(), shape::VT_R8) }.unwrap();
        assert_eq!(inline.row_bounds(), (1, 3));
        assert_eq!(inline.col_bounds(), (1, 1));
        assert_eq!(inline.get(1, 1), Some(&Cell::Number(10.0)));
        assert_eq!(inline.get(3, 1), Some(&Cell::Number(30.0)));
    }

    #[test]
    fn negative_lower_bounds_are_read() {
        let mut array = OwnedSafeArray::with_bounds(VT_VARIANT, &[(-1, 2), (0, 2)]).unwrap();
        put_variant(&mut array, &[-1, 0], variant_str("top left"));
        put_variant(&mut array, &[0, 1], variant_f64(4.0));
        let inline = unsafe { read_inline_grid(array.as_ptr(), shape::VT_VARIANT) }.unwrap();
        assert_eq!(inline.row_bounds(), (-1, 0));
        assert_eq!(inline.get(-1, 0), Some(&Cell::from("top left")));
        assert_eq!(inline.get(-1, 1), Some(&Cell::Empty));
        assert_eq!(inline.get(0, 1), Some(&Cell::Number(4.0)));
    }

    #[test]
    fn put_outside_the_bounds_fails() {
        let mut array = OwnedSafeArray::create_2d(1, 1).unwrap();
        let value = OwnedVariant::new(variant_f64(1.0));
        assert!(array.put(1, 0, &value).is_err());
        assert!(array.put(0, 0, &value).is_ok());
    }

    #[test]
    fn first_element_of_a_vector() {
        let mut array = OwnedSafeArray::with_bounds(VT_VARIANT, &[(1, 3)]).unwrap();
        put_variant(&mut array, &[1], variant_str("first"));
        let cell = unsafe { first_element(array.as_ptr(), shape::VT_VARIANT) }.unwrap();
        assert_eq!(cell, Cell::from("first"));
    }

    #[test]
    fn three_dimensional_arrays_have_no_first_cell() {
        let array = OwnedSafeArray::with_bounds(VT_VARIANT, &[(0, 1), (0, 1), (0, 1)]).unwrap();
        let err = unsafe { first_element(array.as_ptr(), shape::VT_VARIANT) }.unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedShape(_)));
    }

    #[test]
    fn into_raw_hands_over_the_array() {
        let array = OwnedSafeArray::create_2d(2, 2).unwrap();
        let psa = array.into_raw();
        unsafe {
            assert_eq!(SafeArrayGetDim(psa), 2);
            SafeArrayDestroy(psa).unwrap();
        }
    }
}
