//! Late-bound access to an Excel Range through IDispatch. The Range arrives
//! as a `VT_DISPATCH` argument from VBA, so it lives in the caller's apartment
//! and can be called directly.

use windows::Win32::Foundation::DISP_E_EXCEPTION;
use windows::Win32::Globalization::GetSystemDefaultLCID;
use windows::Win32::System::Com::{DISPATCH_PROPERTYGET, DISPPARAMS, EXCEPINFO, IDispatch};
use windows::Win32::System::Variant::VARIANT;
use windows::core::{GUID, PCWSTR};

use crate::cell::Cell;
use crate::error::BridgeError;
use crate::grid::RangeSource;

use super::variant::{OwnedVariant, cell_from_variant, variant_i32};

/// A host Range, read through `Rows.Count`, `Columns.Count` and `Item(r, c)`.
pub struct DispatchRange {
    range: IDispatch,
}

impl DispatchRange {
    pub fn new(range: IDispatch) -> Self {
        DispatchRange { range }
    }

    fn count_of(&self, member: &str) -> Result<usize, BridgeError> {
        let child = get_object(&self.range, member)?;
        match cell_from_variant(&get(&child, "Count", &[])?)? {
            Cell::Number(n) if n >= 0.0 => Ok(n as usize),
            other => Err(BridgeError::HostAccess(format!(
                "{}.Count returned {:?}",
                member, other
            ))),
        }
    }
}

impl RangeSource for DispatchRange {
    fn rows(&self) -> Result<usize, BridgeError> {
        self.count_of("Rows")
    }

    fn columns(&self) -> Result<usize, BridgeError> {
        self.count_of("Columns")
    }

    fn cell(&self, row: usize, column: usize) -> Result<Cell, BridgeError> {
        // Range.Item is 1-based and relative to the range's top-left cell
        let args = [variant_i32(row as i32 + 1), variant_i32(column as i32 + 1)];
        let item = get(&self.range, "Item", &args)?;
        let value = get(&dispatch_in(&item, "Item")?, "Value", &[])?;
        cell_from_variant(&value)
    }
}

fn get_dispid(disp: &IDispatch, name: &str) -> Result<i32, BridgeError> {
    unsafe {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let names = [PCWSTR(wide.as_ptr())];
        let mut dispid = 0i32;
        disp.GetIDsOfNames(
            &GUID::zeroed(),
            names.as_ptr(),
            1,
            GetSystemDefaultLCID(),
            &mut dispid,
        )
        .map_err(|e| BridgeError::HostAccess(format!("GetIDsOfNames('{}') failed: {}", name, e)))?;
        Ok(dispid)
    }
}

/// Property get with arguments in natural order. DISPPARAMS wants them
/// reversed. `args` must not own resources: they are copied bitwise.
fn get(disp: &IDispatch, name: &str, args: &[VARIANT]) -> Result<OwnedVariant, BridgeError> {
    let dispid = get_dispid(disp, name)?;
    unsafe {
        let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
        let params = DISPPARAMS {
            rgvarg: if reversed.is_empty() {
                std::ptr::null_mut()
            } else {
                reversed.as_mut_ptr()
            },
            rgdispidNamedArgs: std::ptr::null_mut(),
            cArgs: reversed.len() as u32,
            cNamedArgs: 0,
        };
        let mut result = OwnedVariant::default();
        let mut except = EXCEPINFO::default();
        disp.Invoke(
            dispid,
            &GUID::zeroed(),
            GetSystemDefaultLCID(),
            DISPATCH_PROPERTYGET,
            &params,
            Some(result.as_mut_ptr()),
            Some(&mut except),
            None,
        )
        .map_err(|e| invoke_error(e, &except, name))?;
        Ok(result)
    }
}

/// A new reference to the object held by `v`; `v` keeps its own.
fn dispatch_in(v: &VARIANT, context: &str) -> Result<IDispatch, BridgeError> {
    let tag = super::variant::vt(v);
    if tag != crate::shape::VT_DISPATCH {
        return Err(BridgeError::HostAccess(format!(
            "'{}' returned {}, expected an object",
            context,
            crate::shape::describe_vt(tag)
        )));
    }
    let disp: &Option<IDispatch> = unsafe { &v.Anonymous.Anonymous.Anonymous.pdispVal };
    disp.clone()
        .ok_or_else(|| BridgeError::HostAccess(format!("'{}' returned Nothing", context)))
}

fn get_object(disp: &IDispatch, name: &str) -> Result<IDispatch, BridgeError> {
    dispatch_in(&get(disp, name, &[])?, name)
}

fn invoke_error(err: windows::core::Error, except: &EXCEPINFO, member: &str) -> BridgeError {
    if err.code() == DISP_E_EXCEPTION {
        let desc = if except.bstrDescription.is_empty() {
            String::from("(no description)")
        } else {
            except.bstrDescription.to_string()
        };
        BridgeError::HostAccess(format!("COM exception in '{}': {}", member, desc))
    } else {
        BridgeError::HostAccess(format!("Invoke('{}') failed: {}", member, err))
    }
}
