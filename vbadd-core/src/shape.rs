//! Decides, from the VARIANT type tag alone, which kind of host value a call
//! received. This is the only place the dynamic tag is inspected; everything
//! after it works on the `HostValue` enum.

#![allow(non_upper_case_globals)]

use crate::error::BridgeError;

// VARENUM values from oaidl.h, mirrored so the classification does not depend
// on the Windows bindings.
pub const VT_EMPTY: u16 = 0;
pub const VT_NULL: u16 = 1;
pub const VT_I2: u16 = 2;
pub const VT_I4: u16 = 3;
pub const VT_R4: u16 = 4;
pub const VT_R8: u16 = 5;
pub const VT_CY: u16 = 6;
pub const VT_DATE: u16 = 7;
pub const VT_BSTR: u16 = 8;
pub const VT_DISPATCH: u16 = 9;
pub const VT_ERROR: u16 = 10;
pub const VT_BOOL: u16 = 11;
pub const VT_VARIANT: u16 = 12;
pub const VT_UI1: u16 = 17;
pub const VT_I8: u16 = 20;
pub const VT_ARRAY: u16 = 0x2000;
pub const VT_BYREF: u16 = 0x4000;
pub const VT_TYPEMASK: u16 = 0x0fff;

/// The two shapes the array bridge accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostShape {
    /// An object reference, expected to be an Excel Range.
    Range,
    /// A two dimensional SAFEARRAY whose elements have the given base type.
    Array { element: u16 },
}

/// Element types a two dimensional array may carry. `Dim Y(5, 1) As Variant`
/// gives `VT_VARIANT`; typed VBA arrays give the scalar tags.
pub fn is_supported_element(vt: u16) -> bool {
    matches!(
        vt,
        VT_VARIANT
            | VT_R8
            | VT_R4
            | VT_I2
            | VT_I4
            | VT_UI1
            | VT_I8
            | VT_CY
            | VT_DATE
            | VT_BSTR
            | VT_BOOL
    )
}

pub fn describe_vt(vt: u16) -> String {
    let base = match vt & VT_TYPEMASK {
        VT_EMPTY => "Empty",
        VT_NULL => "Null",
        VT_I2 => "Integer",
        VT_I4 => "Long",
        VT_R4 => "Single",
        VT_R8 => "Double",
        VT_CY => "Currency",
        VT_DATE => "Date",
        VT_BSTR => "String",
        VT_DISPATCH => "Object",
        VT_ERROR => "Error",
        VT_BOOL => "Boolean",
        VT_VARIANT => "Variant",
        VT_UI1 => "Byte",
        VT_I8 => "LongLong",
        _ => "Unknown",
    };
    let mut s = base.to_string();
    if vt & VT_ARRAY != 0 {
        s.push_str("()");
    }
    if vt & VT_BYREF != 0 {
        s.push_str(" ByRef");
    }
    format!("{} (vt={:#06x})", s, vt)
}

/// Classifies a host value. `dims` is the SAFEARRAY dimension count and is
/// only consulted for array tags. `VT_BYREF` is ignored: a by-reference array
/// or object has the same shape as the value it points at.
pub fn classify_shape(vt: u16, dims: u32) -> Result<HostShape, BridgeError> {
    let base = vt & VT_TYPEMASK;
    if vt & VT_ARRAY != 0 {
        if !is_supported_element(base) {
            return Err(BridgeError::shape(format!(
                "array element type {} is not supported",
                describe_vt(base)
            )));
        }
        return match dims {
            2 => Ok(HostShape::Array { element: base }),
            n => Err(BridgeError::shape(format!(
                "expected a two dimensional array, got {} dimension(s)",
                n
            ))),
        };
    }
    match base {
        VT_DISPATCH => Ok(HostShape::Range),
        _ => Err(BridgeError::shape(format!(
            "expected a Range or a 2-D array, got {}",
            describe_vt(vt)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_is_a_range() {
        assert_eq!(classify_shape(VT_DISPATCH, 0), Ok(HostShape::Range));
        assert_eq!(
            classify_shape(VT_DISPATCH | VT_BYREF, 0),
            Ok(HostShape::Range)
        );
    }

    #[test]
    fn variant_matrix_is_an_array() {
        assert_eq!(
            classify_shape(VT_ARRAY | VT_VARIANT, 2),
            Ok(HostShape::Array { element: VT_VARIANT })
        );
        assert_eq!(
            classify_shape(VT_ARRAY | VT_R8 | VT_BYREF, 2),
            Ok(HostShape::Array { element: VT_R8 })
        );
    }

    #[test]
    fn wrong_rank_is_rejected() {
        for dims in [0, 1, 3] {
            let err = classify_shape(VT_ARRAY | VT_VARIANT, dims).unwrap_err();
            assert!(matches!(err, BridgeError::UnsupportedShape(_)), "{dims}");
        }
    }

    #[test]
    fn scalars_are_rejected() {
        for vt in [VT_EMPTY, VT_R8, VT_BSTR, VT_BOOL, VT_ERROR] {
            let err = classify_shape(vt, 0).unwrap_err();
            assert!(matches!(err, BridgeError::UnsupportedShape(_)));
        }
    }

    #[test]
    fn object_arrays_are_rejected() {
        let err = classify_shape(VT_ARRAY | VT_DISPATCH, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported shape: array element type Object (vt=0x0009) is not supported"
        );
    }

    #[test]
    fn describe_flags() {
        assert_eq!(
            describe_vt(VT_ARRAY | VT_VARIANT | VT_BYREF),
            "Variant() ByRef (vt=0x600c)"
        );
    }
}
