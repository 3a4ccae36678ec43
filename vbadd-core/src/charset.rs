//! Conversion between narrow (`char*`) and wide (`wchar_t*`, UTF-16) text.
//! Both directions stop at the first NUL and reject malformed input rather
//! than substituting replacement characters.
//!
//! On Windows the narrow form is the active ANSI code page, which is what VBA
//! marshals a `ByVal s As String` argument and an `As String` return into.
//! Elsewhere it is UTF-8.

use std::ffi::{CStr, c_char};

use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Widen,
    Narrow,
}

/// Text in either representation, as returned by [`charset_convert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Text {
    Narrow(Vec<u8>),
    Wide(Vec<u16>),
}

fn until_nul<T: Copy + Default + PartialEq>(units: &[T]) -> &[T] {
    let end = units
        .iter()
        .position(|u| *u == T::default())
        .unwrap_or(units.len());
    &units[..end]
}

#[cfg(not(windows))]
fn decode_narrow(bytes: &[u8]) -> Result<Vec<u16>, BridgeError> {
    Ok(std::str::from_utf8(bytes)?.encode_utf16().collect())
}

#[cfg(not(windows))]
fn encode_wide(units: &[u16]) -> Result<Vec<u8>, BridgeError> {
    Ok(String::from_utf16(units)?.into_bytes())
}

#[cfg(windows)]
use codepage::{decode as decode_narrow, encode as encode_wide};

#[cfg(windows)]
mod codepage {
    use windows::Win32::Globalization::{
        CP_ACP, GetACP, MB_ERR_INVALID_CHARS, MultiByteToWideChar, WC_NO_BEST_FIT_CHARS,
        WideCharToMultiByte,
    };
    use windows::core::PCSTR;

    use crate::error::BridgeError;

    pub fn decode(bytes: &[u8]) -> Result<Vec<u16>, BridgeError> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let len = unsafe { MultiByteToWideChar(CP_ACP, MB_ERR_INVALID_CHARS, bytes, None) };
        if len <= 0 {
            return Err(BridgeError::conversion(format!(
                "narrow text is not valid in code page {}",
                unsafe { GetACP() }
            )));
        }
        let mut units = Vec::new();
        units.try_reserve_exact(len as usize)?;
        units.resize(len as usize, 0u16);
        let written =
            unsafe { MultiByteToWideChar(CP_ACP, MB_ERR_INVALID_CHARS, bytes, Some(&mut units)) };
        if written <= 0 {
            return Err(BridgeError::conversion("MultiByteToWideChar failed"));
        }
        units.truncate(written as usize);
        Ok(units)
    }

    pub fn encode(units: &[u16]) -> Result<Vec<u8>, BridgeError> {
        // lone surrogates fail here with the same error on every platform
        String::from_utf16(units)?;
        if units.is_empty() {
            return Ok(Vec::new());
        }
        let len = unsafe {
            WideCharToMultiByte(CP_ACP, WC_NO_BEST_FIT_CHARS, units, None, PCSTR::null(), None)
        };
        if len <= 0 {
            return Err(BridgeError::conversion("WideCharToMultiByte failed"));
        }
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len as usize)?;
        bytes.resize(len as usize, 0u8);
        let written = unsafe {
            WideCharToMultiByte(
                CP_ACP,
                WC_NO_BEST_FIT_CHARS,
                units,
                Some(&mut bytes),
                PCSTR::null(),
                None,
            )
        };
        if written <= 0 {
            return Err(BridgeError::conversion("WideCharToMultiByte failed"));
        }
        bytes.truncate(written as usize);
        // unmappable characters come out as the default char, so compare
        if decode(&bytes)? != units {
            return Err(BridgeError::conversion(format!(
                "text has characters outside code page {}",
                unsafe { GetACP() }
            )));
        }
        Ok(bytes)
    }
}

/// Decodes wide text up to the first NUL.
pub fn wide_to_string(units: &[u16]) -> Result<String, BridgeError> {
    Ok(String::from_utf16(until_nul(units))?)
}

/// Narrow to wide. The result carries no terminator.
pub fn widen(bytes: &[u8]) -> Result<Vec<u16>, BridgeError> {
    decode_narrow(until_nul(bytes))
}

/// Wide to narrow. The result carries no terminator.
pub fn narrow(units: &[u16]) -> Result<Vec<u8>, BridgeError> {
    encode_wide(until_nul(units))
}

pub fn charset_convert(text: &Text, direction: Direction) -> Result<Text, BridgeError> {
    match (text, direction) {
        (Text::Narrow(bytes), Direction::Widen) => Ok(Text::Wide(widen(bytes)?)),
        (Text::Wide(units), Direction::Narrow) => Ok(Text::Narrow(narrow(units)?)),
        (Text::Narrow(bytes), Direction::Narrow) => Ok(Text::Narrow(narrow(&widen(bytes)?)?)),
        (Text::Wide(units), Direction::Widen) => {
            Ok(Text::Wide(wide_to_string(units)?.encode_utf16().collect()))
        }
    }
}

/// Decodes narrow text up to the first NUL.
pub fn narrow_to_string(bytes: &[u8]) -> Result<String, BridgeError> {
    match charset_convert(&Text::Narrow(bytes.to_vec()), Direction::Widen)? {
        Text::Wide(units) => Ok(String::from_utf16(&units)?),
        Text::Narrow(_) => Err(BridgeError::conversion("narrow text did not widen")),
    }
}

/// Encodes `text` in the narrow form the host expects back. Text containing a
/// NUL is rejected since the host could never see past it.
pub fn encode_narrow(text: &str) -> Result<Vec<u8>, BridgeError> {
    if text.contains('\0') {
        return Err(BridgeError::conversion("text contains an embedded NUL"));
    }
    match charset_convert(&Text::Wide(text.encode_utf16().collect()), Direction::Narrow)? {
        Text::Narrow(bytes) => Ok(bytes),
        Text::Wide(_) => Err(BridgeError::conversion("wide text did not narrow")),
    }
}

/// Reads a NUL terminated narrow string supplied by the host.
///
/// # Safety
/// `ptr` must be null or point at a readable, NUL terminated buffer that
/// stays alive for the duration of the call.
pub unsafe fn narrow_from_ptr(ptr: *const c_char) -> Result<String, BridgeError> {
    if ptr.is_null() {
        return Err(BridgeError::conversion("null string pointer"));
    }
    let cstr = unsafe { CStr::from_ptr(ptr) };
    narrow_to_string(cstr.to_bytes())
}

/// Reads a NUL terminated wide string supplied by the host.
///
/// # Safety
/// `ptr` must be null or point at a readable, NUL terminated UTF-16 buffer
/// that stays alive for the duration of the call.
pub unsafe fn wide_from_ptr(ptr: *const u16) -> Result<String, BridgeError> {
    if ptr.is_null() {
        return Err(BridgeError::conversion("null string pointer"));
    }
    let mut len = 0usize;
    unsafe {
        while *ptr.add(len) != 0 {
            len += 1;
        }
        wide_to_string(std::slice::from_raw_parts(ptr, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trips() {
        for s in ["", "hello", "tab\tand\nnewline", "~!@#$%^&*()"] {
            let wide = widen(s.as_bytes()).unwrap();
            assert_eq!(wide, s.encode_utf16().collect::<Vec<_>>());
            assert_eq!(narrow(&wide).unwrap(), s.as_bytes(), "{s}");
        }
    }

    #[test]
    fn stops_at_first_nul() {
        assert_eq!(widen(b"abc\0def").unwrap(), "abc".encode_utf16().collect::<Vec<_>>());
        let units: Vec<u16> = "xy\0z".encode_utf16().collect();
        assert_eq!(narrow(&units).unwrap(), b"xy");
    }

    #[test]
    fn lone_surrogate_is_rejected() {
        let err = narrow(&[0x0041, 0xd800, 0x0042]).unwrap_err();
        assert_eq!(
            err,
            BridgeError::ConversionFailure("wide text contains an unpaired surrogate".to_string())
        );
    }

    #[test]
    fn convert_by_direction() {
        let wide = charset_convert(&Text::Narrow(b"abc".to_vec()), Direction::Widen).unwrap();
        assert_eq!(wide, Text::Wide(vec![0x61, 0x62, 0x63]));
        let back = charset_convert(&wide, Direction::Narrow).unwrap();
        assert_eq!(back, Text::Narrow(b"abc".to_vec()));
        let same = charset_convert(&Text::Wide(vec![0x61, 0, 0x62]), Direction::Widen).unwrap();
        assert_eq!(same, Text::Wide(vec![0x61]));
        let same = charset_convert(&Text::Narrow(b"ab\0c".to_vec()), Direction::Narrow).unwrap();
        assert_eq!(same, Text::Narrow(b"ab".to_vec()));
    }

    #[test]
    fn encode_narrow_rejects_embedded_nul() {
        assert_eq!(encode_narrow("ok").unwrap(), b"ok");
        assert!(matches!(
            encode_narrow("a\0b"),
            Err(BridgeError::ConversionFailure(_))
        ));
    }

    #[test]
    fn pointers_are_scanned_to_terminator() {
        let narrow = b"upper\0ignored";
        let wide: Vec<u16> = "wide\0ignored".encode_utf16().collect();
        unsafe {
            assert_eq!(narrow_from_ptr(narrow.as_ptr() as *const c_char).unwrap(), "upper");
            assert_eq!(wide_from_ptr(wide.as_ptr()).unwrap(), "wide");
            assert!(narrow_from_ptr(std::ptr::null()).is_err());
            assert!(wide_from_ptr(std::ptr::null()).is_err());
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn utf8_round_trips_null_free_text() {
        for s in ["Grüße", "日本語", "emoji 🦀 ok"] {
            let wide = widen(s.as_bytes()).unwrap();
            assert_eq!(narrow(&wide).unwrap(), s.as_bytes(), "{s}");
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn invalid_utf8_is_rejected() {
        let err = widen(&[b'o', b'k', 0xc3]).unwrap_err();
        assert!(matches!(err, BridgeError::ConversionFailure(_)));
    }

    #[cfg(windows)]
    #[test]
    fn narrow_text_uses_the_ansi_code_page() {
        use windows::Win32::Globalization::GetACP;
        match unsafe { GetACP() } {
            1252 => {
                assert_eq!(narrow_to_string(b"caf\xe9").unwrap(), "café");
                assert_eq!(encode_narrow("café").unwrap(), b"caf\xe9");
            }
            65001 => {
                assert_eq!(narrow_to_string("café".as_bytes()).unwrap(), "café");
            }
            _ => {}
        }
    }

    #[cfg(windows)]
    #[test]
    fn characters_outside_the_code_page_are_rejected() {
        use windows::Win32::Globalization::GetACP;
        if unsafe { GetACP() } != 65001 {
            let err = encode_narrow("crab 🦀").unwrap_err();
            assert!(matches!(err, BridgeError::ConversionFailure(_)));
        }
    }
}
