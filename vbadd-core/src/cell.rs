use std::fmt;

use crate::error::BridgeError;

/// A single spreadsheet value as it crosses the boundary. The variant kind is
/// preserved end to end: numbers stay numbers, text stays text and an empty
/// cell remains `Empty` rather than turning into 0 or "".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    Number(f64),
    Text(String),
    Boolean(bool),
    #[default]
    Empty,
    /// A host error value such as `#N/A`, holding the raw SCODE.
    Error(i32),
}

/// SCODE that VBA's `CVErr(xlErrValue)` produces. `IsError()` is true for it.
pub const CVERR_VALUE: i32 = 0x800A_07DF_u32 as i32;
pub const CVERR_NA: i32 = 0x800A_07FA_u32 as i32;

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Formats the cell the way VBA's `CStr` would for the scalar kinds. Error
    /// cells have no textual form.
    pub fn to_text(&self) -> Result<String, BridgeError> {
        match self {
            Cell::Error(code) => Err(BridgeError::conversion(format!(
                "cell holds host error {:#010x}",
                *code as u32
            ))),
            other => Ok(other.to_string()),
        }
    }
}

/// Formats a Double as VBA's `CStr` does: at most 15 significant digits,
/// switching to `1E+20` notation for exponents below -4 or from 15 up.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if !n.is_finite() {
        return n.to_string();
    }
    let sci = format!("{:.14e}", n);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if !(-4..15).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}E{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let decimals = (14 - exp) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cell::Number(n) => write!(f, "{}", format_number(*n)),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Boolean(true) => write!(f, "TRUE"),
            Cell::Boolean(false) => write!(f, "FALSE"),
            Cell::Empty => Ok(()),
            Cell::Error(code) if *code == CVERR_NA => write!(f, "#N/A"),
            Cell::Error(code) if *code == CVERR_VALUE => write!(f, "#VALUE!"),
            Cell::Error(code) => write!(f, "#ERR {:#010x}", *code as u32),
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Cell {
        Cell::Number(n)
    }
}

impl From<i32> for Cell {
    fn from(n: i32) -> Cell {
        Cell::Number(n as f64)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Cell {
        Cell::Boolean(b)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Cell {
        Cell::Text(s)
    }
}

/// A single cell taken from whatever the host passed by value: a scalar, the
/// top-left cell of a Range or the first element of an array.
#[derive(Debug, Clone, PartialEq)]
pub struct HostCell(pub Cell);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_format_like_cstr() {
        assert_eq!(Cell::from(10).to_string(), "10");
        assert_eq!(Cell::from(2.5).to_string(), "2.5");
        assert_eq!(Cell::from(-0.125).to_string(), "-0.125");
    }

    #[test]
    fn numbers_round_to_fifteen_digits() {
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(1.0 / 3.0), "0.333333333333333");
        assert_eq!(format_number(123456789012345.0), "123456789012345");
        assert_eq!(format_number(100.0), "100");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.0001), "0.0001");
    }

    #[test]
    fn large_and_small_numbers_use_exponent_form() {
        assert_eq!(format_number(1e20), "1E+20");
        assert_eq!(format_number(1e15), "1E+15");
        assert_eq!(format_number(-2.5e100), "-2.5E+100");
        assert_eq!(format_number(0.00001), "1E-05");
        assert_eq!(format_number(1.0 / 3.0 * 1e-5), "3.33333333333333E-06");
    }

    #[test]
    fn booleans_and_empty() {
        assert_eq!(Cell::from(true).to_text().unwrap(), "TRUE");
        assert_eq!(Cell::from(false).to_text().unwrap(), "FALSE");
        assert_eq!(Cell::Empty.to_text().unwrap(), "");
        assert!(Cell::default().is_empty());
    }

    #[test]
    fn error_cells_have_no_text() {
        let err = Cell::Error(CVERR_NA).to_text().unwrap_err();
        assert!(matches!(err, BridgeError::ConversionFailure(_)));
        assert_eq!(Cell::Error(CVERR_NA).to_string(), "#N/A");
    }
}
