use thiserror::Error;

/// Failures that can occur while marshaling a call between the VBA host and
/// native code. None of these ever cross the boundary as structured data: the
/// export wrapper logs them and hands the host a sentinel value instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The host value is neither a Range nor a two dimensional array.
    #[error("Unsupported shape: {0}")]
    UnsupportedShape(String),

    #[error("Allocation failed: {0}")]
    AllocationFailure(String),

    /// Text could not be re-encoded between the narrow and wide forms.
    #[error("Conversion failed: {0}")]
    ConversionFailure(String),

    /// A call back into the host object (for example `Range.Cells`) failed.
    #[error("Host access failed: {0}")]
    HostAccess(String),
}

impl BridgeError {
    pub fn shape(msg: impl Into<String>) -> Self {
        BridgeError::UnsupportedShape(msg.into())
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        BridgeError::ConversionFailure(msg.into())
    }
}

impl From<std::collections::TryReserveError> for BridgeError {
    fn from(e: std::collections::TryReserveError) -> Self {
        BridgeError::AllocationFailure(e.to_string())
    }
}

impl From<std::string::FromUtf16Error> for BridgeError {
    fn from(_: std::string::FromUtf16Error) -> Self {
        BridgeError::ConversionFailure("wide text contains an unpaired surrogate".to_string())
    }
}

impl From<std::str::Utf8Error> for BridgeError {
    fn from(e: std::str::Utf8Error) -> Self {
        BridgeError::ConversionFailure(format!(
            "narrow text is not valid UTF-8 (invalid byte at offset {})",
            e.valid_up_to()
        ))
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for BridgeError {
    fn from(e: windows::core::Error) -> Self {
        BridgeError::HostAccess(format!("{} (hresult {:#010x})", e.message(), e.code().0 as u32))
    }
}
