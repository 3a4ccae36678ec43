//! `log` backend for a dll living inside a GUI host. There is no console, so on
//! Windows records go to `OutputDebugStringW` (watch them with a debugger or
//! DebugView); elsewhere they go to stderr.

use std::sync::OnceLock;

use log::{Log, Metadata, Record};

use crate::config::BridgeConfig;

struct DebugLogger;

static LOGGER: DebugLogger = DebugLogger;
static INIT: OnceLock<()> = OnceLock::new();

impl Log for DebugLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            debug_print(&format_record(record));
        }
    }

    fn flush(&self) {}
}

fn format_record(record: &Record) -> String {
    format!("[vba_bridge {}] {}", record.level(), record.args())
}

/// Installs the logger at the configured level. Safe to call on every export
/// entry; only the first call has an effect. If another logger is already set
/// (a test harness, say) it is left in place.
pub fn init() {
    INIT.get_or_init(|| {
        let config = BridgeConfig::global();
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(config.log_level);
        }
        for warning in &config.warnings {
            log::warn!("{}", warning);
        }
    });
}

#[cfg(windows)]
pub fn debug_print(msg: &str) {
    use windows::Win32::System::Diagnostics::Debug::OutputDebugStringW;
    use windows::core::PCWSTR;

    let wide: Vec<u16> = msg.encode_utf16().chain("\n\0".encode_utf16()).collect();
    unsafe { OutputDebugStringW(PCWSTR(wide.as_ptr())) };
}

#[cfg(not(windows))]
pub fn debug_print(msg: &str) {
    eprintln!("{}", msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_format_carries_level() {
        let line = format_record(
            &Record::builder()
                .args(format_args!("grid 3x1"))
                .level(log::Level::Debug)
                .build(),
        );
        assert_eq!(line, "[vba_bridge DEBUG] grid 3x1");
    }

    #[test]
    fn init_twice_is_harmless() {
        init();
        init();
        log::debug!("still alive");
    }
}
