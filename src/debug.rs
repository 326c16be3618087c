//! Debug logging utilities for nvram.
//!
//! Set the `NVRAM_DEBUG` environment variable to enable verbose logging:
//! - `NVRAM_DEBUG=1` - Enable all debug output
//! - `NVRAM_DEBUG=cmos` - Enable only CMOS byte/codec logs
//! - `NVRAM_DEBUG=layout` - Enable only layout loading logs
//! - `NVRAM_DEBUG=table` - Enable only coreboot table scan logs
//! - `NVRAM_DEBUG=cmos,table` - Enable multiple categories

use std::sync::OnceLock;

/// Debug categories that can be enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCategory {
    Cmos,
    Layout,
    Table,
    All,
}

/// Cached debug configuration
static DEBUG_CONFIG: OnceLock<DebugConfig> = OnceLock::new();

#[derive(Debug, Default)]
struct DebugConfig {
    enabled: bool,
    cmos: bool,
    layout: bool,
    table: bool,
}

impl DebugConfig {
    fn from_env() -> Self {
        match std::env::var("NVRAM_DEBUG") {
            Ok(val) if val == "1" || val.to_lowercase() == "all" => Self {
                enabled: true,
                cmos: true,
                layout: true,
                table: true,
            },
            Ok(val) => {
                let val_lower = val.to_lowercase();
                Self {
                    enabled: true,
                    cmos: val_lower.contains("cmos"),
                    layout: val_lower.contains("layout"),
                    table: val_lower.contains("table"),
                }
            }
            Err(_) => Self::default(),
        }
    }
}

fn get_config() -> &'static DebugConfig {
    DEBUG_CONFIG.get_or_init(DebugConfig::from_env)
}

/// Check if debug logging is enabled for a category
pub fn is_debug_enabled(category: DebugCategory) -> bool {
    let config = get_config();
    if !config.enabled {
        return false;
    }
    match category {
        DebugCategory::All => config.cmos || config.layout || config.table,
        DebugCategory::Cmos => config.cmos,
        DebugCategory::Layout => config.layout,
        DebugCategory::Table => config.table,
    }
}

/// Debug print macro for CMOS codec and accessor logs
#[macro_export]
macro_rules! debug_cmos {
    ($($arg:tt)*) => {
        if $crate::debug::is_debug_enabled($crate::debug::DebugCategory::Cmos) {
            eprintln!($($arg)*);
        }
    };
}

/// Debug print macro for layout loading logs
#[macro_export]
macro_rules! debug_layout {
    ($($arg:tt)*) => {
        if $crate::debug::is_debug_enabled($crate::debug::DebugCategory::Layout) {
            eprintln!($($arg)*);
        }
    };
}

/// Debug print macro for coreboot table scan logs
#[macro_export]
macro_rules! debug_table {
    ($($arg:tt)*) => {
        if $crate::debug::is_debug_enabled($crate::debug::DebugCategory::Table) {
            eprintln!($($arg)*);
        }
    };
}
