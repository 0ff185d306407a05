//! Engine tuning and leniency parameters

/// Parameters threaded through every parsing and extraction call.
///
/// The leniency flags are explicit parameters rather than ambient state so
/// strict-vs-salvage behavior is visible at each call site and testable
/// independently of I/O.
#[derive(Debug, Clone)]
pub struct Options {
    /// Downgrade recoverable structural errors (out-of-range folder
    /// indices, oversized blocks, truncated folders) to warnings and keep
    /// going with best-effort data. Signature mismatches stay fatal.
    pub salvage: bool,
    /// Ignore per-block checksum mismatches, warning instead of failing.
    pub tolerate_bad_checksums: bool,
    /// Initial capacity for block staging buffers.
    pub input_buffer_size: usize,
    /// Read granularity of the embedded-archive signature scanner.
    pub search_buffer_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            salvage: false,
            tolerate_bad_checksums: false,
            input_buffer_size: 4096,
            search_buffer_size: 32768,
        }
    }
}

impl Options {
    /// Strict defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with salvage mode enabled.
    pub fn lenient() -> Self {
        Self {
            salvage: true,
            ..Self::default()
        }
    }
}
