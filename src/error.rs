//! Internal error taxonomy (§7).
//!
//! The public API never propagates these as `Result` - every documented
//! entry point returns a plain `bool`/`Option` per the "never panic" rule in
//! §4.4.6. `HsmError` exists for the one genuinely fallible internal helper
//! (debug-log file I/O) where a bare `bool` would lose the reason for the
//! failure that log output wants. Every other kind in §7's table surfaces
//! through its documented boolean/callback propagation instead of this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HsmError {
    #[error("debug log I/O error: {0}")]
    DebugLogIo(#[from] std::io::Error),

    #[error("debug log serialization error: {0}")]
    DebugLogSerialize(#[from] serde_json::Error),
}

pub type HsmResult<T> = Result<T, HsmError>;
