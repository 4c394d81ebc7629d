//! Import attempt state machine.

use std::fmt;

/// Stage of one import attempt.
///
/// Attempts move `Pending -> Sniffing -> Converting -> Done`; the failure
/// stages are terminal exits. Stored as a `u8` in the registry so stage
/// changes are lock-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ImportStage {
    /// Record resolved or created, nothing inspected yet
    Pending = 0,
    /// Classifying and normalizing the upload
    Sniffing = 1,
    /// Converter running in the background
    Converting = 2,
    /// Converted and published
    Done = 3,
    /// Upload unreadable or not extractable
    FailedSniff = 4,
    /// Converter failed, timed out, or was cancelled
    FailedConvert = 5,
    /// Recognised format without a converter
    Unsupported = 6,
}

impl ImportStage {
    /// All stages, in discriminant order.
    pub const ALL: [ImportStage; 7] = [
        Self::Pending,
        Self::Sniffing,
        Self::Converting,
        Self::Done,
        Self::FailedSniff,
        Self::FailedConvert,
        Self::Unsupported,
    ];

    /// Converts from u8 representation.
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Returns true for stages an attempt never leaves.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::FailedSniff | Self::FailedConvert | Self::Unsupported
        )
    }

    /// Returns true if an attempt in `self` may move to `next`.
    pub fn can_advance_to(&self, next: ImportStage) -> bool {
        use ImportStage::*;
        matches!(
            (self, next),
            (Pending, Sniffing)
                | (Sniffing, Converting)
                | (Sniffing, FailedSniff)
                | (Sniffing, Unsupported)
                | (Converting, Done)
                | (Converting, FailedConvert)
        )
    }

    /// Returns the stage name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sniffing => "sniffing",
            Self::Converting => "converting",
            Self::Done => "done",
            Self::FailedSniff => "failed_sniff",
            Self::FailedConvert => "failed_convert",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
