use std::path::PathBuf;
use thiserror::Error;

/// Every recoverable decode condition maps to one bit of the per-event error
/// mask. The bit positions follow the readout firmware's error register
/// layout; bit 2 is a reserved slot that is never set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventError {
    FtswMismatch = 0,
    DhhcDhhMismatch = 1,
    /// Reserved slot, kept for register layout compatibility.
    DhhcDhpMismatch = 2,
    DhhcStartMissing = 3,
    DhhcEndMissing = 4,
    DhhStartMissing = 5,
    FramecountMismatch = 6,
    DataOutsideDhh = 7,
    DhhcStart2 = 8,
    DhhcEnd2 = 9,
    FixedSizeMismatch = 10,
    DhhCrcError = 11,
    DhhcUnknownType = 12,
    MergerCrcError = 13,
    PacketSizeError = 14,
    MagicError = 15,
    FrameNrError = 16,
    FrameSizeError = 17,
    HltroiMagicError = 18,
    MergerTrignrMismatch = 19,
    DhpSizeError = 20,
    DhhDhpIdMismatch = 21,
    DhhDhpPortMismatch = 22,
    DhpPixelWithoutRow = 23,
    DhhStartEndIdMismatch = 24,
    DhhStartIdMismatch = 25,
    DhhStartWithoutEnd = 26,
    WrongPxdCount = 27,
    NoDatconError = 28,
    FakeTriggerNoData = 29,
    DhhActiveMismatch = 30,
    DhpActiveMismatch = 31,
}

/// Number of error kinds (and counters in the run statistics).
pub const NUM_EVENT_ERRORS: usize = 32;

impl EventError {
    /// All kinds in bit order, for statistics reporting.
    pub const ALL: [EventError; NUM_EVENT_ERRORS] = [
        EventError::FtswMismatch,
        EventError::DhhcDhhMismatch,
        EventError::DhhcDhpMismatch,
        EventError::DhhcStartMissing,
        EventError::DhhcEndMissing,
        EventError::DhhStartMissing,
        EventError::FramecountMismatch,
        EventError::DataOutsideDhh,
        EventError::DhhcStart2,
        EventError::DhhcEnd2,
        EventError::FixedSizeMismatch,
        EventError::DhhCrcError,
        EventError::DhhcUnknownType,
        EventError::MergerCrcError,
        EventError::PacketSizeError,
        EventError::MagicError,
        EventError::FrameNrError,
        EventError::FrameSizeError,
        EventError::HltroiMagicError,
        EventError::MergerTrignrMismatch,
        EventError::DhpSizeError,
        EventError::DhhDhpIdMismatch,
        EventError::DhhDhpPortMismatch,
        EventError::DhpPixelWithoutRow,
        EventError::DhhStartEndIdMismatch,
        EventError::DhhStartIdMismatch,
        EventError::DhhStartWithoutEnd,
        EventError::WrongPxdCount,
        EventError::NoDatconError,
        EventError::FakeTriggerNoData,
        EventError::DhhActiveMismatch,
        EventError::DhpActiveMismatch,
    ];

    pub fn bit(self) -> u32 {
        1u32 << (self as u8)
    }

    /// Short description used in the run-end statistics table.
    pub fn description(self) -> &'static str {
        match self {
            EventError::FtswMismatch => "FTSW/DHHC mismatch",
            EventError::DhhcDhhMismatch => "DHHC/DHH mismatch",
            EventError::DhhcDhpMismatch => "DHHC/DHP mismatch (reserved)",
            EventError::DhhcStartMissing => "DHHC_START missing",
            EventError::DhhcEndMissing => "DHHC_END missing",
            EventError::DhhStartMissing => "DHH_START missing",
            EventError::FramecountMismatch => "DHHC framecount mismatch",
            EventError::DataOutsideDhh => "Data outside of DHH",
            EventError::DhhcStart2 => "Second DHHC_START",
            EventError::DhhcEnd2 => "Second DHHC_END",
            EventError::FixedSizeMismatch => "Fixed size frame wrong size",
            EventError::DhhCrcError => "DHH CRC error",
            EventError::DhhcUnknownType => "Unknown DHHC type",
            EventError::MergerCrcError => "Merger CRC error",
            EventError::PacketSizeError => "Event header full packet size error",
            EventError::MagicError => "Event header magic error",
            EventError::FrameNrError => "Event header frame count error",
            EventError::FrameSizeError => "Event header frame size error",
            EventError::HltroiMagicError => "HLTROI magic error",
            EventError::MergerTrignrMismatch => "Merger HLT/DATCON trigger number mismatch",
            EventError::DhpSizeError => "DHP size too small",
            EventError::DhhDhpIdMismatch => "DHP-DHH DHH id mismatch",
            EventError::DhhDhpPortMismatch => "DHP-DHH port mismatch",
            EventError::DhpPixelWithoutRow => "DHP pixel without row",
            EventError::DhhStartEndIdMismatch => "DHH START/END id mismatch",
            EventError::DhhStartIdMismatch => "DHH id mismatch of START and this frame",
            EventError::DhhStartWithoutEnd => "DHH_START without previous END",
            EventError::WrongPxdCount => "Number of PXD packets != 1",
            EventError::NoDatconError => "Missing DATCON",
            EventError::FakeTriggerNoData => "No DHHC data for trigger",
            EventError::DhhActiveMismatch => "DHH active mismatch",
            EventError::DhpActiveMismatch => "DHP active mismatch",
        }
    }
}

/// The per-event 32-bit error accumulator. Conditions are OR-ed in as the
/// walker encounters them and surfaced together at the end of the event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventErrorFlags(u32);

impl EventErrorFlags {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, kind: EventError) {
        self.0 |= kind.bit();
    }

    pub fn contains(&self, kind: EventError) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = EventError> + '_ {
        EventError::ALL.iter().copied().filter(|k| self.contains(*k))
    }
}

impl std::fmt::Display for EventErrorFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for kind in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", kind.description())?;
            first = false;
        }
        Ok(())
    }
}

/// Structural violations of the event packet itself. These reject the whole
/// event; no partial output is produced.
#[derive(Debug, Clone, Error)]
pub enum PacketError {
    #[error("Invalid packet size {0} bytes")]
    PacketSize(usize),
    #[error("Header magic invalid: {0:#010x}")]
    BadMagic(u32),
    #[error("Number of frames invalid: {0}")]
    FrameCount(u32),
    #[error("Frame {index} size {size} exceeds payload region of {region} bytes at offset {offset}")]
    FrameOverrun {
        index: usize,
        size: usize,
        offset: usize,
        region: usize,
    },
    #[error("Frame {0} has size zero")]
    EmptyFrame(usize),
}

impl PacketError {
    /// The event-mask bit a structural rejection surfaces as.
    pub fn flag(&self) -> EventError {
        match self {
            PacketError::PacketSize(_) => EventError::PacketSizeError,
            PacketError::BadMagic(_) => EventError::MagicError,
            PacketError::FrameCount(_) => EventError::FrameNrError,
            PacketError::FrameOverrun { .. } | PacketError::EmptyFrame(_) => {
                EventError::FrameSizeError
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RawFileError {
    #[error("Could not open ONSEN dump because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("ONSEN dump event header has invalid magic {0:#010x}")]
    BadMagic(u32),
    #[error("ONSEN dump event declares {0} frames; the format allows at most 256")]
    TooManyFrames(u32),
    #[error("ONSEN dump ended in the middle of an event")]
    Truncated,
    #[error("ONSEN dump failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to RawFile error: {0}")]
    FileError(#[from] RawFileError),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_positions_match_register_layout() {
        assert_eq!(EventError::FtswMismatch.bit(), 0x0000_0001);
        assert_eq!(EventError::DhhcStartMissing.bit(), 0x0000_0008);
        assert_eq!(EventError::DhhCrcError.bit(), 0x0000_0800);
        assert_eq!(EventError::MagicError.bit(), 0x0000_8000);
        assert_eq!(EventError::DhpSizeError.bit(), 0x0010_0000);
        assert_eq!(EventError::DhpActiveMismatch.bit(), 0x8000_0000);
    }

    #[test]
    fn test_flags_accumulate() {
        let mut flags = EventErrorFlags::new();
        assert!(flags.is_empty());
        flags.insert(EventError::DhhCrcError);
        flags.insert(EventError::NoDatconError);
        flags.insert(EventError::DhhCrcError);
        assert!(flags.contains(EventError::DhhCrcError));
        assert!(flags.contains(EventError::NoDatconError));
        assert!(!flags.contains(EventError::MagicError));
        assert_eq!(flags.iter().count(), 2);
    }

    #[test]
    fn test_all_table_is_in_bit_order() {
        for (i, kind) in EventError::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, i);
        }
    }
}
