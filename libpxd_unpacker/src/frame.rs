//! The DHHC frame registry: header word decoding, the closed set of frame
//! kinds and a validating parse into typed, read-only frame views.
//!
//! A 4-bit code in the first header word selects the frame kind. Parsing
//! yields a variant of [`Frame`] and every later operation pattern-matches
//! on it, so a wrong-kind field access cannot compile.

use super::constants::*;
use super::roi::HltroiFrame;
use super::wire;

/// The first 16-bit word of every frame: bits [10:0] carry type-specific
/// payload ("misc"), bits [14:11] the frame type code, bit 15 an inline
/// error flag raised by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeaderWord0(u16);

impl FrameHeaderWord0 {
    pub fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    pub fn frame_type(&self) -> FrameType {
        FrameType::from_code(((self.0 >> 11) & 0xF) as u8)
    }

    pub fn error_flag(&self) -> bool {
        (self.0 >> 15) & 0x1 != 0
    }

    pub fn misc(&self) -> u16 {
        self.0 & 0x7FF
    }
}

/// The closed set of frame kinds of the DHHC event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    DhpRaw,
    FceRaw,
    Ghost,
    DhhStart,
    DhhEnd,
    DhpZsd,
    Commode,
    FceOnsen,
    DhhcStart,
    DhhcEnd,
    DhpOnsen,
    Hltroi,
    Unknown(u8),
}

impl FrameType {
    pub fn from_code(code: u8) -> Self {
        match code {
            TYPE_DHP_RAW => FrameType::DhpRaw,
            TYPE_FCE_RAW => FrameType::FceRaw,
            TYPE_GHOST => FrameType::Ghost,
            TYPE_DHH_START => FrameType::DhhStart,
            TYPE_DHH_END => FrameType::DhhEnd,
            TYPE_DHP_ZSD => FrameType::DhpZsd,
            TYPE_COMMODE => FrameType::Commode,
            TYPE_FCE_ONSEN => FrameType::FceOnsen,
            TYPE_DHHC_START => FrameType::DhhcStart,
            TYPE_DHHC_END => FrameType::DhhcEnd,
            TYPE_DHP_ONSEN => FrameType::DhpOnsen,
            TYPE_HLTROI => FrameType::Hltroi,
            other => FrameType::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            FrameType::DhpRaw => TYPE_DHP_RAW,
            FrameType::FceRaw => TYPE_FCE_RAW,
            FrameType::Ghost => TYPE_GHOST,
            FrameType::DhhStart => TYPE_DHH_START,
            FrameType::DhhEnd => TYPE_DHH_END,
            FrameType::DhpZsd => TYPE_DHP_ZSD,
            FrameType::Commode => TYPE_COMMODE,
            FrameType::FceOnsen => TYPE_FCE_ONSEN,
            FrameType::DhhcStart => TYPE_DHHC_START,
            FrameType::DhhcEnd => TYPE_DHHC_END,
            FrameType::DhpOnsen => TYPE_DHP_ONSEN,
            FrameType::Hltroi => TYPE_HLTROI,
            FrameType::Unknown(code) => *code,
        }
    }

    /// Byte length of fixed-size frame kinds. `None` means the length is
    /// variable and must be taken from the event's frame table, never from
    /// the frame content.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            FrameType::DhhcStart => Some(18),
            FrameType::DhhcEnd => Some(16),
            FrameType::DhhStart => Some(14),
            FrameType::DhhEnd => Some(16),
            FrameType::Ghost => Some(8),
            FrameType::Commode => Some(200),
            _ => None,
        }
    }

    /// Smallest frame length for which all field accessors of the kind are
    /// in bounds. Shorter frames cannot be parsed at all.
    fn min_size(&self) -> usize {
        self.fixed_size().unwrap_or(4)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameType::DhpRaw => "DHP_RAW",
            FrameType::FceRaw => "FCE_RAW",
            FrameType::Ghost => "GHOST",
            FrameType::DhhStart => "DHH_START",
            FrameType::DhhEnd => "DHH_END",
            FrameType::DhpZsd => "DHP_ZSD",
            FrameType::Commode => "COMMODE",
            FrameType::FceOnsen => "FCE_ONSEN",
            FrameType::DhhcStart => "DHHC_START",
            FrameType::DhhcEnd => "DHHC_END",
            FrameType::DhpOnsen => "DHP_ONSEN",
            FrameType::Hltroi => "HLTROI",
            FrameType::Unknown(_) => "undef",
        }
    }

    pub fn is_direct_readout(&self) -> bool {
        matches!(
            self,
            FrameType::DhpRaw | FrameType::DhpZsd | FrameType::DhpOnsen
        )
    }
}

/// A frame too short to hold the fields of its declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTooShort {
    pub kind: FrameType,
    pub len: usize,
}

/// One frame of the event stream, parsed into its typed view.
#[derive(Debug, Clone)]
pub enum Frame<'a> {
    DhhcStart(DhhcStartFrame<'a>),
    DhhcEnd(DhhcEndFrame<'a>),
    DhhStart(DhhStartFrame<'a>),
    DhhEnd(DhhEndFrame<'a>),
    Ghost(GhostFrame<'a>),
    Commode(CommodeFrame<'a>),
    DirectReadout(DirectReadoutFrame<'a>),
    Fce(FceFrame<'a>),
    Hltroi(HltroiFrame<'a>),
    Unknown(UnknownFrame<'a>),
}

impl<'a> Frame<'a> {
    /// Classify and validate one frame. The slice is the frame's bytes as
    /// declared by the event's frame table, padding excluded.
    pub fn parse(bytes: &'a [u8]) -> Result<Frame<'a>, FrameTooShort> {
        if bytes.len() < 4 {
            return Err(FrameTooShort {
                kind: FrameType::Unknown(0),
                len: bytes.len(),
            });
        }
        let word0 = FrameHeaderWord0::new(wire::u16_at(bytes, 0));
        let kind = word0.frame_type();
        if bytes.len() < kind.min_size() {
            return Err(FrameTooShort {
                kind,
                len: bytes.len(),
            });
        }
        Ok(match kind {
            FrameType::DhhcStart => Frame::DhhcStart(DhhcStartFrame { bytes }),
            FrameType::DhhcEnd => Frame::DhhcEnd(DhhcEndFrame { bytes }),
            FrameType::DhhStart => Frame::DhhStart(DhhStartFrame { bytes }),
            FrameType::DhhEnd => Frame::DhhEnd(DhhEndFrame { bytes }),
            FrameType::Ghost => Frame::Ghost(GhostFrame { bytes }),
            FrameType::Commode => Frame::Commode(CommodeFrame { bytes }),
            FrameType::DhpRaw | FrameType::DhpZsd | FrameType::DhpOnsen => {
                Frame::DirectReadout(DirectReadoutFrame { bytes, kind })
            }
            FrameType::FceRaw => Frame::Fce(FceFrame { bytes }),
            FrameType::Hltroi => Frame::Hltroi(HltroiFrame::new(bytes)),
            FrameType::FceOnsen | FrameType::Unknown(_) => {
                Frame::Unknown(UnknownFrame { bytes })
            }
        })
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::DhhcStart(_) => FrameType::DhhcStart,
            Frame::DhhcEnd(_) => FrameType::DhhcEnd,
            Frame::DhhStart(_) => FrameType::DhhStart,
            Frame::DhhEnd(_) => FrameType::DhhEnd,
            Frame::Ghost(_) => FrameType::Ghost,
            Frame::Commode(_) => FrameType::Commode,
            Frame::DirectReadout(f) => f.kind,
            Frame::Fce(_) => FrameType::FceRaw,
            Frame::Hltroi(_) => FrameType::Hltroi,
            Frame::Unknown(f) => f.word0().frame_type(),
        }
    }

    /// The low trigger number word every frame carries at the same offset.
    pub fn trigger_nr_lo(&self) -> u16 {
        let bytes = match self {
            Frame::DhhcStart(f) => f.bytes,
            Frame::DhhcEnd(f) => f.bytes,
            Frame::DhhStart(f) => f.bytes,
            Frame::DhhEnd(f) => f.bytes,
            Frame::Ghost(f) => f.bytes,
            Frame::Commode(f) => f.bytes,
            Frame::DirectReadout(f) => f.bytes,
            Frame::Fce(f) => f.bytes,
            Frame::Hltroi(f) => f.bytes(),
            Frame::Unknown(f) => f.bytes,
        };
        wire::u16_at(bytes, 2)
    }
}

/// DHHC_START: opens one sub-event and declares how many frames belong to it.
#[derive(Debug, Clone)]
pub struct DhhcStartFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> DhhcStartFrame<'a> {
    pub fn word0(&self) -> FrameHeaderWord0 {
        FrameHeaderWord0::new(wire::u16_at(self.bytes, 0))
    }

    pub fn trigger_nr_lo(&self) -> u16 {
        wire::u16_at(self.bytes, 2)
    }

    pub fn trigger_nr_hi(&self) -> u16 {
        wire::u16_at(self.bytes, 4)
    }

    pub fn trigger_nr(&self) -> u32 {
        (self.trigger_nr_lo() as u32) | ((self.trigger_nr_hi() as u32) << 16)
    }

    /// 48-bit run time tag.
    pub fn time_tag(&self) -> u64 {
        (wire::u16_at(self.bytes, 6) as u64)
            | ((wire::u16_at(self.bytes, 8) as u64) << 16)
            | ((wire::u16_at(self.bytes, 10) as u64) << 32)
    }

    pub fn nr_frames(&self) -> u16 {
        wire::u16_at(self.bytes, 12)
    }

    pub fn active_dhh_mask(&self) -> u16 {
        self.word0().misc() & 0x1F
    }

    pub fn dhhc_id(&self) -> u16 {
        (self.word0().misc() >> 5) & 0xF
    }

    /// A fixed sentinel pattern means "trigger received, no detector data".
    /// The stored checksum constant is part of the pattern.
    pub fn is_fake(&self) -> bool {
        self.word0().raw() == FAKE_START_WORD0
            && self.bytes[2..14].iter().all(|b| *b == 0)
            && wire::crc_at(&self.bytes[..18]) == FAKE_START_CRC
    }
}

/// DHHC_END: closes the sub-event and declares its total word count.
#[derive(Debug, Clone)]
pub struct DhhcEndFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> DhhcEndFrame<'a> {
    pub fn word0(&self) -> FrameHeaderWord0 {
        FrameHeaderWord0::new(wire::u16_at(self.bytes, 0))
    }

    pub fn trigger_nr_lo(&self) -> u16 {
        wire::u16_at(self.bytes, 2)
    }

    /// Event size in 16-bit words as counted by the DHHC.
    pub fn words_in_event(&self) -> u32 {
        wire::u32_at(self.bytes, 4)
    }

    pub fn error_info(&self) -> u32 {
        wire::u32_at(self.bytes, 8)
    }

    pub fn dhhc_id(&self) -> u16 {
        (self.word0().misc() >> 5) & 0xF
    }

    pub fn is_fake(&self) -> bool {
        self.word0().raw() == FAKE_END_WORD0
            && self.bytes[2..12].iter().all(|b| *b == 0)
            && wire::crc_at(&self.bytes[..16]) == FAKE_END_CRC
    }
}

/// DHH_START: opens the frame span of one half-ladder readout.
#[derive(Debug, Clone)]
pub struct DhhStartFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> DhhStartFrame<'a> {
    pub fn word0(&self) -> FrameHeaderWord0 {
        FrameHeaderWord0::new(wire::u16_at(self.bytes, 0))
    }

    pub fn trigger_nr_lo(&self) -> u16 {
        wire::u16_at(self.bytes, 2)
    }

    pub fn dhh_time_tag(&self) -> u32 {
        wire::u32_at(self.bytes, 4)
    }

    /// Number of the last DHP readout frame before the trigger.
    pub fn start_frame_nr(&self) -> u16 {
        (wire::u16_at(self.bytes, 8) >> 10) & 0x3F
    }

    /// Trigger row offset within the readout frame.
    pub fn trigger_offset(&self) -> u16 {
        wire::u16_at(self.bytes, 8) & 0x3FF
    }

    pub fn active_dhp_mask(&self) -> u16 {
        self.word0().misc() & 0xF
    }

    pub fn dhh_id(&self) -> u16 {
        (self.word0().misc() >> 4) & 0x3F
    }
}

/// DHH_END: closes the half-ladder span.
#[derive(Debug, Clone)]
pub struct DhhEndFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> DhhEndFrame<'a> {
    pub fn word0(&self) -> FrameHeaderWord0 {
        FrameHeaderWord0::new(wire::u16_at(self.bytes, 0))
    }

    pub fn trigger_nr_lo(&self) -> u16 {
        wire::u16_at(self.bytes, 2)
    }

    pub fn words_in_event(&self) -> u32 {
        wire::u32_at(self.bytes, 4)
    }

    pub fn error_info(&self) -> u32 {
        wire::u32_at(self.bytes, 8)
    }

    pub fn dhh_id(&self) -> u16 {
        (self.word0().misc() >> 4) & 0x3F
    }
}

/// GHOST: an active DHP had no data for this trigger.
#[derive(Debug, Clone)]
pub struct GhostFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> GhostFrame<'a> {
    pub fn word0(&self) -> FrameHeaderWord0 {
        FrameHeaderWord0::new(wire::u16_at(self.bytes, 0))
    }

    pub fn trigger_nr_lo(&self) -> u16 {
        wire::u16_at(self.bytes, 2)
    }

    pub fn dhh_id(&self) -> u16 {
        (self.word0().misc() >> 4) & 0x3F
    }

    pub fn dhp_port(&self) -> u16 {
        self.word0().misc() & 0x3
    }
}

/// COMMODE: 96 common-mode values of one half-ladder.
#[derive(Debug, Clone)]
pub struct CommodeFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> CommodeFrame<'a> {
    pub fn word0(&self) -> FrameHeaderWord0 {
        FrameHeaderWord0::new(wire::u16_at(self.bytes, 0))
    }

    pub fn trigger_nr_lo(&self) -> u16 {
        wire::u16_at(self.bytes, 2)
    }

    pub fn dhh_id(&self) -> u16 {
        (self.word0().misc() >> 4) & 0x3F
    }

    pub fn values(&self) -> impl Iterator<Item = u16> + '_ {
        (0..96).map(|i| wire::u16_at(self.bytes, 4 + 2 * i))
    }
}

/// DHP_RAW / DHP_ZSD / DHP_ONSEN: a variable-length run of DHP words.
#[derive(Debug, Clone)]
pub struct DirectReadoutFrame<'a> {
    bytes: &'a [u8],
    kind: FrameType,
}

impl<'a> DirectReadoutFrame<'a> {
    pub fn word0(&self) -> FrameHeaderWord0 {
        FrameHeaderWord0::new(wire::u16_at(self.bytes, 0))
    }

    pub fn kind(&self) -> FrameType {
        self.kind
    }

    pub fn trigger_nr_lo(&self) -> u16 {
        wire::u16_at(self.bytes, 2)
    }

    pub fn dhh_id(&self) -> u16 {
        (self.word0().misc() >> 4) & 0x3F
    }

    pub fn dhp_port(&self) -> u16 {
        self.word0().misc() & 0x3
    }

    pub fn reformat_flag(&self) -> bool {
        (self.word0().misc() >> 3) & 0x1 != 0
    }

    /// The frame bytes including the DHP header words, checksum stripped.
    pub fn dhp_payload(&self) -> &'a [u8] {
        &self.bytes[..self.bytes.len().saturating_sub(4)]
    }
}

/// FCE_RAW: cluster-engine output. The payload format is not supported by
/// this unpacker; the frame is only counted and checksum-verified.
#[derive(Debug, Clone)]
pub struct FceFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> FceFrame<'a> {
    pub fn word0(&self) -> FrameHeaderWord0 {
        FrameHeaderWord0::new(wire::u16_at(self.bytes, 0))
    }

    pub fn trigger_nr_lo(&self) -> u16 {
        wire::u16_at(self.bytes, 2)
    }

    pub fn dhh_id(&self) -> u16 {
        (self.word0().misc() >> 4) & 0x3F
    }
}

/// A frame with a type code outside the known set.
#[derive(Debug, Clone)]
pub struct UnknownFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> UnknownFrame<'a> {
    pub fn word0(&self) -> FrameHeaderWord0 {
        FrameHeaderWord0::new(wire::u16_at(self.bytes, 0))
    }

    pub fn trigger_nr_lo(&self) -> u16 {
        wire::u16_at(self.bytes, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word0(kind: u8, misc: u16) -> u16 {
        ((kind as u16) << 11) | (misc & 0x7FF)
    }

    #[test]
    fn test_header_word_fields() {
        let w = FrameHeaderWord0::new(0x8000 | word0(TYPE_GHOST, 0x35));
        assert!(w.error_flag());
        assert_eq!(w.frame_type(), FrameType::Ghost);
        assert_eq!(w.misc(), 0x35);
    }

    #[test]
    fn test_type_codes_round_trip() {
        for code in 0..16u8 {
            assert_eq!(FrameType::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_unassigned_codes_are_unknown() {
        for code in [0x7u8, 0x8, 0xA, 0xE] {
            assert!(matches!(FrameType::from_code(code), FrameType::Unknown(_)));
        }
    }

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(FrameType::DhhcStart.fixed_size(), Some(18));
        assert_eq!(FrameType::DhhcEnd.fixed_size(), Some(16));
        assert_eq!(FrameType::DhhStart.fixed_size(), Some(14));
        assert_eq!(FrameType::DhhEnd.fixed_size(), Some(16));
        assert_eq!(FrameType::Ghost.fixed_size(), Some(8));
        assert_eq!(FrameType::Commode.fixed_size(), Some(200));
        assert_eq!(FrameType::DhpZsd.fixed_size(), None);
        assert_eq!(FrameType::Hltroi.fixed_size(), None);
        assert_eq!(FrameType::FceRaw.fixed_size(), None);
    }

    #[test]
    fn test_parse_rejects_short_fixed_frame() {
        // a DHH_START needs 14 bytes, give it 8
        let mut bytes = word0(TYPE_DHH_START, 0).to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 6]);
        assert!(Frame::parse(&bytes).is_err());
    }

    #[test]
    fn test_parse_dhh_start_fields() {
        // dhh id 3, dhp mask 0b0101, sfnr 5, toffset 0x123
        let mut bytes = word0(TYPE_DHH_START, (3 << 4) | 0b0101).to_be_bytes().to_vec();
        bytes.extend_from_slice(&0x0042u16.to_be_bytes()); // trigger lo
        bytes.extend_from_slice(&0x1111u16.to_be_bytes()); // time tag lo
        bytes.extend_from_slice(&0x2222u16.to_be_bytes()); // time tag hi
        bytes.extend_from_slice(&((5u16 << 10) | 0x123).to_be_bytes());
        bytes.extend_from_slice(&[0u8; 4]); // checksum, unchecked here
        match Frame::parse(&bytes).unwrap() {
            Frame::DhhStart(f) => {
                assert_eq!(f.trigger_nr_lo(), 0x42);
                assert_eq!(f.dhh_id(), 3);
                assert_eq!(f.active_dhp_mask(), 0b0101);
                assert_eq!(f.start_frame_nr(), 5);
                assert_eq!(f.trigger_offset(), 0x123);
                assert_eq!(f.dhh_time_tag(), 0x2222_1111);
            }
            other => panic!("parsed as {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_fake_start_sentinel() {
        let mut bytes = FAKE_START_WORD0.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&FAKE_START_CRC.to_be_bytes());
        match Frame::parse(&bytes).unwrap() {
            Frame::DhhcStart(f) => assert!(f.is_fake()),
            other => panic!("parsed as {:?}", other.frame_type()),
        }

        // same frame with a nonzero trigger number is not fake
        bytes[3] = 1;
        match Frame::parse(&bytes).unwrap() {
            Frame::DhhcStart(f) => assert!(!f.is_fake()),
            other => panic!("parsed as {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_fake_end_sentinel() {
        let mut bytes = FAKE_END_WORD0.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 10]);
        bytes.extend_from_slice(&FAKE_END_CRC.to_be_bytes());
        match Frame::parse(&bytes).unwrap() {
            Frame::DhhcEnd(f) => {
                assert!(f.is_fake());
                assert_eq!(f.words_in_event(), 0);
            }
            other => panic!("parsed as {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_direct_readout_header() {
        // dhh id 5, reformat set, port 2
        let bytes = [
            word0(TYPE_DHP_ZSD, (5 << 4) | (1 << 3) | 2).to_be_bytes(),
            0x0099u16.to_be_bytes(),
        ]
        .concat();
        match Frame::parse(&bytes).unwrap() {
            Frame::DirectReadout(f) => {
                assert_eq!(f.kind(), FrameType::DhpZsd);
                assert_eq!(f.dhh_id(), 5);
                assert_eq!(f.dhp_port(), 2);
                assert!(f.reformat_flag());
                assert_eq!(f.trigger_nr_lo(), 0x99);
            }
            other => panic!("parsed as {:?}", other.frame_type()),
        }
    }
}
