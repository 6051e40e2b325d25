//! Wire-format constants of the ONSEN event stream and the DHHC frame protocol.

/// Magic word at the start of every ONSEN event packet.
pub const ONSEN_MAGIC: u32 = 0xCAFE_BABE;
/// The same magic as produced by a sender with the opposite byte order.
pub const ONSEN_MAGIC_SWAPPED: u32 = 0xBEBA_FECA;

/// Maximum number of frames one event packet may declare.
pub const MAX_FRAMES_PER_EVENT: u32 = 256;
/// Maximum packet size in 32-bit words accepted from the event builder.
pub const MAX_PACKET_WORDS: usize = 16 * 1024 * 1024;

// 4-bit frame type codes, bits [14:11] of header word 0.
pub const TYPE_DHP_RAW: u8 = 0x0;
pub const TYPE_FCE_RAW: u8 = 0x1;
pub const TYPE_GHOST: u8 = 0x2;
pub const TYPE_DHH_START: u8 = 0x3;
pub const TYPE_DHH_END: u8 = 0x4;
pub const TYPE_DHP_ZSD: u8 = 0x5;
pub const TYPE_COMMODE: u8 = 0x6;
pub const TYPE_FCE_ONSEN: u8 = 0x9;
pub const TYPE_DHHC_START: u8 = 0xB;
pub const TYPE_DHHC_END: u8 = 0xC;
pub const TYPE_DHP_ONSEN: u8 = 0xD;
pub const TYPE_HLTROI: u8 = 0xF;

/// Half-word magic carried twice by the ONSEN merger (HLT/ROI) frame.
pub const HLTROI_MAGIC: u16 = 0xCAFE;

/// Header word 0 of the fake DHHC_START sentinel (type DHHC_START, all misc bits clear).
pub const FAKE_START_WORD0: u16 = 0x5800;
/// Checksum stored by the fake DHHC_START sentinel; equals the true CRC of its payload.
pub const FAKE_START_CRC: u32 = 0xEF67_A12D;
/// Header word 0 of the fake DHHC_END sentinel.
pub const FAKE_END_WORD0: u16 = 0x6000;
/// Checksum stored by the fake DHHC_END sentinel.
pub const FAKE_END_CRC: u32 = 0x07A5_BCF7;

/// Frame length of the empty DHP_ONSEN packets produced by a known merger
/// firmware bug. Their checksum field is garbage, so the frame CRC check is
/// skipped for them when `ignore_empty_dhp` is set.
pub const DHP_ONSEN_EMPTY_QUIRK_LEN: usize = 10;

/// Column bits are delivered bit-flipped by DHPs running the old readout
/// sequence; cleared reformat flag means the XOR still has to be applied.
pub const DHP_COLUMN_XOR: u16 = 0x3C;
/// Column offset of each DHP chip on its half-ladder.
pub const DHP_COLUMN_OFFSET: [u16; 4] = [0, 64, 128, 192];

/// Mask applied when comparing trigger numbers against the FTSW reference.
pub const FTSW_TRIGGER_MASK: u32 = 0x7FFF;
