//! The ONSEN merger (HLT/ROI) frame: region-of-interest records attached to
//! the event by the online selector.
//!
//! Layout after the 4-byte DHHC header (word0 + unused trigger word):
//! HLT magic, HLT trigger number, DATCON magic, DATCON trigger number (all
//! 32 bit), then a run of 64-bit ROI records, an inner checksum over the
//! merger payload and finally the ordinary frame checksum. The inner
//! checksum deliberately excludes the DHHC header.

use super::config::Config;
use super::crc;
use super::error::{EventError, EventErrorFlags};
use super::frame::FrameHeaderWord0;
use super::hit::RawRoi;
use super::constants::HLTROI_MAGIC;
use super::statistics::DecoderStatistics;
use super::wire;

/// Byte offset of the merger payload (past the DHHC header).
const MERGER_OFFSET: usize = 4;
/// Smallest frame that carries the full merger header.
const MIN_HEADER_LEN: usize = 20;
/// Smallest frame that can hold at least the header plus both checksums.
const MIN_SAVE_LEN: usize = 24;

/// Typed view of one HLT/ROI frame.
#[derive(Debug, Clone)]
pub struct HltroiFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> HltroiFrame<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn word0(&self) -> FrameHeaderWord0 {
        FrameHeaderWord0::new(wire::u16_at(self.bytes, 0))
    }

    pub fn trigger_nr_lo(&self) -> u16 {
        wire::u16_at(self.bytes, 2)
    }

    /// Whether the frame is long enough to carry both trigger branches.
    pub fn has_merger_header(&self) -> bool {
        self.bytes.len() >= MIN_HEADER_LEN
    }

    pub fn magic_hlt(&self) -> u32 {
        wire::u32_at(self.bytes, 4)
    }

    pub fn trigger_hlt(&self) -> u32 {
        wire::u32_at(self.bytes, 8)
    }

    pub fn magic_datcon(&self) -> u32 {
        wire::u32_at(self.bytes, 12)
    }

    pub fn trigger_datcon(&self) -> u32 {
        wire::u32_at(self.bytes, 16)
    }

    /// Number of complete 64-bit ROI records between header and checksums.
    pub fn roi_count(&self) -> usize {
        if self.bytes.len() < MIN_SAVE_LEN {
            return 0;
        }
        (self.bytes.len() - MIN_SAVE_LEN) / 8
    }

    pub fn rois(&self) -> Vec<u64> {
        (0..self.roi_count())
            .map(|i| {
                let off = MIN_HEADER_LEN + 8 * i;
                u64::from_be_bytes(self.bytes[off..off + 8].try_into().unwrap())
            })
            .collect()
    }

    /// Verify the inner checksum over the merger payload. `None` when the
    /// frame is too short to carry one.
    pub fn inner_crc_ok(&self) -> Option<bool> {
        let len = self.bytes.len();
        if len < MERGER_OFFSET + 8 {
            return None;
        }
        let computed = crc::compute_crc(&self.bytes[MERGER_OFFSET..len - 8]);
        let stored = wire::u32_be_at(self.bytes, len - 8);
        Some(computed == stored)
    }
}

/// Validate one HLT/ROI frame and save its ROI block.
///
/// Magic and trigger mismatches are flagged but never discard the record;
/// only frames too short to hold any ROI are not saved.
pub fn process_hltroi(
    frame: &HltroiFrame,
    config: &Config,
    rois: &mut Vec<RawRoi>,
    flags: &mut EventErrorFlags,
    stats: &mut DecoderStatistics,
) {
    if frame.has_merger_header() {
        let magic_hlt = frame.magic_hlt();
        let magic_datcon = frame.magic_datcon();
        let trigger_hlt = frame.trigger_hlt();
        let trigger_datcon = frame.trigger_datcon();

        if magic_hlt & 0xFFFF != HLTROI_MAGIC as u32 {
            spdlog::error!("HLT/ROI magic 1 error: ${:08x}", magic_hlt);
            flags.insert(EventError::HltroiMagicError);
        }
        if magic_datcon & 0xFFFF != HLTROI_MAGIC as u32 {
            spdlog::error!("HLT/ROI magic 2 error: ${:08x}", magic_datcon);
            flags.insert(EventError::HltroiMagicError);
        }

        if magic_datcon == HLTROI_MAGIC as u32 && trigger_datcon == 0 {
            // trigger arrived before DATCON had tracks; recoverable
            if !config.ignore_datcon {
                spdlog::warn!(
                    "HLT/ROI frame without DATCON data, HLT trigger ${:x}",
                    trigger_hlt
                );
            }
            flags.insert(EventError::NoDatconError);
        } else if trigger_hlt != trigger_datcon {
            spdlog::error!(
                "HLT/ROI trigger number mismatch: ${:x} != ${:x}",
                trigger_hlt,
                trigger_datcon
            );
            flags.insert(EventError::MergerTrignrMismatch);
        }
    } else {
        spdlog::error!(
            "HLT/ROI frame too small for the merger header: {} bytes",
            frame.bytes().len()
        );
        flags.insert(EventError::HltroiMagicError);
    }

    match frame.inner_crc_ok() {
        Some(true) => {}
        Some(false) => {
            spdlog::error!("HLT/ROI inner CRC mismatch");
            flags.insert(EventError::MergerCrcError);
            stats.crc_error += 1;
        }
        None => {
            spdlog::error!("HLT/ROI frame too small for a checksum");
            flags.insert(EventError::MergerCrcError);
        }
    }

    if frame.bytes().len() < MIN_SAVE_LEN {
        spdlog::error!("HLT/ROI frame too small to hold any ROIs, did not save anything");
        return;
    }
    if !config.validate_only {
        rois.push(RawRoi {
            magic_hlt: frame.magic_hlt(),
            trigger_hlt: frame.trigger_hlt(),
            magic_datcon: frame.magic_datcon(),
            trigger_datcon: frame.trigger_datcon(),
            rois: frame.rois(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TYPE_HLTROI;

    fn push_u16(bytes: &mut Vec<u8>, v: u16) {
        bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn push_u32_halfwords(bytes: &mut Vec<u8>, v: u32) {
        push_u16(bytes, (v & 0xFFFF) as u16);
        push_u16(bytes, (v >> 16) as u16);
    }

    /// Build an HLT/ROI frame with a valid inner checksum; the outer frame
    /// checksum is appended by the caller's event builder in walker tests.
    fn build_hltroi(
        magic_hlt: u32,
        trigger_hlt: u32,
        magic_datcon: u32,
        trigger_datcon: u32,
        rois: &[u64],
    ) -> Vec<u8> {
        let mut bytes = Vec::new();
        push_u16(&mut bytes, (TYPE_HLTROI as u16) << 11);
        push_u16(&mut bytes, (trigger_hlt & 0xFFFF) as u16);
        push_u32_halfwords(&mut bytes, magic_hlt);
        push_u32_halfwords(&mut bytes, trigger_hlt);
        push_u32_halfwords(&mut bytes, magic_datcon);
        push_u32_halfwords(&mut bytes, trigger_datcon);
        for roi in rois {
            bytes.extend_from_slice(&roi.to_be_bytes());
        }
        let inner = crc::compute_crc(&bytes[4..]);
        bytes.extend_from_slice(&inner.to_be_bytes());
        let outer = crc::compute_crc(&bytes);
        bytes.extend_from_slice(&outer.to_be_bytes());
        bytes
    }

    fn process(
        bytes: &[u8],
        config: &Config,
    ) -> (Vec<RawRoi>, EventErrorFlags, DecoderStatistics) {
        let frame = HltroiFrame::new(bytes);
        let mut rois = Vec::new();
        let mut flags = EventErrorFlags::new();
        let mut stats = DecoderStatistics::new();
        process_hltroi(&frame, config, &mut rois, &mut flags, &mut stats);
        (rois, flags, stats)
    }

    #[test]
    fn test_well_formed_frame() {
        let bytes = build_hltroi(0xCAFE, 0x1234, 0xCAFE, 0x1234, &[0xAABB_CCDD_EEFF_0011, 42]);
        let (rois, flags, stats) = process(&bytes, &Config::default());
        assert!(flags.is_empty(), "unexpected flags: {}", flags);
        assert_eq!(stats.crc_error, 0);
        assert_eq!(rois.len(), 1);
        assert_eq!(rois[0].rois, vec![0xAABB_CCDD_EEFF_0011, 42]);
        assert_eq!(rois[0].trigger_hlt, 0x1234);
    }

    #[test]
    fn test_bad_magic_and_missing_datcon_still_saved() {
        let bytes = build_hltroi(0xDEAD_0000, 0x1234, 0x0000_CAFE, 0, &[7]);
        let (rois, flags, _) = process(&bytes, &Config::default());
        assert!(flags.contains(EventError::HltroiMagicError));
        assert!(flags.contains(EventError::NoDatconError));
        assert!(!flags.contains(EventError::MergerTrignrMismatch));
        assert_eq!(rois.len(), 1);
        assert_eq!(rois[0].rois, vec![7]);
    }

    #[test]
    fn test_trigger_mismatch() {
        let bytes = build_hltroi(0xCAFE, 0x1234, 0xCAFE, 0x1235, &[]);
        let (rois, flags, _) = process(&bytes, &Config::default());
        assert!(flags.contains(EventError::MergerTrignrMismatch));
        assert!(!flags.contains(EventError::NoDatconError));
        assert_eq!(rois.len(), 1);
        assert!(rois[0].is_empty());
    }

    #[test]
    fn test_inner_crc_mismatch_keeps_record() {
        let mut bytes = build_hltroi(0xCAFE, 0x1234, 0xCAFE, 0x1234, &[7]);
        let len = bytes.len();
        bytes[len - 9] ^= 0xFF; // corrupt the last ROI byte
        let (rois, flags, stats) = process(&bytes, &Config::default());
        assert!(flags.contains(EventError::MergerCrcError));
        assert_eq!(stats.crc_error, 1);
        assert_eq!(rois.len(), 1);
    }

    #[test]
    fn test_too_short_frame_not_saved() {
        let bytes = vec![0u8; 10];
        let (rois, flags, _) = process(&bytes, &Config::default());
        assert!(rois.is_empty());
        assert!(flags.contains(EventError::HltroiMagicError));
        assert!(flags.contains(EventError::MergerCrcError));
    }

    #[test]
    fn test_validate_only_saves_nothing() {
        let bytes = build_hltroi(0xCAFE, 1, 0xCAFE, 1, &[7]);
        let config = Config {
            validate_only: true,
            ..Config::default()
        };
        let (rois, flags, _) = process(&bytes, &config);
        assert!(rois.is_empty());
        assert!(flags.is_empty());
    }
}
