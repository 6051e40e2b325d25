//! Decoder for the zero-suppressed DHP pixel payload.
//!
//! A direct-readout frame wraps a run of 16-bit DHP words: four header words
//! (the outer frame header, the DHP's own header with its DHH id and chip
//! number, and the readout frame number), followed by interleaved row and
//! pixel words. A row word (bit 15 clear) selects the 12-bit row (even part)
//! and the row's 6-bit common mode; every following pixel word (bit 15 set)
//! contributes the row's odd bit, a 6-bit column and the 8-bit ADC value.
//! A pixel word before the first row word aborts the frame, nothing else in
//! the event is affected.

use super::config::Config;
use super::constants::{DHP_COLUMN_OFFSET, DHP_COLUMN_XOR};
use super::error::{EventError, EventErrorFlags};
use super::hit::PixelHit;
use super::sensor_id::SensorId;
use super::statistics::DecoderStatistics;
use super::wire;

/// Decode context handed down from the enclosing DHH_START and direct-readout
/// frame headers.
#[derive(Debug, Clone)]
pub struct DhpContext {
    /// DHH id declared by the direct-readout frame header.
    pub dhh_id: u16,
    /// DHP port (chip number) declared by the direct-readout frame header.
    pub dhp_port: u16,
    /// Cleared flag means the column bits still need the readout remap.
    pub reformat: bool,
    /// First readout frame number, from DHH_START.
    pub start_frame_nr: u16,
    /// Trigger row offset, from DHH_START.
    pub trigger_offset: u16,
    /// Sensor of the currently open DHH span.
    pub sensor: SensorId,
}

/// Decode one DHP payload (frame bytes with the trailing checksum stripped)
/// and append the pixel hits to `hits`.
pub fn decode_dhp(
    payload: &[u8],
    ctx: &DhpContext,
    config: &Config,
    hits: &mut Vec<PixelHit>,
    flags: &mut EventErrorFlags,
    stats: &mut DecoderStatistics,
) {
    let n_words = payload.len() / 2;

    if n_words < 4 {
        if !config.ignore_empty_dhp {
            spdlog::error!("DHP frame size error (too small): {} words", n_words);
        }
        flags.insert(EventError::DhpSizeError);
        stats.dhp_size_error += 1;
        return;
    }

    let dhp_header = wire::u16_at(payload, 4);
    let dhp_dhh_id = (dhp_header >> 2) & 0x3F;
    let dhp_chip = dhp_header & 0x3;
    let frame_nr_lo = wire::u16_at(payload, 6);

    if ctx.dhh_id != dhp_dhh_id {
        spdlog::error!(
            "DHH id in DHH and DHP header differ: ${:x} != ${:x}",
            ctx.dhh_id,
            dhp_dhh_id
        );
        flags.insert(EventError::DhhDhpIdMismatch);
    }
    if ctx.dhp_port != dhp_chip && !config.ignore_dhp_port_differ {
        spdlog::error!(
            "DHP port in DHH and DHP header differ: ${:x} != ${:x}",
            ctx.dhp_port,
            dhp_chip
        );
        flags.insert(EventError::DhhDhpPortMismatch);
    }

    let column_offset = DHP_COLUMN_OFFSET[dhp_chip as usize];
    let frame_offset = (frame_nr_lo.wrapping_sub(ctx.start_frame_nr) & 0x3F) as u8;

    let mut row: u16 = 0;
    let mut common_mode: u8 = 0;
    let mut row_seen = false;

    for i in 4..n_words {
        let word = wire::u16_at(payload, 2 * i);
        if (word >> 15) & 0x1 == 0 {
            // row word: even row bits and the row's common mode
            row_seen = true;
            row = (word >> 5) & 0xFFE;
            common_mode = (word & 0x3F) as u8;
        } else {
            if !row_seen {
                spdlog::error!("DHP unpacking: pixel without row, skipping rest of frame");
                flags.insert(EventError::DhpPixelWithoutRow);
                stats.dhp_pixel_error += 1;
                return;
            }
            row = (row & 0xFFE) | ((word >> 14) & 0x1);
            let mut column = (word >> 8) & 0x3F;
            if !ctx.reformat {
                column ^= DHP_COLUMN_XOR;
            }
            column += column_offset;
            let adc = (word & 0xFF) as u8;

            if !config.validate_only {
                hits.push(PixelHit {
                    sensor: ctx.sensor,
                    row,
                    column,
                    adc,
                    trigger_offset: ctx.trigger_offset,
                    frame_offset,
                    common_mode,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_word(payload: &mut Vec<u8>, word: u16) {
        payload.extend_from_slice(&word.to_be_bytes());
    }

    /// Frame header words 0..2 plus the DHP header pair.
    fn dhp_payload(dhh_id: u16, chip: u16, frame_nr: u16, words: &[u16]) -> Vec<u8> {
        let mut payload = Vec::new();
        push_word(&mut payload, (0x5 << 11) | (dhh_id << 4) | chip); // outer word0
        push_word(&mut payload, 0x0042); // trigger low
        push_word(&mut payload, (0x5 << 13) | (dhh_id << 2) | chip);
        push_word(&mut payload, frame_nr);
        for w in words {
            push_word(&mut payload, *w);
        }
        payload
    }

    fn ctx(dhh_id: u16, port: u16) -> DhpContext {
        DhpContext {
            dhh_id,
            dhp_port: port,
            reformat: false,
            start_frame_nr: 0,
            trigger_offset: 0,
            sensor: SensorId::from_dhh_id(dhh_id),
        }
    }

    fn decode(
        payload: &[u8],
        ctx: &DhpContext,
        config: &Config,
    ) -> (Vec<PixelHit>, EventErrorFlags, DecoderStatistics) {
        let mut hits = Vec::new();
        let mut flags = EventErrorFlags::new();
        let mut stats = DecoderStatistics::new();
        decode_dhp(payload, ctx, config, &mut hits, &mut flags, &mut stats);
        (hits, flags, stats)
    }

    #[test]
    fn test_single_pixel() {
        // row word: row 0, common mode 5; pixel word: col 0x10, adc 0x42
        let payload = dhp_payload(3, 1, 0, &[0x0005, 0x9042]);
        let (hits, flags, _) = decode(&payload, &ctx(3, 1), &Config::default());
        assert!(flags.is_empty());
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.row, 0);
        assert_eq!(hit.column, (0x10 ^ 0x3C) + 64);
        assert_eq!(hit.adc, 0x42);
        assert_eq!(hit.common_mode, 5);
        assert_eq!(hit.frame_offset, 0);
        assert_eq!(hit.sensor, SensorId::from_dhh_id(3));
    }

    #[test]
    fn test_odd_row_bit_and_multiple_pixels() {
        // row word selects row 2 (even part); first pixel has the odd bit set
        let row_word = 2 << 5;
        let pix_odd = 0x8000 | (1 << 14) | (0x20 << 8) | 0x11;
        let pix_even = 0x8000 | (0x21 << 8) | 0x22;
        let payload = dhp_payload(3, 0, 0, &[row_word, pix_odd, pix_even]);
        let (hits, flags, _) = decode(&payload, &ctx(3, 0), &Config::default());
        assert!(flags.is_empty());
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].row, 3);
        assert_eq!(hits[0].column, 0x20 ^ 0x3C);
        assert_eq!(hits[1].row, 2);
        assert_eq!(hits[1].column, 0x21 ^ 0x3C);
        assert_eq!(hits[1].adc, 0x22);
    }

    #[test]
    fn test_reformat_flag_suppresses_remap() {
        let payload = dhp_payload(3, 0, 0, &[0x0000, 0x8000 | (0x10 << 8) | 0x01]);
        let mut c = ctx(3, 0);
        c.reformat = true;
        let (hits, _, _) = decode(&payload, &c, &Config::default());
        assert_eq!(hits[0].column, 0x10);
    }

    #[test]
    fn test_column_remap_is_an_involution() {
        for col in 0..64u16 {
            assert_eq!(col ^ DHP_COLUMN_XOR ^ DHP_COLUMN_XOR, col);
        }
    }

    #[test]
    fn test_chip_offsets() {
        for chip in 0..4u16 {
            let payload = dhp_payload(3, chip, 0, &[0x0000, 0x8000 | 0x01]);
            let mut c = ctx(3, chip);
            c.reformat = true;
            let (hits, _, _) = decode(&payload, &c, &Config::default());
            assert_eq!(hits[0].column, 64 * chip);
        }
    }

    #[test]
    fn test_pixel_without_row_aborts_frame() {
        let payload = dhp_payload(3, 0, 0, &[0x9042, 0x0005, 0x9042]);
        let (hits, flags, stats) = decode(&payload, &ctx(3, 0), &Config::default());
        assert!(hits.is_empty());
        assert!(flags.contains(EventError::DhpPixelWithoutRow));
        assert_eq!(stats.dhp_pixel_error, 1);
    }

    #[test]
    fn test_truncated_payload() {
        let payload = dhp_payload(3, 0, 0, &[]);
        let truncated = &payload[..6]; // only 3 words left
        let (hits, flags, stats) = decode(truncated, &ctx(3, 0), &Config::default());
        assert!(hits.is_empty());
        assert!(flags.contains(EventError::DhpSizeError));
        assert_eq!(stats.dhp_size_error, 1);
    }

    #[test]
    fn test_dhh_id_mismatch_is_flagged_but_decodes() {
        let payload = dhp_payload(7, 0, 0, &[0x0000, 0x8000 | 0x01]);
        let (hits, flags, _) = decode(&payload, &ctx(3, 0), &Config::default());
        assert!(flags.contains(EventError::DhhDhpIdMismatch));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_port_mismatch_gated_by_config() {
        let payload = dhp_payload(3, 1, 0, &[0x0000, 0x8000 | 0x01]);
        let (_, flags, _) = decode(&payload, &ctx(3, 0), &Config::default());
        assert!(!flags.contains(EventError::DhhDhpPortMismatch));

        let strict = Config {
            ignore_dhp_port_differ: false,
            ..Config::default()
        };
        let (_, flags, _) = decode(&payload, &ctx(3, 0), &strict);
        assert!(flags.contains(EventError::DhhDhpPortMismatch));
    }

    #[test]
    fn test_frame_offset_wraps_modulo_64() {
        let payload = dhp_payload(3, 0, 2, &[0x0000, 0x8000 | 0x01]);
        let mut c = ctx(3, 0);
        c.start_frame_nr = 5; // frame 2 readout after start frame 5 wraps
        let (hits, _, _) = decode(&payload, &c, &Config::default());
        assert_eq!(hits[0].frame_offset, (2u16.wrapping_sub(5) & 0x3F) as u8);
    }

    #[test]
    fn test_validate_only_stores_nothing() {
        let payload = dhp_payload(3, 0, 0, &[0x0000, 0x8000 | 0x01]);
        let config = Config {
            validate_only: true,
            ..Config::default()
        };
        let (hits, flags, _) = decode(&payload, &ctx(3, 0), &config);
        assert!(hits.is_empty());
        assert!(flags.is_empty());
    }
}
