//! The event-level frame walker.
//!
//! [`PxdUnpacker::unpack_event`] takes one raw ONSEN event packet, validates
//! the packet header and frame table, and walks the frame sequence
//! depth-first: DHHC_START opens the sub-event, DHH_START/DHH_END bracket
//! each half-ladder, direct-readout frames inside a bracket are handed to
//! the DHP payload decoder. Structural violations of the packet itself
//! reject the whole event; everything else is flagged in the event error
//! mask and decoding continues with the next frame, always advancing by the
//! frame table's declared lengths.

use super::config::Config;
use super::constants::*;
use super::crc;
use super::dhp::{decode_dhp, DhpContext};
use super::error::{EventError, EventErrorFlags, PacketError};
use super::frame::{Frame, FrameType};
use super::hit::{PixelHit, RawRoi};
use super::roi::process_hltroi;
use super::sensor_id::SensorId;
use super::statistics::DecoderStatistics;
use super::wire;

/// The decoded products of one event. Owned by the caller; the unpacker
/// keeps no reference past the call.
#[derive(Debug, Clone, Default)]
pub struct EventOutput {
    pub hits: Vec<PixelHit>,
    pub rois: Vec<RawRoi>,
    pub error_flags: EventErrorFlags,
}

/// Walker state for one event. Created fresh per call, discarded afterwards.
#[derive(Debug)]
struct DecodeState {
    /// Reference trigger number from the FTSW, if one is available.
    ftsw_trigger: Option<u32>,
    /// Trigger number established by DHHC_START.
    last_trigger: Option<u32>,
    /// DHH id of the currently open DHH span; None outside a span.
    current_dhh_id: Option<u16>,
    current_sensor: SensorId,
    start_frame_nr: u16,
    trigger_offset: u16,
    dhh_starts: u32,
    dhh_ends: u32,
    declared_frames: u32,
    counted_frames: u32,
    active_dhh_count: u32,
    expected_dhp_mask: u16,
    found_dhp_mask: u16,
    /// Bytes consumed by all frames dispatched so far (table lengths).
    byte_count: usize,
    is_fake_event: bool,
}

impl DecodeState {
    fn new(ftsw_trigger: Option<u32>) -> Self {
        Self {
            ftsw_trigger,
            last_trigger: None,
            current_dhh_id: None,
            current_sensor: SensorId::default(),
            start_frame_nr: 0,
            trigger_offset: 0,
            dhh_starts: 0,
            dhh_ends: 0,
            declared_frames: 0,
            counted_frames: 0,
            active_dhh_count: 0,
            expected_dhp_mask: 0,
            found_dhp_mask: 0,
            byte_count: 0,
            is_fake_event: false,
        }
    }
}

/// Decoder for raw ONSEN event packets.
pub struct PxdUnpacker {
    config: Config,
}

impl PxdUnpacker {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Decode one raw event buffer.
    ///
    /// `ftsw_trigger` is the reference trigger number of the event, when the
    /// host framework has one. Statistics are accumulated into `stats`;
    /// error kinds are counted at most once per event.
    pub fn unpack_event(
        &self,
        raw: &[u8],
        ftsw_trigger: Option<u32>,
        stats: &mut DecoderStatistics,
    ) -> EventOutput {
        let mut out = EventOutput::default();
        if let Err(err) = self.unpack_packet(raw, ftsw_trigger, stats, &mut out) {
            spdlog::error!("Will not unpack event: {err}");
            // the frame table itself is unreliable, drop any partial output
            out.hits.clear();
            out.rois.clear();
            out.error_flags = EventErrorFlags::new();
            out.error_flags.insert(err.flag());
        }
        stats.record_event(&out.error_flags);
        out
    }

    fn unpack_packet(
        &self,
        raw: &[u8],
        ftsw_trigger: Option<u32>,
        stats: &mut DecoderStatistics,
        out: &mut EventOutput,
    ) -> Result<(), PacketError> {
        if raw.len() < 8 || raw.len() > MAX_PACKET_WORDS * 4 || raw.len() % 4 != 0 {
            return Err(PacketError::PacketSize(raw.len()));
        }

        let magic = wire::u32_be_at(raw, 0);
        if magic != ONSEN_MAGIC && magic != ONSEN_MAGIC_SWAPPED {
            return Err(PacketError::BadMagic(magic));
        }

        let declared = wire::u32_be_at(raw, 4);
        if declared > MAX_FRAMES_PER_EVENT {
            return Err(PacketError::FrameCount(declared));
        }
        let frame_count = declared as usize;

        let table_end = 8 + 4 * frame_count;
        if raw.len() < table_end {
            return Err(PacketError::PacketSize(raw.len()));
        }
        let payload = &raw[table_end..];

        let mut state = DecodeState::new(ftsw_trigger);
        let mut offset = 0usize;
        for index in 0..frame_count {
            let len = wire::u32_be_at(raw, 8 + 4 * index) as usize;
            if len == 0 {
                return Err(PacketError::EmptyFrame(index));
            }
            if offset + len > payload.len() {
                return Err(PacketError::FrameOverrun {
                    index,
                    size: len,
                    offset,
                    region: payload.len(),
                });
            }
            let frame = &payload[offset..offset + len];
            self.unpack_dhhc_frame(frame, index, frame_count, &mut state, stats, out);
            offset += wire::round_up_to_4(len);
        }
        Ok(())
    }

    fn unpack_dhhc_frame(
        &self,
        bytes: &[u8],
        frame_nr: usize,
        frames_in_event: usize,
        state: &mut DecodeState,
        stats: &mut DecoderStatistics,
        out: &mut EventOutput,
    ) {
        let flags = &mut out.error_flags;

        let parsed = match Frame::parse(bytes) {
            Ok(frame) => frame,
            Err(short) => {
                spdlog::error!(
                    "Frame {} too short for type {}: {} bytes",
                    frame_nr,
                    short.kind.name(),
                    short.len
                );
                flags.insert(EventError::FixedSizeMismatch);
                state.byte_count += bytes.len();
                return;
            }
        };
        let kind = parsed.frame_type();

        if let Some(size) = kind.fixed_size() {
            if bytes.len() != size {
                spdlog::error!(
                    "Fixed frame type size does not match specs: expected {} got {}",
                    size,
                    bytes.len()
                );
                flags.insert(EventError::FixedSizeMismatch);
            }
        }

        let mut trigger = parsed.trigger_nr_lo() as u32;

        if frame_nr == 0 {
            state.is_fake_event = match &parsed {
                Frame::DhhcStart(f) => f.is_fake(),
                _ => false,
            };
        }

        if let Some(ftsw) = state.ftsw_trigger {
            if trigger & FTSW_TRIGGER_MASK != ftsw & FTSW_TRIGGER_MASK {
                if state.is_fake_event {
                    // fake frames carry trigger zero; take the reference so
                    // the frame-to-frame comparison stays quiet
                    trigger = ftsw & FTSW_TRIGGER_MASK;
                } else {
                    spdlog::error!(
                        "Trigger numbers do not match for this frame: ${:x} != ${:x} (FTSW)",
                        trigger,
                        ftsw
                    );
                    flags.insert(EventError::FtswMismatch);
                }
            }
        }

        if frame_nr > 0
            && frame_nr + 1 < frames_in_event
            && state.dhh_starts != state.dhh_ends + 1
            && !matches!(kind, FrameType::Hltroi | FrameType::DhhStart)
        {
            spdlog::error!("Data frame outside a DHH START/END");
            flags.insert(EventError::DataOutsideDhh);
        }

        match &parsed {
            Frame::DirectReadout(f) => {
                state.counted_frames += 1;
                if state.current_dhh_id != Some(f.dhh_id()) {
                    spdlog::error!(
                        "DHH id from DHH_START and this frame do not match: {:?} != {}",
                        state.current_dhh_id,
                        f.dhh_id()
                    );
                    flags.insert(EventError::DhhStartIdMismatch);
                }
                // empty packets of a fixed length come from a known merger
                // bug and carry a garbage checksum
                let quirk = self.config.ignore_empty_dhp
                    && f.kind() == FrameType::DhpOnsen
                    && bytes.len() == DHP_ONSEN_EMPTY_QUIRK_LEN;
                if !quirk {
                    check_frame_crc(bytes, flags, stats);
                }
                state.found_dhp_mask |= 1 << f.dhp_port();
                if f.kind() == FrameType::DhpRaw {
                    // pedestal data, payload format not decoded here
                    stats.raw_frames += 1;
                } else {
                    stats.zsd_frames += 1;
                    let ctx = DhpContext {
                        dhh_id: f.dhh_id(),
                        dhp_port: f.dhp_port(),
                        reformat: f.reformat_flag(),
                        start_frame_nr: state.start_frame_nr,
                        trigger_offset: state.trigger_offset,
                        sensor: state.current_sensor,
                    };
                    decode_dhp(
                        f.dhp_payload(),
                        &ctx,
                        &self.config,
                        &mut out.hits,
                        flags,
                        stats,
                    );
                }
            }
            Frame::Fce(f) => {
                state.counted_frames += 1;
                spdlog::warn!("FCE frame type not supported, payload skipped");
                if state.current_dhh_id != Some(f.dhh_id()) {
                    spdlog::error!(
                        "DHH id from DHH_START and this frame do not match: {:?} != {}",
                        state.current_dhh_id,
                        f.dhh_id()
                    );
                    flags.insert(EventError::DhhStartIdMismatch);
                }
                check_frame_crc(bytes, flags, stats);
            }
            Frame::Commode(f) => {
                state.counted_frames += 1;
                if state.current_dhh_id != Some(f.dhh_id()) {
                    spdlog::error!(
                        "DHH id from DHH_START and this frame do not match: {:?} != {}",
                        state.current_dhh_id,
                        f.dhh_id()
                    );
                    flags.insert(EventError::DhhStartIdMismatch);
                }
                check_frame_crc(bytes, flags, stats);
            }
            Frame::DhhcStart(f) => {
                let fake = f.is_fake();
                if fake != state.is_fake_event {
                    spdlog::error!("DHHC_START fake-ness does not match the event");
                }
                if fake {
                    spdlog::warn!("Faked DHHC_START data -> trigger without data");
                    flags.insert(EventError::FakeTriggerNoData);
                }
                state.last_trigger = Some(trigger);
                state.current_dhh_id = None;
                state.current_sensor = SensorId::default();
                state.declared_frames = f.nr_frames() as u32;
                state.counted_frames = 1;
                check_frame_crc(bytes, flags, stats);
                stats.start_frames += 1;
                state.active_dhh_count = (f.active_dhh_mask() & 0x1F).count_ones();
            }
            Frame::DhhStart(f) => {
                state.counted_frames += 1;
                state.start_frame_nr = f.start_frame_nr();
                state.trigger_offset = f.trigger_offset();
                state.current_dhh_id = Some(f.dhh_id());
                check_frame_crc(bytes, flags, stats);
                if state.dhh_starts != state.dhh_ends {
                    spdlog::error!("DHH_START without previous DHH_END");
                    flags.insert(EventError::DhhStartWithoutEnd);
                }
                state.dhh_starts += 1;
                state.found_dhp_mask = 0;
                state.expected_dhp_mask = f.active_dhp_mask();
                state.current_sensor = SensorId::from_dhh_id(f.dhh_id());
            }
            Frame::Ghost(f) => {
                state.counted_frames += 1;
                if state.current_dhh_id != Some(f.dhh_id()) {
                    spdlog::error!(
                        "DHH id from DHH_START and this frame do not match: {:?} != {}",
                        state.current_dhh_id,
                        f.dhh_id()
                    );
                    flags.insert(EventError::DhhStartIdMismatch);
                }
                // firmware may send ghosts for all DHPs, not only active ones
                state.found_dhp_mask |= 1 << f.dhp_port();
                check_frame_crc(bytes, flags, stats);
                stats.ghost_frames += 1;
            }
            Frame::DhhcEnd(f) => {
                if f.is_fake() != state.is_fake_event {
                    spdlog::error!("DHHC_END fake-ness does not match the event");
                }
                state.counted_frames += 1;
                state.current_dhh_id = None;
                state.current_sensor = SensorId::default();
                if state.is_fake_event {
                    spdlog::warn!("Faked DHHC_END data -> trigger without data");
                    flags.insert(EventError::FakeTriggerNoData);
                }
                stats.end_frames += 1;
                if !state.is_fake_event {
                    if state.counted_frames != state.declared_frames {
                        if !self.config.ignore_dhhc_frame_count {
                            spdlog::error!(
                                "Number of DHHC frames in header {} != {} counted",
                                state.declared_frames,
                                state.counted_frames
                            );
                        }
                        flags.insert(EventError::FramecountMismatch);
                    }
                    let declared_bytes = f.words_in_event() as usize * 2;
                    if state.byte_count + 2 != declared_bytes {
                        spdlog::warn!(
                            "Words in event mismatch: counted {} bytes, end frame declares {}",
                            state.byte_count + 2,
                            declared_bytes
                        );
                        stats.wie_error += 1;
                    }
                }
                check_frame_crc(bytes, flags, stats);
            }
            Frame::DhhEnd(f) => {
                state.counted_frames += 1;
                if state.current_dhh_id != Some(f.dhh_id()) {
                    spdlog::error!(
                        "DHH id from DHH_START and DHH_END do not match: {:?} != {}",
                        state.current_dhh_id,
                        f.dhh_id()
                    );
                    flags.insert(EventError::DhhStartEndIdMismatch);
                }
                state.current_dhh_id = None;
                state.current_sensor = SensorId::default();
                check_frame_crc(bytes, flags, stats);
                if state.found_dhp_mask != state.expected_dhp_mask {
                    if !self.config.ignore_dhp_mask {
                        spdlog::error!(
                            "DHH_END: DHP active mask ${:x} != ${:x} of found DHP/ghost frames",
                            state.expected_dhp_mask,
                            state.found_dhp_mask
                        );
                    }
                    flags.insert(EventError::DhpActiveMismatch);
                }
                state.dhh_ends += 1;
                if state.dhh_starts != state.dhh_ends {
                    spdlog::error!("DHH_END without DHH_START");
                    flags.insert(EventError::DhhStartMissing);
                }
            }
            Frame::Hltroi(f) => {
                // merger frames do not count toward the DHHC frame total
                process_hltroi(f, &self.config, &mut out.rois, flags, stats);
                check_frame_crc(bytes, flags, stats);
            }
            Frame::Unknown(f) => {
                spdlog::error!(
                    "Unknown DHHC frame type ${:x}",
                    f.word0().frame_type().code()
                );
                flags.insert(EventError::DhhcUnknownType);
                stats.type_error += 1;
            }
        }

        if let Some(last) = state.last_trigger {
            if trigger != last {
                spdlog::error!(
                    "Frame trigger number != DHHC trigger number: ${:x} != ${:x}",
                    trigger,
                    last
                );
                flags.insert(EventError::DhhcDhhMismatch);
                stats.evtnr_error += 1;
            }
        }

        if frame_nr == 0 {
            if kind != FrameType::DhhcStart {
                spdlog::error!("First frame is not a DHHC_START frame");
                flags.insert(EventError::DhhcStartMissing);
            }
        } else if kind == FrameType::DhhcStart {
            spdlog::error!("More than one DHHC_START frame in the event");
            flags.insert(EventError::DhhcStart2);
        }

        if frame_nr + 1 == frames_in_event {
            if kind != FrameType::DhhcEnd {
                spdlog::error!("Last frame is not a DHHC_END frame");
                flags.insert(EventError::DhhcEndMissing);
            }
            if state.dhh_starts != state.dhh_ends || state.dhh_starts != state.active_dhh_count {
                spdlog::error!(
                    "DHH start/end count does not match the active-DHH mask: active {} starts {} ends {}",
                    state.active_dhh_count,
                    state.dhh_starts,
                    state.dhh_ends
                );
                flags.insert(EventError::DhhActiveMismatch);
            }
        } else if kind == FrameType::DhhcEnd {
            spdlog::error!("More than one DHHC_END frame in the event");
            flags.insert(EventError::DhhcEnd2);
        }

        if frame_nr == 1 && state.active_dhh_count != 0 && kind != FrameType::DhhStart {
            spdlog::error!("Second frame is not a DHH_START frame");
            flags.insert(EventError::DhhStartMissing);
        }

        state.byte_count += bytes.len();
    }
}

fn check_frame_crc(bytes: &[u8], flags: &mut EventErrorFlags, stats: &mut DecoderStatistics) {
    if !crc::frame_crc_ok(bytes) {
        spdlog::error!("DHHC frame CRC mismatch ({} bytes)", bytes.len());
        flags.insert(EventError::DhhCrcError);
        stats.crc_error += 1;
    }
}
