use super::error::{EventError, EventErrorFlags, NUM_EVENT_ERRORS};

/// Run-wide decoder statistics.
///
/// The statistics object is owned by the caller and passed into every event
/// decode; workers processing disjoint event ranges keep their own instance
/// and [`merge`](DecoderStatistics::merge) them at the end of the run. Error
/// kinds are counted at most once per event, mirroring the per-event error
/// mask.
#[derive(Debug, Clone)]
pub struct DecoderStatistics {
    /// Number of events passed through the unpacker.
    pub unpacked_events: u64,
    /// Per-error-kind event counts, indexed by [`EventError`] bit position.
    pub error_counter: [u64; NUM_EVENT_ERRORS],
    /// Frames whose checksum did not match.
    pub crc_error: u64,
    /// Frames with an unknown type code.
    pub type_error: u64,
    /// Frames whose trigger number disagreed with the sub-event.
    pub evtnr_error: u64,
    /// Sub-events whose word count disagreed with the DHHC_END declaration.
    pub wie_error: u64,
    /// DHP frames too short to decode.
    pub dhp_size_error: u64,
    /// DHP frames aborted on a pixel word without a row.
    pub dhp_pixel_error: u64,
    pub start_frames: u64,
    pub end_frames: u64,
    pub ghost_frames: u64,
    pub raw_frames: u64,
    pub zsd_frames: u64,
}

impl Default for DecoderStatistics {
    fn default() -> Self {
        Self {
            unpacked_events: 0,
            error_counter: [0; NUM_EVENT_ERRORS],
            crc_error: 0,
            type_error: 0,
            evtnr_error: 0,
            wie_error: 0,
            dhp_size_error: 0,
            dhp_pixel_error: 0,
            start_frames: 0,
            end_frames: 0,
            ghost_frames: 0,
            raw_frames: 0,
            zsd_frames: 0,
        }
    }
}

impl DecoderStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished event's error mask into the per-kind counters.
    pub fn record_event(&mut self, flags: &EventErrorFlags) {
        self.unpacked_events += 1;
        for kind in flags.iter() {
            self.error_counter[kind as usize] += 1;
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_counter.iter().any(|c| *c != 0)
    }

    /// Combine the counters of another worker into this one.
    pub fn merge(&mut self, other: &Self) {
        self.unpacked_events += other.unpacked_events;
        for (mine, theirs) in self.error_counter.iter_mut().zip(other.error_counter.iter()) {
            *mine += *theirs;
        }
        self.crc_error += other.crc_error;
        self.type_error += other.type_error;
        self.evtnr_error += other.evtnr_error;
        self.wie_error += other.wie_error;
        self.dhp_size_error += other.dhp_size_error;
        self.dhp_pixel_error += other.dhp_pixel_error;
        self.start_frames += other.start_frames;
        self.end_frames += other.end_frames;
        self.ghost_frames += other.ghost_frames;
        self.raw_frames += other.raw_frames;
        self.zsd_frames += other.zsd_frames;
    }

    /// Log the run summary: one line per error kind that occurred, or a
    /// single all-clear line.
    pub fn report(&self) {
        if self.has_errors() {
            spdlog::error!(
                "PXD unpacker error statistics (counted once per event) in {} events:",
                self.unpacked_events
            );
            for kind in EventError::ALL {
                let count = self.error_counter[kind as usize];
                if count != 0 {
                    spdlog::error!("{}: {}", kind.description(), count);
                }
            }
            if self.wie_error != 0 {
                spdlog::error!("Words in event mismatch: {}", self.wie_error);
            }
        } else {
            spdlog::info!(
                "PXD unpacker found no errors in {} events",
                self.unpacked_events
            );
        }
        spdlog::info!(
            "Frames seen -- start: {} end: {} ghost: {} raw: {} zsd: {}",
            self.start_frames,
            self.end_frames,
            self.ghost_frames,
            self.raw_frames,
            self.zsd_frames
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_event_counts_once_per_kind() {
        let mut stats = DecoderStatistics::new();
        let mut flags = EventErrorFlags::new();
        flags.insert(EventError::DhhCrcError);
        flags.insert(EventError::NoDatconError);
        stats.record_event(&flags);
        stats.record_event(&EventErrorFlags::new());
        assert_eq!(stats.unpacked_events, 2);
        assert_eq!(stats.error_counter[EventError::DhhCrcError as usize], 1);
        assert_eq!(stats.error_counter[EventError::NoDatconError as usize], 1);
        assert_eq!(stats.error_counter[EventError::MagicError as usize], 0);
        assert!(stats.has_errors());
    }

    #[test]
    fn test_merge() {
        let mut a = DecoderStatistics::new();
        let mut b = DecoderStatistics::new();
        let mut flags = EventErrorFlags::new();
        flags.insert(EventError::DhpSizeError);
        a.record_event(&flags);
        b.record_event(&flags);
        b.crc_error = 3;
        a.merge(&b);
        assert_eq!(a.unpacked_events, 2);
        assert_eq!(a.error_counter[EventError::DhpSizeError as usize], 2);
        assert_eq!(a.crc_error, 3);
    }
}
