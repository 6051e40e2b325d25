//! # pxd_unpacker
//!
//! pxd_unpacker decodes the raw binary readout stream produced by the PXD
//! front-end electronics ("ONSEN" event stream) into typed pixel-hit and
//! region-of-interest records. One event packet carries a frame table and a
//! sequence of DHHC frames: DHHC_START/END bracket the sub-event,
//! DHH_START/END bracket each half-ladder, and the direct-readout frames in
//! between carry the zero-suppressed DHP pixel words. Every frame ends in a
//! CRC-32 checksum; trigger numbers, frame counts and active-channel masks
//! are cross-checked across frames.
//!
//! The decoder is deliberately forgiving: structural damage to the packet
//! header or frame table rejects the whole event, but everything else is
//! accumulated into a per-event error mask while decoding continues, so a
//! single corrupt frame never costs the rest of the event. Per-kind error
//! counters are kept across the run and reported at the end.
//!
//! ## Library use
//!
//! The host framework hands each raw event buffer to
//! [`unpacker::PxdUnpacker::unpack_event`] together with a run-wide
//! [`statistics::DecoderStatistics`], and owns the returned hit and ROI
//! collections. The decode is single-threaded and re-entrant across events;
//! workers on disjoint event ranges keep their own statistics and merge them
//! at the end of the run.
//!
//! ## Standalone use
//!
//! For lab use without an event builder, [`raw_file::RawFile`] reads ONSEN
//! network-dump files event by event and [`process::process_run`] drives a
//! whole dump through the unpacker. The `pxd_unpacker_cli` binary wraps this
//! in a small command line tool.
//!
//! The YAML configuration format:
//!
//! ```yml
//! dump_path: /data/onsen_run0042.dat
//! max_events: null
//! ignore_datcon: true
//! ignore_dhhc_frame_count: true
//! ignore_dhp_mask: true
//! ignore_dhp_port_differ: true
//! ignore_empty_dhp: true
//! validate_only: false
//! ```
//!
//! The `ignore_*` switches silence the per-occurrence log lines of known,
//! recoverable conditions; the conditions are still flagged and counted
//! (except for the DHP port comparison, which is skipped entirely).
//!
//! ## Output
//!
//! Each event yields a [`unpacker::EventOutput`]: the `PixelHit` list, the
//! `RawRoi` list and the 32-bit error mask. At run end a statistics summary
//! is logged with one line per error kind that occurred, or a single "no
//! errors" line.
pub mod config;
pub mod constants;
pub mod crc;
pub mod dhp;
pub mod error;
pub mod frame;
pub mod hit;
pub mod process;
pub mod raw_file;
pub mod roi;
pub mod sensor_id;
pub mod statistics;
pub mod unpacker;
pub mod wire;
