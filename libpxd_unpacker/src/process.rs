use std::sync::{Arc, Mutex};

use super::config::Config;
use super::error::ProcessorError;
use super::raw_file::RawFile;
use super::statistics::DecoderStatistics;
use super::unpacker::PxdUnpacker;

/// The main loop: feed every event of an ONSEN dump through the unpacker.
///
/// Decoded hits and ROIs are dropped after each event here; the run product
/// is the error accounting. A host framework embedding the library calls
/// [`PxdUnpacker::unpack_event`] directly and keeps the collections.
pub fn process_run(
    config: &Config,
    progress: &Arc<Mutex<f32>>,
) -> Result<DecoderStatistics, ProcessorError> {
    let mut raw_file = RawFile::new(&config.dump_path)?;
    spdlog::info!(
        "Processing ONSEN dump {} with total size: {}",
        config.dump_path.to_string_lossy(),
        human_bytes::human_bytes(raw_file.size_bytes() as f64)
    );

    let unpacker = PxdUnpacker::new(config.clone());
    let mut stats = DecoderStatistics::new();
    let total_bytes = raw_file.size_bytes().max(1);

    let flush_frac = 0.01f32;
    let mut last_progress = 0.0f32;

    while let Some(event) = raw_file.next_event()? {
        let output = unpacker.unpack_event(&event, None, &mut stats);
        if !output.error_flags.is_empty() {
            spdlog::warn!(
                "Event {} unpacked with errors: {}",
                stats.unpacked_events,
                output.error_flags
            );
        }

        let frac = raw_file.bytes_read() as f32 / total_bytes as f32;
        if frac - last_progress > flush_frac {
            last_progress = frac;
            if let Ok(mut value) = progress.lock() {
                *value = frac;
            }
        }

        if let Some(max) = config.max_events {
            if stats.unpacked_events >= max {
                spdlog::info!("Reached the configured limit of {} events.", max);
                break;
            }
        }
    }

    if let Ok(mut value) = progress.lock() {
        *value = 1.0;
    }

    spdlog::info!(
        "Done with dump; unpacked {} events.",
        stats.unpacked_events
    );
    stats.report();
    Ok(stats)
}

/// The function to be called by a separate thread (typically the UI/CLI).
pub fn process(config: Config, progress: Arc<Mutex<f32>>) -> Result<(), ProcessorError> {
    process_run(&config, &progress)?;
    Ok(())
}
