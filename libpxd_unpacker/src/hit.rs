use super::sensor_id::SensorId;

/// One decoded pixel hit from a zero-suppressed DHP frame.
///
/// Hits are created inside the DHP payload decoder and pushed straight into
/// the event output collection; they are never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelHit {
    pub sensor: SensorId,
    /// Pixel row after even/odd reassembly, 0..~768.
    pub row: u16,
    /// Pixel column after remap and per-chip offset, 0..255.
    pub column: u16,
    /// 8-bit pulse height.
    pub adc: u8,
    /// Trigger row offset taken from the enclosing DHH_START.
    pub trigger_offset: u16,
    /// Readout frame number relative to the DHH start frame, modulo 64.
    pub frame_offset: u8,
    /// 6-bit common mode correction of the hit's row.
    pub common_mode: u8,
}

/// The raw region-of-interest block delivered by the ONSEN merger frame.
///
/// Both trigger branches (HLT and DATCON) are kept verbatim together with
/// the untouched 64-bit ROI payload words, magic errors included; validation
/// results travel separately in the event error mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRoi {
    pub magic_hlt: u32,
    pub trigger_hlt: u32,
    pub magic_datcon: u32,
    pub trigger_datcon: u32,
    pub rois: Vec<u64>,
}

impl RawRoi {
    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }
}
