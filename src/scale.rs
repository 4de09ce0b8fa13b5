use crate::error::{Result, TesiraError};

/// Quietest representable percentage; keeps the logarithm away from zero
/// and corresponds to the device's -100.0 dB floor.
pub(crate) const MIN_PERCENT: f64 = 0.369786371648;

/// Convert a 0-100 percentage into the device's dB scale, rendered with
/// one decimal digit the way the device expects it on the wire.
///
/// The curve is `20 * ln(percent / 100) + 12` — natural log, not base-10.
/// The deployed fleet is calibrated against this curve, so it must not be
/// "corrected" to a textbook decibel formula.
pub fn to_device_db(percent: &str) -> Result<String> {
    let value: f64 = percent
        .parse()
        .map_err(|e| TesiraError::Transform(format!("error converting volume {percent:?}: {e}")))?;
    let clamped = value.max(MIN_PERCENT);
    let db = 20.0 * (clamped / 100.0).ln() + 12.0;
    Ok(format!("{db:.1}"))
}

/// Convert a device dB value back into a 0-100 percentage, rendered as an
/// integer for the control layer.
pub fn to_percent(db: &str) -> Result<String> {
    let value: f64 = db
        .parse()
        .map_err(|e| TesiraError::Transform(format!("error converting volume {db:?}: {e}")))?;
    let percent = ((value - 12.0) / 20.0).exp() * 100.0;
    Ok(format!("{percent:.0}"))
}
