//! Kubernetes quantity parsing for byte sizes.

use crate::error::ControllerError;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const SUFFIXES: [(&str, f64); 12] = [
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a memory-style quantity ("128Mi", "1G", "1500") into bytes.
pub fn to_bytes(quantity: &Quantity) -> Result<f64, ControllerError> {
    let raw = quantity.0.trim();
    let invalid = || ControllerError::InvalidQuantity(format!("{raw:?}"));

    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| raw.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((raw, 1.0));

    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(value * multiplier)
}

/// `ceil(quantity * factor)` as a plain byte quantity.
pub fn scale(quantity: &Quantity, factor: f64) -> Result<Quantity, ControllerError> {
    let bytes = (to_bytes(quantity)? * factor).ceil();
    Ok(Quantity(format!("{bytes:.0}")))
}
