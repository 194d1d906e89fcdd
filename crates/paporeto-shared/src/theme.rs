//! Accent colour math for the global style variables.

use crate::error::ColorError;

/// Parse `#RRGGBB` into its channels.
pub fn parse_hex_color(color: &str) -> Result<[u8; 3], ColorError> {
    let digits = color
        .strip_prefix('#')
        .ok_or_else(|| ColorError::InvalidHex(color.to_string()))?;
    let mut rgb = [0u8; 3];
    hex::decode_to_slice(digits, &mut rgb).map_err(|_| ColorError::InvalidHex(color.to_string()))?;
    Ok(rgb)
}

/// Lighten (positive) or darken (negative) each channel by `percent` of itself.
pub fn shade_color(color: &str, percent: f64) -> Result<String, ColorError> {
    let rgb = parse_hex_color(color)?;
    let shaded = rgb.map(|c| {
        let c = c as f64;
        (c + c * percent / 100.0).clamp(0.0, 255.0).round() as u8
    });
    Ok(format!("#{}", hex::encode(shaded)))
}

/// CSS variables derived from an accent colour, in application order.
pub fn accent_variables(color: &str) -> Result<Vec<(&'static str, String)>, ColorError> {
    let [r, g, b] = parse_hex_color(color)?;
    Ok(vec![
        ("--green", color.to_string()),
        ("--green-dark", shade_color(color, -20.0)?),
        ("--green-glow", format!("rgba({r},{g},{b},0.2)")),
        ("--sent-bg", format!("rgba({r},{g},{b},0.07)")),
        ("--sent-border", format!("rgba({r},{g},{b},0.2)")),
    ])
}
