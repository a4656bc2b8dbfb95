//! Kubernetes resource quantity parsing
//!
//! k8s-openapi ships `Quantity` as an opaque string. The plugin needs the
//! numeric value in base and milli units, so the canonical suffix set is
//! parsed here: milli (`m`), decimal SI (`k`, `M`, `G`, `T`, `P`, `E`),
//! binary SI (`Ki` .. `Ei`) and plain scientific notation.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Parse a quantity string into its value in base units
pub fn parse_quantity(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    // Binary suffixes are two characters ending in 'i'
    if let Some(stripped) = s.strip_suffix('i') {
        let (num, power) = match stripped.chars().last()? {
            'K' => (&stripped[..stripped.len() - 1], 1),
            'M' => (&stripped[..stripped.len() - 1], 2),
            'G' => (&stripped[..stripped.len() - 1], 3),
            'T' => (&stripped[..stripped.len() - 1], 4),
            'P' => (&stripped[..stripped.len() - 1], 5),
            'E' => (&stripped[..stripped.len() - 1], 6),
            _ => return None,
        };
        return num.parse::<f64>().ok().map(|v| v * 1024f64.powi(power));
    }

    let last = s.chars().last()?;
    // A trailing digit or dot means plain decimal, possibly with an
    // exponent ("1e3" / "1E3") which f64 parsing already handles.
    if last.is_ascii_digit() || last == '.' {
        return s.parse::<f64>().ok();
    }

    let num = &s[..s.len() - last.len_utf8()];
    let factor = match last {
        'm' => 1e-3,
        'k' => 1e3,
        'M' => 1e6,
        'G' => 1e9,
        'T' => 1e12,
        'P' => 1e15,
        'E' => 1e18,
        _ => return None,
    };
    num.parse::<f64>().ok().map(|v| v * factor)
}

/// Value of a quantity in base units, rounded up like `Quantity::Value`.
/// Malformed quantities read as zero; cluster objects passed validation.
pub fn value(q: &Quantity) -> i64 {
    parse_quantity(&q.0).map(|v| v.ceil() as i64).unwrap_or(0)
}

/// Value of a quantity in milli units
pub fn milli_value(q: &Quantity) -> i64 {
    parse_quantity(&q.0)
        .map(|v| (v * 1000.0).round() as i64)
        .unwrap_or(0)
}
