use anyhow::{Result, bail};

const EARTH_RADIUS_M: f64 = 6_378_137.0;
// Latitude where the square web-mercator plane ends.
const MERCATOR_LAT_LIMIT: f64 = 85.051_128_779_806_6;

/// Stateless per-tuple conversion between coordinate reference systems.
/// A failed conversion is a hard failure and aborts the stream.
pub trait CrsTransformer {
    fn transform(&self, coord: &mut [f64]) -> Result<()>;
}

/// Spherical-mercator conversion between CRS84/EPSG:4326 longitude/latitude
/// and EPSG:3857 metres. A third tuple slot passes through untouched.
pub struct WebMercator {
    inverse: bool,
}

impl WebMercator {
    /// Longitude/latitude degrees to mercator metres.
    pub fn to_mercator() -> Self {
        Self { inverse: false }
    }

    /// Mercator metres to longitude/latitude degrees.
    pub fn to_degrees() -> Self {
        Self { inverse: true }
    }
}

impl CrsTransformer for WebMercator {
    fn transform(&self, coord: &mut [f64]) -> Result<()> {
        if coord.len() < 2 {
            bail!("coordinate tuple has {} values, need at least 2", coord.len());
        }
        if self.inverse {
            let lon = (coord[0] / EARTH_RADIUS_M).to_degrees();
            let lat = ((coord[1] / EARTH_RADIUS_M).exp().atan() * 2.0 - std::f64::consts::FRAC_PI_2)
                .to_degrees();
            coord[0] = lon;
            coord[1] = lat;
        } else {
            let lat = coord[1];
            if !(-MERCATOR_LAT_LIMIT..=MERCATOR_LAT_LIMIT).contains(&lat) {
                bail!("latitude {} outside the web-mercator domain", lat);
            }
            coord[0] = coord[0].to_radians() * EARTH_RADIUS_M;
            coord[1] = (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
                .tan()
                .ln()
                * EARTH_RADIUS_M;
        }
        Ok(())
    }
}

/// PROJ-backed conversion for arbitrary CRS pairs, available with the `proj`
/// cargo feature.
#[cfg(feature = "proj")]
pub struct ProjTransformer {
    proj: proj::Proj,
}

#[cfg(feature = "proj")]
impl ProjTransformer {
    pub fn new(source: &str, target: &str) -> Result<Self> {
        Ok(Self {
            proj: proj::Proj::new_known_crs(source, target, None)?,
        })
    }
}

#[cfg(feature = "proj")]
impl CrsTransformer for ProjTransformer {
    fn transform(&self, coord: &mut [f64]) -> Result<()> {
        if coord.len() < 2 {
            bail!("coordinate tuple has {} values, need at least 2", coord.len());
        }
        let (x, y) = self.proj.convert((coord[0], coord[1]))?;
        coord[0] = x;
        coord[1] = y;
        Ok(())
    }
}

/// Formats a coordinate to at most 7 decimal places with half-down rounding
/// and trailing zeros trimmed. Formatting the result again is a fixpoint.
/// Callers are expected to hand in finite values.
pub fn format_coordinate(value: f64) -> String {
    let negative = value.is_sign_negative();
    // Twelve fractional digits see safely past the 7th place without picking
    // up representation noise from the tail of the mantissa.
    let text = format!("{:.12}", value.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text.as_str(), ""),
    };

    let keep = frac_part.len().min(7);
    let mut digits: Vec<u8> = frac_part.as_bytes()[..keep].iter().map(|b| b - b'0').collect();
    let tail = &frac_part.as_bytes()[keep..];

    // Half-down: only a remainder strictly above one half bumps the last digit.
    let round_up = match tail.first() {
        Some(&d) if d > b'5' => true,
        Some(&d) if d == b'5' => tail[1..].iter().any(|&b| b > b'0'),
        _ => false,
    };

    let mut int_text = int_part.to_string();
    if round_up {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            *digit += 1;
            if *digit == 10 {
                *digit = 0;
            } else {
                carry = false;
                break;
            }
        }
        if carry {
            int_text = increment_decimal(&int_text);
        }
    }

    while digits.last() == Some(&0) {
        digits.pop();
    }

    let mut out = String::new();
    if negative && (int_text != "0" || !digits.is_empty()) {
        out.push('-');
    }
    out.push_str(&int_text);
    if !digits.is_empty() {
        out.push('.');
        for digit in digits {
            out.push((b'0' + digit) as char);
        }
    }
    out
}

fn increment_decimal(text: &str) -> String {
    let mut digits: Vec<u8> = text.bytes().collect();
    for digit in digits.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return String::from_utf8_lossy(&digits).into_owned();
        }
    }
    let mut out = String::with_capacity(digits.len() + 1);
    out.push('1');
    out.push_str(&String::from_utf8_lossy(&digits));
    out
}
