//! Row and column header records and the per-key semantic decoders.
//!
//! Header records are fixed-schema: the row/column key tables give an ordered
//! list of 4-character field names and every used slot stores one word per
//! key. Which semantic decoder applies is decided by key name; keys without a
//! dedicated decoder fall back to the raw integer so no field is ever
//! silently dropped.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::buffer::{ByteOrder, WordBuffer};
use crate::error::GempakError;

/// Leading word marking a row/column header slot as populated.
pub const USED_FLAG: i32 = 9999;
/// Conventional value of the leading word in an empty slot.
pub const UNUSED_FLAG: i32 = -9999;

/// Vertical coordinate codes used by grid column headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalCoordinate {
    Pres,
    Thta,
    Hght,
    Sgma,
    Dpth,
    Hybd,
    Pvab,
    Pvbl,
}

impl VerticalCoordinate {
    pub fn from_code(code: i32) -> Option<VerticalCoordinate> {
        match code {
            1 => Some(VerticalCoordinate::Pres),
            2 => Some(VerticalCoordinate::Thta),
            3 => Some(VerticalCoordinate::Hght),
            4 => Some(VerticalCoordinate::Sgma),
            5 => Some(VerticalCoordinate::Dpth),
            6 => Some(VerticalCoordinate::Hybd),
            7 => Some(VerticalCoordinate::Pvab),
            8 => Some(VerticalCoordinate::Pvbl),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VerticalCoordinate::Pres => "PRES",
            VerticalCoordinate::Thta => "THTA",
            VerticalCoordinate::Hght => "HGHT",
            VerticalCoordinate::Sgma => "SGMA",
            VerticalCoordinate::Dpth => "DPTH",
            VerticalCoordinate::Hybd => "HYBD",
            VerticalCoordinate::Pvab => "PVAB",
            VerticalCoordinate::Pvbl => "PVBL",
        }
    }
}

/// Forecast kind encoded in the high digits of a packed forecast time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastKind {
    Analysis,
    Forecast,
    Guess,
    Initial,
}

impl ForecastKind {
    pub fn from_code(code: i32) -> Option<ForecastKind> {
        match code {
            0 => Some(ForecastKind::Analysis),
            1 => Some(ForecastKind::Forecast),
            2 => Some(ForecastKind::Guess),
            3 => Some(ForecastKind::Initial),
            _ => None,
        }
    }
}

/// One decoded header field.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Raw integer, used for any key without a semantic decoder.
    Int(i32),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Level(i32),
    Coordinate(VerticalCoordinate),
    /// Vertical coordinate outside the fixed enumeration, decoded as the
    /// packed characters of its word.
    CoordinateName(String),
    Forecast {
        kind: ForecastKind,
        duration: Duration,
    },
    Text(String),
    /// Scaled latitude/longitude in degrees.
    Degrees(f64),
    Missing,
}

impl HeaderValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            HeaderValue::Int(v) => Some(*v),
            HeaderValue::Level(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<NaiveDateTime> {
        match self {
            HeaderValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_degrees(&self) -> Option<f64> {
        match self {
            HeaderValue::Degrees(d) => Some(*d),
            _ => None,
        }
    }
}

/// One decoded row or column header, in key-table order.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    fields: Vec<(String, HeaderValue)>,
}

impl Header {
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Scan `count` header slots, emitting one [`Header`] per slot whose leading
/// sentinel equals [`USED_FLAG`]. Unused slots occupy only their sentinel
/// word and contribute nothing; output is strictly file order.
pub(crate) fn read_headers(
    buffer: &mut WordBuffer,
    order: ByteOrder,
    count: usize,
    keys: &[String],
    table: &'static str,
    decode: &dyn Fn(&mut WordBuffer, &str) -> Result<HeaderValue, GempakError>,
) -> Result<Vec<Header>, GempakError> {
    let mut headers = Vec::new();
    for _ in 0..count {
        if buffer.read_i32(order, table)? != USED_FLAG {
            continue;
        }
        let mut fields = Vec::with_capacity(keys.len());
        for key in keys {
            fields.push((key.clone(), decode(buffer, key)?));
        }
        headers.push(Header { fields });
    }
    Ok(headers)
}

fn pivot_year(yy: i32) -> i32 {
    if yy >= 69 {
        1900 + yy
    } else {
        2000 + yy
    }
}

/// Decode a packed date/time integer: either `yymmdd` or `mmddyyhhmm`.
pub(crate) fn convert_dattim(value: i32) -> Result<HeaderValue, GempakError> {
    if value == 0 {
        return Ok(HeaderValue::Missing);
    }
    let invalid = GempakError::InvalidField {
        field: "date-time",
        value,
    };
    let (date, time) = if value < 100_000_000 {
        let yy = value / 10_000;
        let mm = (value / 100) % 100;
        let dd = value % 100;
        let date = NaiveDate::from_ymd_opt(pivot_year(yy), mm as u32, dd as u32).ok_or(invalid)?;
        (date, NaiveTime::MIN)
    } else {
        let mm = value / 100_000_000;
        let dd = (value / 1_000_000) % 100;
        let yy = (value / 10_000) % 100;
        let hh = (value / 100) % 100;
        let mi = value % 100;
        let date = NaiveDate::from_ymd_opt(pivot_year(yy), mm as u32, dd as u32)
            .ok_or_else(|| GempakError::InvalidField {
                field: "date-time",
                value,
            })?;
        let time = NaiveTime::from_hms_opt(hh as u32, mi as u32, 0).ok_or(invalid)?;
        (date, time)
    };
    Ok(HeaderValue::DateTime(NaiveDateTime::new(date, time)))
}

/// Decode a packed `yymmdd` date used by sounding row headers.
pub(crate) fn make_date(value: i32) -> Result<HeaderValue, GempakError> {
    match convert_dattim(value)? {
        HeaderValue::DateTime(dt) => Ok(HeaderValue::Date(dt.date())),
        other => Ok(other),
    }
}

/// Decode a packed `hhmm` time used by sounding row headers.
pub(crate) fn make_time(value: i32) -> Result<HeaderValue, GempakError> {
    let hh = value / 100;
    let mi = value % 100;
    let time = NaiveTime::from_hms_opt(hh as u32, mi as u32, 0).ok_or(
        GempakError::InvalidField {
            field: "time",
            value,
        },
    )?;
    Ok(HeaderValue::Time(time))
}

/// Split a packed forecast integer into a kind and a duration.
pub(crate) fn convert_ftime(value: i32) -> HeaderValue {
    if value == 0 {
        return HeaderValue::Missing;
    }
    let kind = match ForecastKind::from_code(value / 100_000) {
        Some(kind) => kind,
        // Unrecognized forecast kinds decode as the raw value.
        None => return HeaderValue::Int(value),
    };
    let iftime = value - (value / 100_000) * 100_000;
    let hours = iftime / 100;
    let minutes = iftime - hours * 100;
    HeaderValue::Forecast {
        kind,
        duration: Duration::minutes(i64::from(hours) * 60 + i64::from(minutes)),
    }
}

/// Levels at or below zero are absent.
pub(crate) fn convert_level(value: i32) -> HeaderValue {
    if value > 0 {
        HeaderValue::Level(value)
    } else {
        HeaderValue::Missing
    }
}

/// Map small integer codes to the fixed coordinate enumeration; anything else
/// non-zero is decoded as the packed characters of the word.
pub(crate) fn convert_vertical_coord(value: i32, order: ByteOrder) -> HeaderValue {
    if value == 0 {
        return HeaderValue::Missing;
    }
    match VerticalCoordinate::from_code(value) {
        Some(coord) => HeaderValue::Coordinate(coord),
        None => {
            let bytes = match order {
                ByteOrder::Big => value.to_be_bytes(),
                ByteOrder::Little => value.to_le_bytes(),
            };
            HeaderValue::CoordinateName(String::from_utf8_lossy(&bytes).trim().to_string())
        }
    }
}

/// Fixed-width text, trimmed; empty text is absent.
pub(crate) fn trim_text(raw: &str) -> HeaderValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        HeaderValue::Missing
    } else {
        HeaderValue::Text(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dattim_short_form_is_yymmdd() -> Result<(), GempakError> {
        let value = convert_dattim(210_615)?;
        let expected = NaiveDate::from_ymd_opt(2021, 6, 15).unwrap();
        assert_eq!(
            value,
            HeaderValue::DateTime(expected.and_hms_opt(0, 0, 0).unwrap())
        );
        Ok(())
    }

    #[test]
    fn dattim_long_form_is_mmddyyhhmm() -> Result<(), GempakError> {
        let value = convert_dattim(1_231_991_830)?;
        let expected = NaiveDate::from_ymd_opt(1999, 12, 31)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();
        assert_eq!(value, HeaderValue::DateTime(expected));
        Ok(())
    }

    #[test]
    fn dattim_zero_is_missing() -> Result<(), GempakError> {
        assert_eq!(convert_dattim(0)?, HeaderValue::Missing);
        Ok(())
    }

    #[test]
    fn dattim_invalid_month_is_an_error() {
        assert!(matches!(
            convert_dattim(211_401),
            Err(GempakError::InvalidField { .. })
        ));
    }

    #[test]
    fn ftime_splits_kind_and_duration() {
        let value = convert_ftime(100_630);
        assert_eq!(
            value,
            HeaderValue::Forecast {
                kind: ForecastKind::Forecast,
                duration: Duration::minutes(6 * 60 + 30),
            }
        );
    }

    #[test]
    fn ftime_unknown_kind_keeps_raw_value() {
        assert_eq!(convert_ftime(900_000), HeaderValue::Int(900_000));
    }

    #[test]
    fn level_clamps_zero_and_negative() {
        assert_eq!(convert_level(850), HeaderValue::Level(850));
        assert_eq!(convert_level(0), HeaderValue::Missing);
        assert_eq!(convert_level(-1), HeaderValue::Missing);
    }

    #[test]
    fn vertical_coord_maps_codes_and_characters() {
        assert_eq!(
            convert_vertical_coord(1, ByteOrder::Little),
            HeaderValue::Coordinate(VerticalCoordinate::Pres)
        );
        let packed = i32::from_le_bytes(*b"ZAGL");
        assert_eq!(
            convert_vertical_coord(packed, ByteOrder::Little),
            HeaderValue::CoordinateName("ZAGL".to_string())
        );
        assert_eq!(convert_vertical_coord(0, ByteOrder::Little), HeaderValue::Missing);
    }

    #[test]
    fn used_flag_scan_keeps_slot_order() -> Result<(), GempakError> {
        // Slots [used, unused, used]: exactly two headers, slots 0 and 2.
        let mut bytes = Vec::new();
        for word in [9999, 7, -9999, 9999, 11] {
            bytes.extend_from_slice(&i32::to_le_bytes(word));
        }
        let mut buffer = WordBuffer::new(bytes);
        let keys = vec!["STNM".to_string()];
        let headers = read_headers(
            &mut buffer,
            ByteOrder::Little,
            3,
            &keys,
            "row headers",
            &|buffer, _| Ok(HeaderValue::Int(buffer.read_i32(ByteOrder::Little, "row headers")?)),
        )?;
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].get("STNM"), Some(&HeaderValue::Int(7)));
        assert_eq!(headers[1].get("STNM"), Some(&HeaderValue::Int(11)));
        Ok(())
    }
}
