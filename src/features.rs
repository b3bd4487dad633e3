use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;

/// Column order of every feature vector, shared by training and serving.
pub const FEATURE_NAMES: [&str; N_FEATURES] =
    ["arrival_hour", "day_of_week", "booked_duration_minutes"];

pub const N_FEATURES: usize = 3;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("invalid timestamp {value:?}")]
    Invalid { value: String },

    #[error("cannot mix offset and naive timestamps: {start:?} / {end:?}")]
    MixedOffsets { start: String, end: String },
}

/// A parsed timestamp: the wall-clock reading, plus its UTC instant when
/// the input carried an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Zoned {
    local: NaiveDateTime,
    utc: Option<NaiveDateTime>,
}

fn parse_zoned(raw: &str) -> Result<Zoned, TimestampError> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Zoned {
            local: dt.naive_local(),
            utc: Some(dt.naive_utc()),
        });
    }
    let naive = |local| Zoned { local, utc: None };
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive(dt));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(naive(d.and_time(NaiveTime::MIN)));
    }
    Err(TimestampError::Invalid {
        value: raw.to_string(),
    })
}

/// Parses a calendar timestamp to its wall-clock reading. An offset, if
/// present, is not applied.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, TimestampError> {
    parse_zoned(raw).map(|z| z.local)
}

pub(crate) fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub arrival_hour: u32,
    /// Monday = 0 .. Sunday = 6
    pub day_of_week: u32,
    /// Not clamped: malformed bookings yield a negative duration.
    pub booked_duration_minutes: f64,
}

impl FeatureVector {
    pub fn derive(arrival: NaiveDateTime, booked_end: NaiveDateTime) -> Self {
        Self {
            arrival_hour: arrival.hour(),
            day_of_week: arrival.weekday().num_days_from_monday(),
            booked_duration_minutes: minutes_between(arrival, booked_end),
        }
    }

    /// Parses both ends of a booking. Hour and weekday come from the
    /// arrival's wall clock; when both ends carry offsets the duration is
    /// the real elapsed time between them. One offset without the other
    /// is rejected.
    pub fn from_booking(start: &str, end: &str) -> Result<Self, TimestampError> {
        let arrival = parse_zoned(start)?;
        let booked_end = parse_zoned(end)?;
        let mut fv = Self::derive(arrival.local, booked_end.local);
        match (arrival.utc, booked_end.utc) {
            (None, None) => {}
            (Some(a), Some(e)) => fv.booked_duration_minutes = minutes_between(a, e),
            _ => {
                return Err(TimestampError::MixedOffsets {
                    start: start.to_string(),
                    end: end.to_string(),
                })
            }
        }
        Ok(fv)
    }

    /// Values in `FEATURE_NAMES` order.
    pub fn as_array(&self) -> [f64; N_FEATURES] {
        [
            self.arrival_hour as f64,
            self.day_of_week as f64,
            self.booked_duration_minutes,
        ]
    }
}
