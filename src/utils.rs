use chrono::{DateTime, SecondsFormat, Utc};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Column representation of a timestamp.
pub fn to_db_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
