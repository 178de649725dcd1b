use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Non-negative seconds elapsed from `earlier` to `later`.
pub(crate) fn elapsed_seconds(earlier: PrimitiveDateTime, later: PrimitiveDateTime) -> f64 {
    (later - earlier).max(Duration::ZERO).as_seconds_f64()
}
