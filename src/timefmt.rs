//! Serde helpers for the calendar types used in the API.
//!
//! Dates travel as `YYYY-MM-DD`. Schedule timestamps are naive
//! (`YYYY-MM-DDTHH:MM:SS`); inputs carrying a UTC offset are normalised to UTC.

pub mod date {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::{macros::format_description, Date};

    pub fn parse(s: &str) -> Result<Date, time::error::Parse> {
        Date::parse(s, format_description!("[year]-[month]-[day]"))
    }

    pub fn format(d: &Date) -> Result<String, time::error::Format> {
        d.format(format_description!("[year]-[month]-[day]"))
    }

    pub fn serialize<S: Serializer>(value: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        let s = format(value).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(de::Error::custom)
    }

    pub mod option {
        use serde::{de, Deserialize, Deserializer};
        use time::Date;

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Date>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::parse(s.trim()).map_err(de::Error::custom))
                .transpose()
        }
    }
}

pub mod naive {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::{
        format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
        PrimitiveDateTime, UtcOffset,
    };

    pub fn parse(s: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
        if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
            let utc = dt.to_offset(UtcOffset::UTC);
            return Ok(PrimitiveDateTime::new(utc.date(), utc.time()));
        }
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
        .or_else(|_| {
            PrimitiveDateTime::parse(
                s,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
            )
        })
    }

    pub fn format(dt: &PrimitiveDateTime) -> Result<String, time::error::Format> {
        dt.format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]"
        ))
    }

    pub fn serialize<S: Serializer>(
        value: &PrimitiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let s = format(value).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<PrimitiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(de::Error::custom)
    }

    pub mod option {
        use serde::{de, Deserialize, Deserializer, Serializer};
        use time::PrimitiveDateTime;

        pub fn serialize<S: Serializer>(
            value: &Option<PrimitiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<PrimitiveDateTime>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::parse(s.trim()).map_err(de::Error::custom))
                .transpose()
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in partial updates. Use with `#[serde(default)]`.
pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}
