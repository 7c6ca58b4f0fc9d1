use chrono::{DateTime, LocalResult, TimeZone, Utc};
use mongodb::bson::DateTime as BsonDateTime;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

pub fn bson_to_chrono(dt: &BsonDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_else(Utc::now)
}

pub fn bson_to_iso(dt: &BsonDateTime) -> String {
    match Utc.timestamp_millis_opt(dt.timestamp_millis()) {
        LocalResult::Single(value) => value.to_rfc3339(),
        LocalResult::Ambiguous(first, _) => first.to_rfc3339(),
        LocalResult::None => Utc.timestamp_millis_opt(0).unwrap().to_rfc3339(),
    }
}

/// Serde adapter: store a `chrono::DateTime<Utc>` field as a native bson
/// datetime. Use with `#[serde(with = "crate::utils::time::chrono_bson")]`.
pub mod chrono_bson {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        chrono_to_bson(*dt).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let bson = BsonDateTime::deserialize(deserializer)?;
        Ok(bson_to_chrono(&bson))
    }
}

/// Same adapter for optional datetime fields.
pub mod chrono_bson_opt {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(value) => serializer.serialize_some(&chrono_to_bson(*value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let bson: Option<BsonDateTime> = Option::deserialize(deserializer)?;
        Ok(bson.as_ref().map(bson_to_chrono))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bson() {
        let now = Utc::now();
        let bson = chrono_to_bson(now);
        let back = bson_to_chrono(&bson);
        assert_eq!(now.timestamp_millis(), back.timestamp_millis());
    }

    #[test]
    fn iso_rendering_is_rfc3339() {
        let bson = BsonDateTime::from_millis(0);
        assert!(bson_to_iso(&bson).starts_with("1970-01-01T00:00:00"));
    }
}
