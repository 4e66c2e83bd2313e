use std::time::Duration;

use farm_model::{HEADER_HARD_TIMEOUT, HEADER_SOFT_TIMEOUT, RawTimeoutHeaders};
use lapin::{
    BasicProperties,
    types::{AMQPValue, FieldTable, ShortString},
};

const PERSISTENT: u8 = 2;

/// Properties of a job message: persistent JSON with optional expiration and timeout headers.
///
/// A zero `ttl` publishes without expiration.
pub fn job_properties(headers: &RawTimeoutHeaders, ttl: Duration, message_id: &str) -> BasicProperties {
    let mut props = BasicProperties::default()
        .with_delivery_mode(PERSISTENT)
        .with_content_type(ShortString::from("application/json"))
        .with_message_id(ShortString::from(message_id));
    if !ttl.is_zero() {
        props = props.with_expiration(ShortString::from(ttl.as_millis().to_string()));
    }
    if !headers.is_empty() {
        props = props.with_headers(to_field_table(headers));
    }
    props
}

fn to_field_table(headers: &RawTimeoutHeaders) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in [
        (HEADER_SOFT_TIMEOUT, &headers.soft_timeout_s),
        (HEADER_HARD_TIMEOUT, &headers.hard_timeout_s),
    ] {
        if let Some(v) = value {
            let amqp = match v.parse::<i64>() {
                Ok(n) => AMQPValue::LongLongInt(n),
                Err(_) => AMQPValue::LongString(v.clone().into()),
            };
            table.insert(ShortString::from(key), amqp);
        }
    }
    table
}

/// Timeout overrides found on a delivered message, as text.
pub fn timeout_headers(props: &BasicProperties) -> RawTimeoutHeaders {
    let Some(table) = props.headers() else {
        return RawTimeoutHeaders::default();
    };
    let get = |key: &str| {
        table
            .inner()
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .and_then(|(_, v)| as_text(v))
    };
    RawTimeoutHeaders {
        soft_timeout_s: get(HEADER_SOFT_TIMEOUT),
        hard_timeout_s: get(HEADER_HARD_TIMEOUT),
    }
}

fn as_text(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::ShortShortInt(v) => Some(v.to_string()),
        AMQPValue::ShortShortUInt(v) => Some(v.to_string()),
        AMQPValue::ShortInt(v) => Some(v.to_string()),
        AMQPValue::ShortUInt(v) => Some(v.to_string()),
        AMQPValue::LongInt(v) => Some(v.to_string()),
        AMQPValue::LongUInt(v) => Some(v.to_string()),
        AMQPValue::LongLongInt(v) => Some(v.to_string()),
        AMQPValue::Float(v) => Some(v.to_string()),
        AMQPValue::Double(v) => Some(v.to_string()),
        AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
        AMQPValue::LongString(s) => Some(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_maps_to_expiration_in_millis() {
        let props = job_properties(&RawTimeoutHeaders::default(), Duration::from_secs(600), "m1");
        assert_eq!(props.expiration().as_ref().map(|s| s.as_str()), Some("600000"));
        assert_eq!(*props.delivery_mode(), Some(PERSISTENT));
        assert!(props.headers().is_none());
    }

    #[test]
    fn zero_ttl_means_no_expiration() {
        let props = job_properties(&RawTimeoutHeaders::default(), Duration::ZERO, "m2");
        assert!(props.expiration().is_none());
    }

    #[test]
    fn timeout_headers_survive_the_trip() {
        let raw = RawTimeoutHeaders::new(Some(5), Some(10));
        let props = job_properties(&raw, Duration::ZERO, "m3");
        assert_eq!(timeout_headers(&props), raw);
    }

    #[test]
    fn foreign_header_types_are_read_as_text() {
        let mut table = FieldTable::default();
        table.insert(HEADER_SOFT_TIMEOUT.into(), AMQPValue::LongString("7".to_string().into()));
        table.insert(HEADER_HARD_TIMEOUT.into(), AMQPValue::Boolean(true));
        let props = BasicProperties::default().with_headers(table);

        let raw = timeout_headers(&props);
        assert_eq!(raw.soft_timeout_s.as_deref(), Some("7"));
        assert_eq!(raw.hard_timeout_s, None);
    }
}
