use super::codec::ParsedRequest;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of one echoed header
///
/// A header sent once is echoed as a plain string, a repeated header as the
/// list of its values in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderField {
    Single(String),
    Repeated(Vec<String>),
}

impl HeaderField {
    /// Returns the value if the header was sent exactly once
    pub fn as_single(&self) -> Option<&str> {
        match self {
            HeaderField::Single(value) => Some(value),
            HeaderField::Repeated(_) => None,
        }
    }

    /// Returns every value of the header, in arrival order
    pub fn values(&self) -> Vec<&str> {
        match self {
            HeaderField::Single(value) => vec![value.as_str()],
            HeaderField::Repeated(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Structured reflection of one received HTTP request
///
/// Built once per completed request and serialized back to the sender.
/// Field order is the order in which the fields appear in the JSON document.
///
/// # Examples
///
/// ```
/// use reqecho::http::EchoRecord;
///
/// let json = r#"{"method":"GET","url":"/","headers":{},"body":"","time":"2026-10-19T08:15:02.517Z"}"#;
/// let record: EchoRecord = serde_json::from_str(json).unwrap();
/// assert_eq!(record.method, "GET");
/// assert!(record.timestamp().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoRecord {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, HeaderField>,
    pub body: String,
    pub time: String,
}

impl EchoRecord {
    /// Captures a record for `request`, stamped with the current time
    ///
    /// The stamp is read from the system wall clock, so `time` only stays
    /// non-decreasing across requests while that clock is not stepped back.
    pub fn capture(request: &ParsedRequest) -> Self {
        Self::captured_at(request, Utc::now())
    }

    /// Captures a record for `request`, stamped with `now`
    pub fn captured_at(request: &ParsedRequest, now: DateTime<Utc>) -> Self {
        Self {
            method: request.method.clone(),
            url: request.target.clone(),
            headers: collect_headers(&request.headers),
            body: String::from_utf8_lossy(&request.body).into_owned(),
            time: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Looks up an echoed header by name, ignoring case
    pub fn header(&self, name: &str) -> Option<&HeaderField> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    /// Parses the `time` field back into a timestamp
    pub fn timestamp(&self) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(&self.time)
    }

    /// Pretty-printed JSON document sent back to the client
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, HeaderField> {
    headers
        .keys()
        .map(|name| {
            let mut values: Vec<String> = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect();
            let field = if values.len() == 1 {
                HeaderField::Single(values.remove(0))
            } else {
                HeaderField::Repeated(values)
            };
            (name.as_str().to_owned(), field)
        })
        .collect()
}
