//! Job payload schema accepted at the queue boundary.
//!
//! Payloads are validated here so the ingestion handler only ever receives a
//! well-formed [`IngestionJob`]. Anything that fails the schema is a
//! [`MalformedPayload`] and is never retried.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::domain::{Error, IngestionJob, SeriesKey};

/// Wire shape of one ingestion job.
///
/// # Examples
/// ```
/// use price_series::inbound::queue::JobPayload;
///
/// let job = JobPayload::parse(br#"{"key":"0xabc","requestedStart":"2023-06-22"}"#)
///     .expect("valid payload")
///     .into_job();
/// assert!(!job.force_refresh);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobPayload {
    /// Series to ingest.
    pub key: SeriesKey,
    /// Purge and reload instead of appending.
    #[serde(default)]
    pub force_refresh: bool,
    /// First day requested from the price source.
    pub requested_start: NaiveDate,
}

/// Payload rejected by schema validation.
#[derive(Debug, Error)]
#[error("malformed job payload: {message}")]
pub struct MalformedPayload {
    message: String,
}

impl MalformedPayload {
    /// Parser diagnostic describing the failure.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

impl JobPayload {
    /// Decode and validate a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload`] when the bytes are not valid JSON, miss a
    /// required field, carry an unknown field, or hold an invalid key or date.
    pub fn parse(raw: &[u8]) -> Result<Self, MalformedPayload> {
        serde_json::from_slice(raw).map_err(|error| MalformedPayload {
            message: error.to_string(),
        })
    }

    /// Convert into the domain job.
    pub fn into_job(self) -> IngestionJob {
        IngestionJob {
            key: self.key,
            force_refresh: self.force_refresh,
            requested_start: self.requested_start,
        }
    }
}

impl From<MalformedPayload> for Error {
    fn from(error: MalformedPayload) -> Self {
        Error::invalid_request(error.to_string()).with_details(json!({
            "code": "malformed_payload",
        }))
    }
}

#[cfg(test)]
mod tests {
    //! Schema coverage for queue payloads.

    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    fn parses_full_payload() {
        let payload = JobPayload::parse(
            br#"{"key":"0xabc","forceRefresh":true,"requestedStart":"2023-06-22"}"#,
        )
        .expect("valid payload");

        assert_eq!(
            payload.into_job(),
            IngestionJob {
                key: SeriesKey::new("0xabc").expect("valid key"),
                force_refresh: true,
                requested_start: NaiveDate::from_ymd_opt(2023, 6, 22).expect("valid date"),
            }
        );
    }

    #[rstest]
    fn force_refresh_defaults_to_false() {
        let payload = JobPayload::parse(br#"{"key":"0xabc","requestedStart":"2023-06-22"}"#)
            .expect("valid payload");
        assert!(!payload.force_refresh);
    }

    #[rstest]
    #[case::not_json("not json")]
    #[case::missing_key(r#"{"requestedStart":"2023-06-22"}"#)]
    #[case::missing_start(r#"{"key":"0xabc"}"#)]
    #[case::blank_key(r#"{"key":"  ","requestedStart":"2023-06-22"}"#)]
    #[case::bad_date(r#"{"key":"0xabc","requestedStart":"2023-02-30"}"#)]
    #[case::timestamp_date(r#"{"key":"0xabc","requestedStart":"2023-06-22T00:00:00Z"}"#)]
    #[case::unknown_field(r#"{"key":"0xabc","requestedStart":"2023-06-22","priority":1}"#)]
    #[case::snake_case_field(r#"{"key":"0xabc","requested_start":"2023-06-22"}"#)]
    #[case::wrong_type(r#"{"key":"0xabc","forceRefresh":"yes","requestedStart":"2023-06-22"}"#)]
    fn rejects_malformed_payloads(#[case] raw: &str) {
        let error = JobPayload::parse(raw.as_bytes()).expect_err("payload should be rejected");
        assert!(!error.message().is_empty());
    }

    #[rstest]
    fn malformed_payload_maps_to_non_retryable_error() {
        let error: Error = JobPayload::parse(b"{}")
            .expect_err("payload should be rejected")
            .into();

        assert_eq!(error.code(), ErrorCode::InvalidRequest);
        assert!(!error.is_retryable());
        assert_eq!(
            error.details(),
            Some(&json!({ "code": "malformed_payload" }))
        );
    }
}
