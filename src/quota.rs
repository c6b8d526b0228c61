//! Quota Manager (spec §4.3): classifies an upstream response as a quota or content-length
//! event from its status code and body markers. Pure logic — the Upstream Client calls this on
//! every non-success response before deciding how to fail.

const MONTHLY_REQUEST_COUNT_MARKER: &str = "MONTHLY_REQUEST_COUNT";
const CONTENT_LENGTH_MARKER: &str = "CONTENT_LENGTH_EXCEEDS_THRESHOLD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaOutcome {
    /// Not a quota or content-length event; handle the status normally.
    None,
    /// Cool the account down for 300s and let the caller retry with a fresh selection.
    QuotaExceeded { marker: String },
    /// Permanent for this request; never retry, never cool the account down.
    ContentTooLong { marker: String },
}

pub fn classify(status: reqwest::StatusCode, body: &str) -> QuotaOutcome {
    if body.contains(CONTENT_LENGTH_MARKER) {
        return QuotaOutcome::ContentTooLong {
            marker: CONTENT_LENGTH_MARKER.to_string(),
        };
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || body.contains(MONTHLY_REQUEST_COUNT_MARKER) {
        return QuotaOutcome::QuotaExceeded {
            marker: MONTHLY_REQUEST_COUNT_MARKER.to_string(),
        };
    }
    QuotaOutcome::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_without_marker_is_quota_exceeded() {
        let outcome = classify(reqwest::StatusCode::TOO_MANY_REQUESTS, "rate limited");
        assert_eq!(
            outcome,
            QuotaOutcome::QuotaExceeded {
                marker: MONTHLY_REQUEST_COUNT_MARKER.to_string()
            }
        );
    }

    #[test]
    fn marker_in_body_is_quota_exceeded_regardless_of_status() {
        let outcome = classify(
            reqwest::StatusCode::FORBIDDEN,
            "error: MONTHLY_REQUEST_COUNT exceeded",
        );
        assert!(matches!(outcome, QuotaOutcome::QuotaExceeded { .. }));
    }

    #[test]
    fn content_length_marker_never_cools_the_account() {
        let outcome = classify(
            reqwest::StatusCode::BAD_REQUEST,
            "CONTENT_LENGTH_EXCEEDS_THRESHOLD",
        );
        assert_eq!(
            outcome,
            QuotaOutcome::ContentTooLong {
                marker: CONTENT_LENGTH_MARKER.to_string()
            }
        );
    }

    #[test]
    fn ordinary_error_is_not_a_quota_event() {
        assert_eq!(
            classify(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            QuotaOutcome::None
        );
    }
}
