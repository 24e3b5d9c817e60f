//! Response classification for the dispatch retry loop.
//!
//! Pure function of HTTP status and body so every branch is testable without
//! a network.

use voltbridge_domain::constants::BUS_NOT_READY_SIGNAL;

/// Classified outcome of a single command attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Vehicle accepted the command
    Success,
    /// HTTP 200 but the vehicle's internal bus was not ready yet; retry
    TransientBus,
    /// Server-side or timeout status worth retrying as-is
    TransientHttp,
    /// Access token rejected; refresh credentials before retrying
    Reauth,
    /// Vehicle id no longer resolves; re-list vehicles
    VehicleGone,
    /// Vehicle is in deep sleep and must be re-resolved after a wait
    DeepSleep,
    /// Non-retryable rejection
    Fatal,
}

/// Classify a command attempt from the raw HTTP status and response body.
///
/// A 200 is only a success when the payload's `response.result` is absent or
/// true; the vendor reports some command rejections inside a 200 body.
#[must_use]
pub fn classify(status: u16, body: &str) -> Outcome {
    match status {
        200 => classify_ok_body(body),
        400 | 408 | 502 | 504 => Outcome::TransientHttp,
        401 => Outcome::Reauth,
        404 => Outcome::VehicleGone,
        428 => Outcome::DeepSleep,
        _ => Outcome::Fatal,
    }
}

fn classify_ok_body(body: &str) -> Outcome {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        // Empty or non-JSON 200 bodies count as acceptance
        return Outcome::Success;
    };

    let response = &value["response"];
    match response.get("result").and_then(serde_json::Value::as_bool) {
        Some(true) | None => Outcome::Success,
        Some(false) => {
            let reason = response.get("reason").and_then(serde_json::Value::as_str).unwrap_or("");
            if reason.contains(BUS_NOT_READY_SIGNAL) {
                Outcome::TransientBus
            } else {
                Outcome::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_with_result_true_is_success() {
        let body = r#"{"response":{"result":true,"reason":""}}"#;
        assert_eq!(classify(200, body), Outcome::Success);
    }

    #[test]
    fn ok_without_result_field_is_success() {
        // Data endpoints return the payload directly, no result flag
        let body = r#"{"response":{"id":12345,"state":"online"}}"#;
        assert_eq!(classify(200, body), Outcome::Success);
    }

    #[test]
    fn ok_with_empty_body_is_success() {
        assert_eq!(classify(200, ""), Outcome::Success);
    }

    #[test]
    fn bus_not_ready_is_transient() {
        let body = r#"{"response":{"result":false,"reason":"could not wake buses"}}"#;
        assert_eq!(classify(200, body), Outcome::TransientBus);
    }

    #[test]
    fn other_rejection_reason_is_fatal() {
        let body = r#"{"response":{"result":false,"reason":"cabin_overheat_protection_on"}}"#;
        assert_eq!(classify(200, body), Outcome::Fatal);
    }

    #[test]
    fn transient_http_statuses() {
        for status in [400, 408, 502, 504] {
            assert_eq!(classify(status, ""), Outcome::TransientHttp, "status {status}");
        }
    }

    #[test]
    fn auth_and_resolution_statuses() {
        assert_eq!(classify(401, ""), Outcome::Reauth);
        assert_eq!(classify(404, ""), Outcome::VehicleGone);
        assert_eq!(classify(428, ""), Outcome::DeepSleep);
    }

    #[test]
    fn unexpected_statuses_are_fatal() {
        assert_eq!(classify(403, ""), Outcome::Fatal);
        assert_eq!(classify(500, ""), Outcome::Fatal);
        assert_eq!(classify(503, ""), Outcome::Fatal);
    }
}
