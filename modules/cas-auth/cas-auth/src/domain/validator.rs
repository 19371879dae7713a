//! Backchannel ticket validation (`/validate`, CAS 1.0 plaintext response).

use std::sync::Arc;

use async_trait::async_trait;
use cas_auth_sdk::{
    CasTransport, TicketValidator, TransportError, ValidationFailure, ValidationOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::urls;

/// [`TicketValidator`] that calls `{base}/validate` through a [`CasTransport`].
pub struct CasTicketValidator {
    server_base: String,
    transport: Arc<dyn CasTransport>,
}

impl CasTicketValidator {
    #[must_use]
    pub fn new(server_base: impl Into<String>, transport: Arc<dyn CasTransport>) -> Self {
        Self {
            server_base: server_base.into(),
            transport,
        }
    }
}

#[async_trait]
impl TicketValidator for CasTicketValidator {
    #[tracing::instrument(skip_all)]
    async fn validate(
        &self,
        ticket: &str,
        service_url: &str,
        cancellation: &CancellationToken,
    ) -> ValidationOutcome {
        let url = urls::validate_url(&self.server_base, service_url, ticket);

        let body = tokio::select! {
            () = cancellation.cancelled() => Err(TransportError::Cancelled),
            result = self.transport.get(&url) => result,
        };

        match body {
            Ok(body) => parse_validation_response(&body),
            Err(TransportError::Cancelled) => {
                debug!("ticket validation cancelled by caller");
                ValidationOutcome::failure(ValidationFailure::TransportError)
            }
            Err(e) => {
                error!(error = %e, "ticket validation request failed");
                ValidationOutcome::failure(ValidationFailure::TransportError)
            }
        }
    }
}

/// Parse a CAS 1.0 `/validate` body.
///
/// `yes\n<principal>\n` is a success, `no\n` a rejection; any other shape is
/// malformed. A single trailing newline and `\r\n` line endings are tolerated.
#[must_use]
pub fn parse_validation_response(body: &str) -> ValidationOutcome {
    let body = body.strip_suffix('\n').unwrap_or(body);
    let mut lines = body.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

    let outcome = match (lines.next(), lines.next(), lines.next()) {
        (Some("yes"), Some(principal), None) if !principal.is_empty() => {
            ValidationOutcome::Success {
                principal_name: principal.to_owned(),
            }
        }
        (Some("no"), None, None) => ValidationOutcome::failure(ValidationFailure::TicketRejected),
        _ => ValidationOutcome::failure(ValidationFailure::MalformedResponse),
    };

    match &outcome {
        ValidationOutcome::Success { principal_name } => {
            info!(principal = %principal_name, "CAS ticket validated");
        }
        ValidationOutcome::Failure {
            reason: ValidationFailure::TicketRejected,
        } => debug!("CAS server rejected ticket"),
        ValidationOutcome::Failure { .. } => {
            warn!(body_len = body.len(), "malformed CAS validation response");
        }
    }
    outcome
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;

    struct StubTransport {
        response: Mutex<Option<Result<String, TransportError>>>,
        urls: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl StubTransport {
        fn replying(response: Result<String, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
                urls: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CasTransport for StubTransport {
        async fn get(&self, url: &str) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_owned());
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(TransportError::Connect("exhausted".to_owned())))
        }
    }

    struct HangingTransport;

    #[async_trait]
    impl CasTransport for HangingTransport {
        async fn get(&self, _url: &str) -> Result<String, TransportError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("yes\nlate\n".to_owned())
        }
    }

    #[test]
    fn yes_with_principal_is_success() {
        assert_eq!(
            parse_validation_response("yes\nalice"),
            ValidationOutcome::Success {
                principal_name: "alice".to_owned()
            }
        );
        assert_eq!(
            parse_validation_response("yes\nalice\n"),
            ValidationOutcome::Success {
                principal_name: "alice".to_owned()
            }
        );
        assert_eq!(
            parse_validation_response("yes\r\nalice\r\n"),
            ValidationOutcome::Success {
                principal_name: "alice".to_owned()
            }
        );
    }

    #[test]
    fn no_is_ticket_rejected() {
        let expected = ValidationOutcome::failure(ValidationFailure::TicketRejected);

        assert_eq!(parse_validation_response("no"), expected);
        assert_eq!(parse_validation_response("no\n"), expected);
    }

    #[test]
    fn other_shapes_are_malformed() {
        let malformed = ValidationOutcome::failure(ValidationFailure::MalformedResponse);

        for body in [
            "",
            "\n",
            "yes",
            "yes\n",
            "yes\n\nalice\n",
            "Yes\nalice",
            "maybe\nalice",
            "no\nalice",
            "yes\nalice\nbob",
            "<cas:serviceResponse/>",
        ] {
            assert_eq!(parse_validation_response(body), malformed, "body {body:?}");
        }
    }

    #[test]
    #[traced_test]
    fn malformed_body_is_not_logged() {
        let outcome = parse_validation_response("<html>private-body-marker</html>");

        assert_eq!(
            outcome,
            ValidationOutcome::failure(ValidationFailure::MalformedResponse)
        );
        assert!(logs_contain("malformed CAS validation response"));
        assert!(!logs_contain("private-body-marker"));
    }

    #[tokio::test]
    #[traced_test]
    async fn ticket_is_not_logged_on_transport_failure() {
        let transport = StubTransport::replying(Err(TransportError::Status(502)));
        let validator = CasTicketValidator::new("https://sso/cas", transport);

        validator
            .validate("ST-private-ticket", "https://host/cb?state=s", &CancellationToken::new())
            .await;

        assert!(logs_contain("ticket validation request failed"));
        assert!(!logs_contain("ST-private-ticket"));
    }

    #[tokio::test]
    async fn validate_builds_validation_url() {
        let transport = StubTransport::replying(Ok("yes\nalice\n".to_owned()));
        let validator = CasTicketValidator::new("https://sso/cas", transport.clone());

        let outcome = validator
            .validate(
                "ST-123",
                "https://host/signin-cas?state=abc",
                &CancellationToken::new(),
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(
            transport.urls.lock().unwrap().as_slice(),
            ["https://sso/cas/validate?service=https%3A%2F%2Fhost%2Fsignin-cas%3Fstate%3Dabc&ticket=ST-123"]
        );
    }

    #[tokio::test]
    async fn transport_failure_is_not_retried() {
        let transport = StubTransport::replying(Err(TransportError::Status(503)));
        let validator = CasTicketValidator::new("https://sso/cas", transport.clone());

        let outcome = validator
            .validate("ST-1", "https://host/cb?state=s", &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            ValidationOutcome::failure(ValidationFailure::TransportError)
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_call() {
        let validator = CasTicketValidator::new("https://sso/cas", Arc::new(HangingTransport));
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            validator.validate("ST-1", "https://host/cb?state=s", &cancellation),
        )
        .await
        .expect("validation should stop once cancelled");

        assert_eq!(
            outcome,
            ValidationOutcome::failure(ValidationFailure::TransportError)
        );
    }
}
