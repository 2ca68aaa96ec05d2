//! Failure classification.

use std::collections::BTreeSet;
use std::fmt;

use super::DeliveryReport;
use crate::errors::DeliveryError;

/// HTTP statuses retried by [`HttpStatusClassifier`] by default.
pub const DEFAULT_TRANSIENT_STATUSES: [u16; 8] = [429, 500, 501, 502, 503, 504, 505, 507];

/// Retryability of a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Likely to succeed if retried.
    Transient,
    /// Not worth retrying.
    Terminal,
}

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryOutcome {
    /// The delivery succeeded.
    Success,
    /// The delivery failed and may be retried.
    TransientFailure,
    /// The delivery failed for good.
    TerminalFailure,
}

/// Decides whether a delivery error is transient or terminal.
pub trait OutcomeClassifier: Send + Sync + fmt::Debug {
    /// Classifies an executor error.
    fn classify(&self, error: &DeliveryError) -> FailureClass;

    /// Classifies the full result of an attempt.
    fn outcome(&self, result: &Result<DeliveryReport, DeliveryError>) -> DeliveryOutcome {
        match result {
            Ok(_) => DeliveryOutcome::Success,
            Err(error) => match self.classify(error) {
                FailureClass::Transient => DeliveryOutcome::TransientFailure,
                FailureClass::Terminal => DeliveryOutcome::TerminalFailure,
            },
        }
    }
}

/// I/O and connection-class errors are transient, everything else terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl OutcomeClassifier for DefaultClassifier {
    fn classify(&self, error: &DeliveryError) -> FailureClass {
        if error.is_io_class() {
            FailureClass::Transient
        } else {
            FailureClass::Terminal
        }
    }
}

/// Classifier for HTTP connectors.
///
/// Transient: I/O-class errors and the configured statuses. Terminal: any
/// other status and every other error.
#[derive(Debug, Clone)]
pub struct HttpStatusClassifier {
    transient_statuses: BTreeSet<u16>,
}

impl Default for HttpStatusClassifier {
    fn default() -> Self {
        Self {
            transient_statuses: DEFAULT_TRANSIENT_STATUSES.into_iter().collect(),
        }
    }
}

impl HttpStatusClassifier {
    /// Creates a classifier with the default transient statuses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a status to the transient set.
    #[must_use]
    pub fn with_transient_status(mut self, status: u16) -> Self {
        self.transient_statuses.insert(status);
        self
    }

    /// Removes a status from the transient set.
    #[must_use]
    pub fn without_transient_status(mut self, status: u16) -> Self {
        self.transient_statuses.remove(&status);
        self
    }

    /// Returns true if `status` is retried.
    #[must_use]
    pub fn is_transient_status(&self, status: u16) -> bool {
        self.transient_statuses.contains(&status)
    }
}

impl OutcomeClassifier for HttpStatusClassifier {
    fn classify(&self, error: &DeliveryError) -> FailureClass {
        if error.is_io_class() {
            return FailureClass::Transient;
        }
        match error.status() {
            Some(status) if self.is_transient_status(status) => FailureClass::Transient,
            _ => FailureClass::Terminal,
        }
    }
}

/// A classifier backed by a closure.
pub struct FnClassifier<F>(pub F);

impl<F> fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnClassifier").finish()
    }
}

impl<F> OutcomeClassifier for FnClassifier<F>
where
    F: Fn(&DeliveryError) -> FailureClass + Send + Sync,
{
    fn classify(&self, error: &DeliveryError) -> FailureClass {
        (self.0)(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_default_classifier() {
        let classifier = DefaultClassifier;
        let io_err = DeliveryError::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));

        assert_eq!(classifier.classify(&io_err), FailureClass::Transient);
        assert_eq!(
            classifier.classify(&DeliveryError::timeout("10s")),
            FailureClass::Transient
        );
        assert_eq!(
            classifier.classify(&DeliveryError::http(503, "")),
            FailureClass::Terminal
        );
        assert_eq!(
            classifier.classify(&DeliveryError::rejected("bad auth")),
            FailureClass::Terminal
        );
    }

    #[test]
    fn test_http_classifier_statuses() {
        let classifier = HttpStatusClassifier::new();
        for status in DEFAULT_TRANSIENT_STATUSES {
            assert_eq!(
                classifier.classify(&DeliveryError::http(status, "")),
                FailureClass::Transient,
                "status {status}"
            );
        }
        for status in [400, 401, 403, 404, 410, 506, 508] {
            assert_eq!(
                classifier.classify(&DeliveryError::http(status, "")),
                FailureClass::Terminal,
                "status {status}"
            );
        }
        assert_eq!(
            classifier.classify(&DeliveryError::connection("refused")),
            FailureClass::Transient
        );
    }

    #[test]
    fn test_http_classifier_customisation() {
        let classifier = HttpStatusClassifier::new()
            .with_transient_status(408)
            .without_transient_status(501);

        assert!(classifier.is_transient_status(408));
        assert!(!classifier.is_transient_status(501));
    }

    #[test]
    fn test_fn_classifier() {
        let classifier = FnClassifier(|error: &DeliveryError| {
            if error.to_string().contains("rate limited") {
                FailureClass::Transient
            } else {
                FailureClass::Terminal
            }
        });

        assert_eq!(
            classifier.classify(&DeliveryError::rejected("rate limited")),
            FailureClass::Transient
        );
        assert_eq!(
            classifier.classify(&DeliveryError::rejected("invalid channel")),
            FailureClass::Terminal
        );
    }

    #[test]
    fn test_outcome_maps_success() {
        let classifier = DefaultClassifier;
        assert_eq!(
            classifier.outcome(&Ok(DeliveryReport::default())),
            DeliveryOutcome::Success
        );
        assert_eq!(
            classifier.outcome(&Err(DeliveryError::timeout("x"))),
            DeliveryOutcome::TransientFailure
        );
        assert_eq!(
            classifier.outcome(&Err(DeliveryError::rejected("x"))),
            DeliveryOutcome::TerminalFailure
        );
    }
}
