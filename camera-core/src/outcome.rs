use serde::Serialize;

/// Terminal state of one subsystem's bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BringupOutcome<T> {
    Ready(T),
    /// Usable, but something about it needs an operator's attention.
    Degraded { value: T, reason: String },
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    Ready,
    Degraded,
    Unavailable,
}

/// Serializable tag of a [`BringupOutcome`] with its reason, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeStatus {
    pub state: OutcomeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl<T> BringupOutcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        BringupOutcome::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        BringupOutcome::Unavailable(reason.into())
    }

    pub fn state(&self) -> OutcomeState {
        match self {
            BringupOutcome::Ready(_) => OutcomeState::Ready,
            BringupOutcome::Degraded { .. } => OutcomeState::Degraded,
            BringupOutcome::Unavailable(_) => OutcomeState::Unavailable,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, BringupOutcome::Ready(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            BringupOutcome::Ready(value) | BringupOutcome::Degraded { value, .. } => Some(value),
            BringupOutcome::Unavailable(_) => None,
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        let reason = match self {
            BringupOutcome::Ready(_) => None,
            BringupOutcome::Degraded { reason, .. } | BringupOutcome::Unavailable(reason) => {
                Some(reason.clone())
            }
        };
        OutcomeStatus {
            state: self.state(),
            reason,
        }
    }

    /// Split into the handle (if any) and its reportable status.
    pub fn into_parts(self) -> (Option<T>, OutcomeStatus) {
        let status = self.status();
        let value = match self {
            BringupOutcome::Ready(value) | BringupOutcome::Degraded { value, .. } => Some(value),
            BringupOutcome::Unavailable(_) => None,
        };
        (value, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_carries_reason() {
        let ready: BringupOutcome<u8> = BringupOutcome::Ready(1);
        assert_eq!(ready.status().reason, None);

        let degraded = BringupOutcome::degraded(2u8, "nearly full");
        assert_eq!(degraded.state(), OutcomeState::Degraded);
        assert_eq!(degraded.status().reason.as_deref(), Some("nearly full"));
        assert_eq!(degraded.value(), Some(&2));
        assert!(!degraded.is_ready());

        let gone: BringupOutcome<u8> = BringupOutcome::unavailable("no card");
        assert_eq!(gone.value(), None);
    }

    #[test]
    fn test_into_parts_moves_handle() {
        let (value, status) = BringupOutcome::degraded(String::from("h"), "x").into_parts();
        assert_eq!(value.as_deref(), Some("h"));
        assert_eq!(status.state, OutcomeState::Degraded);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let gone: BringupOutcome<()> = BringupOutcome::unavailable("timeout");
        let json = serde_json::to_string(&gone.status()).unwrap();
        assert_eq!(json, r#"{"state":"unavailable","reason":"timeout"}"#);

        let ready = BringupOutcome::Ready(());
        let json = serde_json::to_string(&ready.status()).unwrap();
        assert_eq!(json, r#"{"state":"ready"}"#);
    }
}
