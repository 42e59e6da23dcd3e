use serde::Serialize;

/// Result of one reconciliation call
///
/// `changed` is only true when a remote mutation was actually performed.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Outcome<T = ()> {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<T>,
}

impl<T> Outcome<T> {
    pub fn unchanged() -> Self {
        Self {
            changed: false,
            output: None,
        }
    }

    pub fn new(changed: bool) -> Self {
        Self {
            changed,
            output: None,
        }
    }

    pub fn with_output(changed: bool, output: T) -> Self {
        Self {
            changed,
            output: Some(output),
        }
    }
}
