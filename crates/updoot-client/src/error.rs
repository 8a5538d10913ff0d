use thiserror::Error;

use updoot_types::api::ErrorKind;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP {status} ({kind:?}): {message}")]
    Api {
        status: u16,
        kind: ErrorKind,
        message: String,
    },

    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    #[error("decode: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The caller should be sent to sign in before retrying.
    pub fn requires_login(&self) -> bool {
        self.kind() == Some(ErrorKind::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_not_authenticated_requires_login() {
        let err = |kind| ClientError::Api {
            status: 0,
            kind,
            message: String::new(),
        };
        assert!(err(ErrorKind::NotAuthenticated).requires_login());
        assert!(!err(ErrorKind::Forbidden).requires_login());
        assert!(!ClientError::Decode("bad json".into()).requires_login());
    }
}
