//! Access-code authentication.
//!
//! Codes are opaque lookup keys: a 6-digit convention exists on the minting
//! side, but length and format are deliberately not checked here. Validity
//! is existence + active flag + expiry strictly after the *call* time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthFailure, StoreError};

/// One row of the external access-code store. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCode {
    pub code: String,
    pub user_id: Uuid,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
}

/// A successfully authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedCaller {
    pub user_id: Uuid,
    pub display_name: String,
}

/// Read access to the external access-code store and the user directory.
pub trait AccessCodeStore {
    async fn lookup(&self, code: &str) -> Result<Option<AccessCode>, StoreError>;
    async fn display_name(&self, user_id: Uuid) -> Result<Option<String>, StoreError>;
}

/// Validate a candidate code against call time and resolve the caller.
///
/// A store failure is surfaced as `AuthFailure::NotFound` after logging —
/// from the caller's side an unreachable code store and a wrong code get
/// the same single retry.
pub async fn authenticate<C: AccessCodeStore>(
    codes: &C,
    candidate: &str,
    call_time: DateTime<Utc>,
) -> Result<AuthenticatedCaller, AuthFailure> {
    let record = match codes.lookup(candidate).await {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(error = %err, "access code lookup failed");
            return Err(AuthFailure::NotFound);
        }
    };
    let Some(record) = record else {
        return Err(AuthFailure::NotFound);
    };
    if !record.is_active {
        return Err(AuthFailure::Inactive);
    }
    if record.expires_at <= call_time {
        return Err(AuthFailure::Expired);
    }
    let display_name = codes
        .display_name(record.user_id)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| "there".to_string());
    Ok(AuthenticatedCaller {
        user_id: record.user_id,
        display_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;

    struct FixedCodes {
        codes: HashMap<String, AccessCode>,
        names: HashMap<Uuid, String>,
    }

    impl AccessCodeStore for FixedCodes {
        async fn lookup(&self, code: &str) -> Result<Option<AccessCode>, StoreError> {
            Ok(self.codes.get(code).cloned())
        }

        async fn display_name(&self, user_id: Uuid) -> Result<Option<String>, StoreError> {
            Ok(self.names.get(&user_id).cloned())
        }
    }

    fn store_with(code: AccessCode, name: &str) -> FixedCodes {
        let mut codes = HashMap::new();
        let mut names = HashMap::new();
        names.insert(code.user_id, name.to_string());
        codes.insert(code.code.clone(), code);
        FixedCodes { codes, names }
    }

    #[tokio::test]
    async fn valid_code_resolves_caller() {
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let store = store_with(
            AccessCode {
                code: "614203".into(),
                user_id,
                is_active: true,
                expires_at: now + Duration::hours(1),
            },
            "Asha",
        );
        let caller = authenticate(&store, "614203", now).await.unwrap();
        assert_eq!(caller.user_id, user_id);
        assert_eq!(caller.display_name, "Asha");
    }

    #[tokio::test]
    async fn expired_code_is_rejected_even_if_active() {
        let now = Utc::now();
        let store = store_with(
            AccessCode {
                code: "614203".into(),
                user_id: Uuid::new_v4(),
                is_active: true,
                expires_at: now - Duration::minutes(1),
            },
            "Asha",
        );
        assert_eq!(
            authenticate(&store, "614203", now).await.unwrap_err(),
            AuthFailure::Expired
        );
    }

    #[tokio::test]
    async fn expiry_boundary_is_strict() {
        let now = Utc::now();
        let store = store_with(
            AccessCode {
                code: "100000".into(),
                user_id: Uuid::new_v4(),
                is_active: true,
                expires_at: now,
            },
            "Asha",
        );
        assert_eq!(
            authenticate(&store, "100000", now).await.unwrap_err(),
            AuthFailure::Expired
        );
    }

    #[tokio::test]
    async fn inactive_and_unknown_codes_are_rejected() {
        let now = Utc::now();
        let store = store_with(
            AccessCode {
                code: "222222".into(),
                user_id: Uuid::new_v4(),
                is_active: false,
                expires_at: now + Duration::hours(1),
            },
            "Asha",
        );
        assert_eq!(
            authenticate(&store, "222222", now).await.unwrap_err(),
            AuthFailure::Inactive
        );
        assert_eq!(
            authenticate(&store, "999999", now).await.unwrap_err(),
            AuthFailure::NotFound
        );
    }
}
