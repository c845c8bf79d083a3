use std::sync::Arc;

use adrule_platform::error::{PlatformError, Result};
use adrule_platform::TokenProvider;
use adrule_storage::CredentialStore;

/// Serves platform tokens from the credential table.
pub struct StoredTokens {
    store: Arc<dyn CredentialStore>,
}

impl StoredTokens {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

impl TokenProvider for StoredTokens {
    fn access_token(&self, user_id: &str, platform: &str) -> Result<Option<String>> {
        self.store
            .access_token(user_id, platform)
            .map_err(|e| PlatformError::Credentials(e.to_string()))
    }
}
