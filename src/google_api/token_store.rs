//! Google token persistence in the `provider_tokens` table.

use super::{GoogleApiError, GoogleToken, PROVIDER};
use crate::db::profiles::DbProviderToken;
use crate::db::Db;

/// Load a user's Google token.
pub fn load_token(db: &Db, user_id: &str) -> Result<GoogleToken, GoogleApiError> {
    let row = db
        .get_provider_token(user_id, PROVIDER)?
        .ok_or_else(|| GoogleApiError::TokenNotFound(user_id.to_string()))?;
    Ok(GoogleToken {
        access_token: row.access_token,
        refresh_token: row.refresh_token,
        token_uri: row.token_uri,
        client_id: row.client_id,
        client_secret: row.client_secret,
        scopes: row.scopes,
        expiry: row.expiry,
        account: row.account,
    })
}

/// Persist a user's Google token. A missing refresh token keeps the stored one.
pub fn save_token(db: &Db, user_id: &str, token: &GoogleToken) -> Result<(), GoogleApiError> {
    db.save_provider_token(&DbProviderToken {
        user_id: user_id.to_string(),
        provider: PROVIDER.to_string(),
        access_token: token.access_token.clone(),
        refresh_token: token.refresh_token.clone(),
        token_uri: token.token_uri.clone(),
        client_id: token.client_id.clone(),
        client_secret: token.client_secret.clone(),
        scopes: token.scopes.clone(),
        expiry: token.expiry.clone(),
        account: token.account.clone(),
        updated_at: crate::db::now_rfc3339(),
    })?;
    Ok(())
}

/// Mailbox address the token was issued for, if known.
pub fn peek_account_email(db: &Db, user_id: &str) -> Option<String> {
    load_token(db, user_id)
        .ok()
        .and_then(|t| t.account)
        .filter(|value| !value.trim().is_empty())
}
