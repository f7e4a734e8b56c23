use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::*;

/// OAuth credentials persisted per user and provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbProviderToken {
    pub user_id: String,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub expiry: Option<String>,
    pub account: Option<String>,
    pub updated_at: String,
}

impl Db {
    // =========================================================================
    // Profiles
    // =========================================================================

    pub fn upsert_profile(
        &self,
        user_id: &str,
        email: &str,
        full_name: Option<&str>,
    ) -> Result<DbProfile, DbError> {
        let now = now_rfc3339();
        self.conn.execute(
            "INSERT INTO profiles (user_id, email, full_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                email = excluded.email,
                full_name = COALESCE(excluded.full_name, profiles.full_name),
                updated_at = excluded.updated_at",
            params![user_id, email.trim().to_lowercase(), full_name, now],
        )?;
        self.get_profile(user_id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<DbProfile>, DbError> {
        let profile = self
            .conn
            .query_row(
                "SELECT user_id, email, full_name, created_at, updated_at
                 FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(DbProfile {
                        user_id: row.get(0)?,
                        email: row.get(1)?,
                        full_name: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    /// The user's own mailbox address, lowercased. Used to drop the user
    /// from participant lists and to tell internal attendees from external.
    pub fn get_user_email(&self, user_id: &str) -> Result<Option<String>, DbError> {
        Ok(self.get_profile(user_id)?.map(|p| p.email.to_lowercase()))
    }

    // =========================================================================
    // Provider tokens
    // =========================================================================

    pub fn save_provider_token(&self, token: &DbProviderToken) -> Result<(), DbError> {
        let scopes = serde_json::to_string(&token.scopes).unwrap_or_else(|_| "[]".to_string());
        self.conn.execute(
            "INSERT INTO provider_tokens (
                user_id, provider, access_token, refresh_token, token_uri, client_id,
                client_secret, scopes, expiry, account, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(user_id, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, provider_tokens.refresh_token),
                token_uri = excluded.token_uri,
                client_id = excluded.client_id,
                client_secret = COALESCE(excluded.client_secret, provider_tokens.client_secret),
                scopes = excluded.scopes,
                expiry = excluded.expiry,
                account = COALESCE(excluded.account, provider_tokens.account),
                updated_at = excluded.updated_at",
            params![
                token.user_id,
                token.provider,
                token.access_token,
                token.refresh_token,
                token.token_uri,
                token.client_id,
                token.client_secret,
                scopes,
                token.expiry,
                token.account,
                token.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_provider_token(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<DbProviderToken>, DbError> {
        let token = self
            .conn
            .query_row(
                "SELECT user_id, provider, access_token, refresh_token, token_uri, client_id,
                        client_secret, scopes, expiry, account, updated_at
                 FROM provider_tokens WHERE user_id = ?1 AND provider = ?2",
                params![user_id, provider],
                |row| {
                    let scopes: String = row.get(7)?;
                    Ok(DbProviderToken {
                        user_id: row.get(0)?,
                        provider: row.get(1)?,
                        access_token: row.get(2)?,
                        refresh_token: row.get(3)?,
                        token_uri: row.get(4)?,
                        client_id: row.get(5)?,
                        client_secret: row.get(6)?,
                        scopes: serde_json::from_str(&scopes).unwrap_or_default(),
                        expiry: row.get(8)?,
                        account: row.get(9)?,
                        updated_at: row.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(token)
    }

    /// Users that have connected the given provider.
    pub fn list_users_with_token(&self, provider: &str) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id FROM provider_tokens WHERE provider = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map(params![provider], |row| row.get(0))?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};

    fn sample_token() -> DbProviderToken {
        DbProviderToken {
            user_id: TEST_USER.to_string(),
            provider: "google".to_string(),
            access_token: "ya29.first".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client".to_string(),
            client_secret: None,
            scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
            expiry: Some("2026-01-01T00:00:00Z".to_string()),
            account: Some("me@ourco.com".to_string()),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_profile_upsert_keeps_name_when_omitted() {
        let db = test_db();
        db.upsert_profile(TEST_USER, "Me@OurCo.com", None).unwrap();
        let profile = db.get_profile(TEST_USER).unwrap().unwrap();
        assert_eq!(profile.email, "me@ourco.com");
        assert_eq!(profile.full_name.as_deref(), Some("Casey Manager"));
    }

    #[test]
    fn test_token_refresh_keeps_refresh_token() {
        let db = test_db();
        db.save_provider_token(&sample_token()).unwrap();

        let mut refreshed = sample_token();
        refreshed.access_token = "ya29.second".to_string();
        refreshed.refresh_token = None;
        db.save_provider_token(&refreshed).unwrap();

        let stored = db.get_provider_token(TEST_USER, "google").unwrap().unwrap();
        assert_eq!(stored.access_token, "ya29.second");
        assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(stored.scopes.len(), 1);
        assert_eq!(db.list_users_with_token("google").unwrap(), vec![TEST_USER]);
    }
}
