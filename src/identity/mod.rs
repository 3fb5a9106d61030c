use crate::clock::Clock;
use crate::config::constants::{PREAUTH_TOKEN_TTL_MS, STARTUP_EVENT_ID};
use crate::error::{Conflict, CoreError, CoreResult};
use crate::storage::persistent::{get_conn, DbPool};
use crate::storage::{roulette as roulette_store, users as user_store};
use crate::types::roulette::{NewPreauthToken, PreauthToken, RouletteType};
use crate::types::user::{Actor, User};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Deterministic single-game identity for unauthenticated players: the
/// lowercase hex SHA-256 of `"<session_id>:<ip>"`. Stable across requests
/// without any server state; not a security boundary.
pub fn derive_token(session_id: &str, ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{session_id}:{ip}").as_bytes());
    hex_string(&hasher.finalize())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct IdentityBinder {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl IdentityBinder {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Derives the token for (session, ip) and loads or creates its row.
    /// Creation requires the config to exist and be active. Concurrent
    /// first-touches converge through the unique constraint on `token`: the
    /// loser of the insert race re-reads the winner's row.
    pub async fn resolve_or_create(
        &self,
        config_id: i32,
        session_id: &str,
        ip: &str,
    ) -> CoreResult<PreauthToken> {
        let token = derive_token(session_id, ip);
        let mut conn = get_conn(&self.pool).await?;

        if let Some(existing) = roulette_store::preauth_by_token(&mut conn, &token).await? {
            return Ok(existing);
        }

        let config = roulette_store::config_by_id(&mut conn, config_id)
            .await?
            .filter(|config| config.is_active)
            .ok_or_else(|| CoreError::not_found("roulette config not found or inactive"))?;

        let now = self.clock.now_ms();
        let new_token = NewPreauthToken {
            token: token.clone(),
            user_id: None,
            roulette_config_id: config.id,
            is_used: false,
            expires_at: now + PREAUTH_TOKEN_TTL_MS,
            created_at: now,
        };

        if let Some(created) =
            roulette_store::insert_preauth_if_absent(&mut conn, &new_token).await?
        {
            return Ok(created);
        }
        roulette_store::preauth_by_token(&mut conn, &token)
            .await?
            .ok_or_else(|| CoreError::unavailable("preauth token vanished after insert race"))
    }

    /// Resolve-or-create against the startup roulette config.
    pub async fn resolve_or_create_startup(
        &self,
        session_id: &str,
        ip: &str,
    ) -> CoreResult<PreauthToken> {
        let mut conn = get_conn(&self.pool).await?;
        let config = roulette_store::active_config_by_type(
            &mut conn,
            RouletteType::OnStart,
            STARTUP_EVENT_ID,
        )
        .await?
        .ok_or_else(|| CoreError::not_found("roulette config not found or inactive"))?;
        drop(conn);
        self.resolve_or_create(config.id, session_id, ip).await
    }

    /// The public get-preauth-token operation: returns the (possibly fresh)
    /// token string for this session+ip.
    pub async fn get_preauth_token(&self, session_id: &str, ip: &str) -> CoreResult<String> {
        Ok(self.resolve_or_create_startup(session_id, ip).await?.token)
    }

    /// Binds the token to a user after OAuth. Idempotent for the same user;
    /// a token already owned by a different user is a conflict.
    pub async fn link_to_user(&self, token: &str, user_id: Uuid) -> CoreResult<()> {
        let mut conn = get_conn(&self.pool).await?;
        let updated = roulette_store::bind_preauth_user(&mut conn, token, user_id).await?;
        if updated > 0 {
            return Ok(());
        }
        match roulette_store::preauth_by_token(&mut conn, token).await? {
            Some(_) => Err(Conflict::AlreadyLinked.into()),
            None => Err(CoreError::not_found("preauth token not found")),
        }
    }

    /// Returns the linked user for a token the caller proves ownership of by
    /// presenting the same session+ip it was derived from. `Ok(None)` means
    /// the token exists but was never linked.
    pub async fn resolve_user_id_by_preauth(
        &self,
        token: &str,
        session_id: &str,
        ip: &str,
    ) -> CoreResult<Option<Uuid>> {
        if derive_token(session_id, ip) != token {
            return Err(CoreError::Forbidden(
                "preauth token does not match session and ip".into(),
            ));
        }
        let mut conn = get_conn(&self.pool).await?;
        let row = roulette_store::preauth_by_token(&mut conn, token)
            .await?
            .ok_or_else(|| CoreError::not_found("preauth token not found"))?;
        Ok(row.user_id)
    }

    /// Implicit user for the unauthenticated take-prize path.
    pub async fn create_or_update_user_by_session(
        &self,
        session_id: &str,
        ip: &str,
    ) -> CoreResult<User> {
        let mut conn = get_conn(&self.pool).await?;
        user_store::upsert_by_session(&mut conn, session_id, ip, self.clock.now_ms()).await
    }

    pub async fn user_by_session(&self, session_id: &str) -> CoreResult<Option<User>> {
        let mut conn = get_conn(&self.pool).await?;
        user_store::by_session_id(&mut conn, session_id).await
    }

    pub fn actor_for(token: &PreauthToken) -> Actor {
        match token.user_id {
            Some(user_id) => Actor::Linked(user_id),
            None => Actor::Anonymous(token.token.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_deterministic() {
        let a = derive_token("S1", "1.2.3.4");
        let b = derive_token("S1", "1.2.3.4");
        assert_eq!(a, b);
    }

    #[test]
    fn token_is_64_hex_chars() {
        let token = derive_token("S1", "1.2.3.4");
        assert_eq!(token.len(), 64);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(token, token.to_lowercase());
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(derive_token("S1", "1.2.3.4"), derive_token("S2", "1.2.3.4"));
        assert_ne!(derive_token("S1", "1.2.3.4"), derive_token("S1", "1.2.3.5"));
        // The separator keeps ("ab","c") distinct from ("a","bc").
        assert_ne!(derive_token("ab", "c"), derive_token("a", "bc"));
    }

    #[test]
    fn known_vector_matches_sha256_of_joined_input() {
        // sha256("S1:1.2.3.4")
        assert_eq!(
            derive_token("S1", "1.2.3.4"),
            "c00f0974a4cf69d5c9b32f614630244c30af42f40385fa4f252604225be5ccca"
        );
    }

    #[test]
    fn actor_reconstructs_from_nullable_link() {
        let mut row = PreauthToken {
            id: 1,
            token: "t".repeat(64),
            user_id: None,
            roulette_config_id: 1,
            is_used: false,
            expires_at: i64::MAX,
            created_at: 0,
        };
        assert!(matches!(
            IdentityBinder::actor_for(&row),
            Actor::Anonymous(_)
        ));
        let id = Uuid::new_v4();
        row.user_id = Some(id);
        assert_eq!(IdentityBinder::actor_for(&row), Actor::Linked(id));
    }
}
