//! JWT令牌校验实现
//!
//! 凭证校验协作者的具体实现：解码HS256令牌，再到用户表确认身份仍然
//! 存在。令牌本身有效但用户已被删除时按"用户不存在"处理。

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use config::JwtConfig;
use domain::{CollaboratorError, TokenValidator, User, UserId};

#[derive(Debug, Deserialize)]
struct Claims {
    user_id: Uuid,
    #[allow(dead_code)]
    exp: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct DbUser {
    id: Uuid,
    username: String,
}

/// 基于 HS256 JWT 与用户表的令牌校验器
pub struct JwtTokenValidator {
    decoding_key: DecodingKey,
    pool: PgPool,
}

impl JwtTokenValidator {
    pub fn new(jwt: &JwtConfig, pool: PgPool) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(jwt.secret.as_ref()),
            pool,
        }
    }
}

#[async_trait]
impl TokenValidator for JwtTokenValidator {
    async fn validate(&self, token: &str) -> Result<User, CollaboratorError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|err| CollaboratorError::InvalidToken(err.to_string()))?
            .claims;

        let row = sqlx::query_as::<_, DbUser>("SELECT id, username FROM users WHERE id = $1")
            .bind(claims.user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| CollaboratorError::storage(err.to_string()))?;

        let user = row.ok_or(CollaboratorError::UnknownUser)?;
        debug!(user = %user.id, "token validated");
        Ok(User::new(UserId(user.id), user.username))
    }
}
