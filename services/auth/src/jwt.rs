//! JWT issuance and verification
//!
//! Access and refresh tokens are HS256-signed with *different* secrets, so a
//! leaked refresh-signing key cannot forge access tokens and vice versa.
//! Verification tries the current secret first and then each retired secret
//! in order, which lets secrets rotate without invalidating live sessions.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::models::{Role, User};

/// Default access token validity: 1 hour
const DEFAULT_ACCESS_EXPIRY_SECS: i64 = 3600;
/// Default refresh token validity: 7 days
const DEFAULT_REFRESH_EXPIRY_SECS: i64 = 604_800;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret signing access tokens
    pub access_secret: String,
    /// Secret signing refresh tokens; must differ from the access secret
    pub refresh_secret: String,
    /// Retired secrets still accepted for verification, newest first
    pub legacy_secrets: Vec<String>,
    /// Access token expiration time in seconds (default: 1 hour)
    pub access_token_expiry: i64,
    /// Refresh token expiration time in seconds (default: 7 days)
    pub refresh_token_expiry: i64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_ACCESS_SECRET`: Secret for signing access tokens (required)
    /// - `JWT_REFRESH_SECRET`: Secret for signing refresh tokens (required)
    /// - `JWT_LEGACY_SECRETS`: Comma-separated retired secrets (optional)
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 3600)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 604800)
    pub fn from_env() -> Result<Self> {
        let access_secret = std::env::var("JWT_ACCESS_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_ACCESS_SECRET environment variable not set"))?;
        let refresh_secret = std::env::var("JWT_REFRESH_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_REFRESH_SECRET environment variable not set"))?;

        if access_secret.is_empty() || refresh_secret.is_empty() {
            anyhow::bail!("JWT secrets must not be empty");
        }

        let legacy_secrets = std::env::var("JWT_LEGACY_SECRETS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .unwrap_or_else(|_| DEFAULT_ACCESS_EXPIRY_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_ACCESS_EXPIRY_SECS);

        let refresh_token_expiry = std::env::var("JWT_REFRESH_TOKEN_EXPIRY")
            .unwrap_or_else(|_| DEFAULT_REFRESH_EXPIRY_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_REFRESH_EXPIRY_SECS);

        Ok(JwtConfig {
            access_secret,
            refresh_secret,
            legacy_secrets,
            access_token_expiry,
            refresh_token_expiry,
        })
    }
}

/// Claims embedded in every access token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    /// Subject: the user's id. Older issuers wrote it as `userId`; both
    /// spellings are accepted on decode.
    #[serde(default, alias = "userId")]
    pub sub: Option<Uuid>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Role name
    #[serde(default)]
    pub role: Option<String>,
    /// Role id
    #[serde(default)]
    pub role_id: Option<Uuid>,
    /// Permission-name snapshot at issue time
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Claims embedded in every refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject: the user's id
    #[serde(default, alias = "userId")]
    pub sub: Option<Uuid>,
    /// The user's role id at issue time
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly minted refresh token, ready for durable storage
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        JwtService { config }
    }

    /// Generate an access token for a user.
    ///
    /// If an explicit permission list is supplied it is embedded verbatim;
    /// otherwise the list is derived from the role's permission set, which
    /// may mix populated permissions and bare ids.
    pub fn issue_access_token(
        &self,
        user: &User,
        role: &Role,
        permissions: Option<Vec<String>>,
    ) -> Result<String> {
        let now = Utc::now();
        let permissions = permissions.unwrap_or_else(|| {
            role.permissions
                .iter()
                .map(|p| p.name().to_string())
                .collect()
        });

        let claims = AccessClaims {
            sub: Some(user.id),
            username: Some(user.username.clone()),
            name: user.name.clone(),
            email: Some(user.email.clone()),
            role: Some(role.name.clone()),
            role_id: Some(role.id),
            permissions,
            admin: user.admin,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.config.access_token_expiry)).timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.access_secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Generate a refresh token for a user.
    ///
    /// The returned record carries the absolute expiry and is ready for
    /// durable storage; nothing is persisted here.
    pub fn issue_refresh_token(&self, user: &User) -> Result<IssuedRefreshToken> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.refresh_token_expiry);

        let claims = RefreshClaims {
            sub: Some(user.id),
            role: user.role_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.refresh_secret.as_bytes()),
        )?;

        Ok(IssuedRefreshToken { token, expires_at })
    }

    /// Verify an access token against the current and retired secrets
    pub fn verify_access(&self, token: &str) -> jsonwebtoken::errors::Result<AccessClaims> {
        verify_with_rotation(
            token,
            &self.candidates(&self.config.access_secret),
            &Validation::default(),
        )
    }

    /// Verify a refresh token against the current and retired secrets.
    ///
    /// Expiry is deliberately not validated here: the durable record's
    /// `expires_at` is checked by the caller, which also deletes the row
    /// on the rejecting call. Validating `exp` at decode time would make
    /// that cleanup unreachable.
    pub fn verify_refresh(&self, token: &str) -> jsonwebtoken::errors::Result<RefreshClaims> {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        verify_with_rotation(
            token,
            &self.candidates(&self.config.refresh_secret),
            &validation,
        )
    }

    /// Ordered candidate secrets: the primary first, then retired secrets,
    /// with duplicates of the primary dropped.
    fn candidates<'a>(&'a self, primary: &'a str) -> Vec<&'a str> {
        let mut candidates = vec![primary];
        for legacy in &self.config.legacy_secrets {
            if legacy != primary {
                candidates.push(legacy.as_str());
            }
        }
        candidates
    }

    pub fn access_token_expiry(&self) -> i64 {
        self.config.access_token_expiry
    }

    pub fn refresh_token_expiry(&self) -> i64 {
        self.config.refresh_token_expiry
    }
}

/// Try each candidate secret in order; return the first success, or the
/// *primary* secret's error when every candidate fails.
fn verify_with_rotation<T: DeserializeOwned>(
    token: &str,
    candidates: &[&str],
    validation: &Validation,
) -> jsonwebtoken::errors::Result<T> {
    let mut primary_error = None;

    for secret in candidates {
        match decode::<T>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            validation,
        ) {
            Ok(data) => return Ok(data.claims),
            Err(e) => {
                if primary_error.is_none() {
                    primary_error = Some(e);
                }
            }
        }
    }

    Err(primary_error.expect("candidate secret list is never empty"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Permission, PermissionRef};
    use jsonwebtoken::errors::ErrorKind;

    fn test_config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-secret-alpha".to_string(),
            refresh_secret: "refresh-secret-alpha".to_string(),
            legacy_secrets: vec![],
            access_token_expiry: 3600,
            refresh_token_expiry: 604_800,
        }
    }

    fn test_user(role_id: Uuid) -> User {
        User {
            id: Uuid::new_v4(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            name: Some("Ada Lovelace".to_string()),
            password_hash: "unused".to_string(),
            admin: false,
            role_id,
            deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_role(name: &str, permissions: Vec<PermissionRef>) -> Role {
        Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            permissions,
            deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = JwtService::new(test_config());
        let role = test_role(
            "user",
            vec![PermissionRef::Resolved(Permission {
                id: Uuid::new_v4(),
                name: "manage_notes".to_string(),
                description: None,
                deleted: false,
            })],
        );
        let user = test_user(role.id);

        let token = service
            .issue_access_token(&user, &role, None)
            .expect("issuance succeeds");
        let claims = service.verify_access(&token).expect("verification succeeds");

        assert_eq!(claims.sub, Some(user.id));
        assert_eq!(claims.role.as_deref(), Some("user"));
        assert_eq!(claims.role_id, Some(role.id));
        assert_eq!(claims.permissions, vec!["manage_notes".to_string()]);
        assert!(!claims.admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_explicit_permission_list_wins() {
        let service = JwtService::new(test_config());
        let role = test_role("user", vec![PermissionRef::Id("ignored".to_string())]);
        let user = test_user(role.id);

        let token = service
            .issue_access_token(&user, &role, Some(vec!["manage_users".to_string()]))
            .expect("issuance succeeds");
        let claims = service.verify_access(&token).expect("verification succeeds");

        assert_eq!(claims.permissions, vec!["manage_users".to_string()]);
    }

    #[test]
    fn test_bare_id_permissions_pass_through() {
        let service = JwtService::new(test_config());
        let role = test_role(
            "legacy",
            vec![
                PermissionRef::Id("607f1f77bcf86cd799439011".to_string()),
                PermissionRef::Resolved(Permission {
                    id: Uuid::new_v4(),
                    name: "manage_tags".to_string(),
                    description: None,
                    deleted: false,
                }),
            ],
        );
        let user = test_user(role.id);

        let token = service
            .issue_access_token(&user, &role, None)
            .expect("mixed-shape permission lists must not raise");
        let claims = service.verify_access(&token).expect("verification succeeds");

        assert_eq!(
            claims.permissions,
            vec![
                "607f1f77bcf86cd799439011".to_string(),
                "manage_tags".to_string()
            ]
        );
    }

    #[test]
    fn test_refresh_token_carries_role_id() {
        let service = JwtService::new(test_config());
        let role_id = Uuid::new_v4();
        let user = test_user(role_id);

        let issued = service.issue_refresh_token(&user).expect("issuance succeeds");
        let claims = service
            .verify_refresh(&issued.token)
            .expect("verification succeeds");

        assert_eq!(claims.sub, Some(user.id));
        assert_eq!(claims.role, role_id.to_string());
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn test_access_and_refresh_secrets_are_not_interchangeable() {
        let service = JwtService::new(test_config());
        let role = test_role("user", vec![]);
        let user = test_user(role.id);

        let access = service
            .issue_access_token(&user, &role, None)
            .expect("issuance succeeds");
        let refresh = service.issue_refresh_token(&user).expect("issuance succeeds");

        assert!(service.verify_refresh(&access).is_err());
        assert!(service.verify_access(&refresh.token).is_err());
    }

    #[test]
    fn test_legacy_secret_still_verifies() {
        let old = JwtService::new(JwtConfig {
            access_secret: "retired-secret".to_string(),
            ..test_config()
        });
        let role = test_role("user", vec![]);
        let user = test_user(role.id);
        let token = old
            .issue_access_token(&user, &role, None)
            .expect("issuance succeeds");

        // Rotated deployment: new primary, old secret retired but accepted.
        let rotated = JwtService::new(JwtConfig {
            access_secret: "fresh-secret".to_string(),
            legacy_secrets: vec!["retired-secret".to_string()],
            ..test_config()
        });

        let claims = rotated
            .verify_access(&token)
            .expect("legacy-signed token must verify");
        assert_eq!(claims.sub, Some(user.id));
    }

    #[test]
    fn test_rotation_failure_reports_primary_error() {
        let expired_signer = JwtService::new(JwtConfig {
            access_secret: "retired-secret".to_string(),
            access_token_expiry: -7200, // already expired, past leeway
            ..test_config()
        });
        let role = test_role("user", vec![]);
        let user = test_user(role.id);
        let token = expired_signer
            .issue_access_token(&user, &role, None)
            .expect("issuance succeeds");

        let rotated = JwtService::new(JwtConfig {
            access_secret: "fresh-secret".to_string(),
            legacy_secrets: vec!["retired-secret".to_string()],
            ..test_config()
        });

        // Primary fails with InvalidSignature; the legacy candidate fails
        // with ExpiredSignature. The primary's error must win.
        let err = rotated.verify_access(&token).expect_err("must fail");
        assert_eq!(err.kind(), &ErrorKind::InvalidSignature);
    }

    #[test]
    fn test_expired_refresh_token_still_decodes() {
        // Expiry is enforced against the stored record, not at decode
        // time; a token hours past its exp must still yield its claims so
        // the durable row can be found and deleted on rejection.
        let service = JwtService::new(JwtConfig {
            refresh_token_expiry: -7200,
            ..test_config()
        });
        let user = test_user(Uuid::new_v4());

        let issued = service.issue_refresh_token(&user).expect("issuance succeeds");
        assert!(issued.expires_at < Utc::now());

        let claims = service
            .verify_refresh(&issued.token)
            .expect("expired refresh tokens decode");
        assert_eq!(claims.sub, Some(user.id));
        assert!(claims.exp < Utc::now().timestamp());
    }

    #[test]
    fn test_expired_access_token_is_rejected() {
        let service = JwtService::new(JwtConfig {
            access_token_expiry: -7200,
            ..test_config()
        });
        let role = test_role("user", vec![]);
        let user = test_user(role.id);

        let token = service
            .issue_access_token(&user, &role, None)
            .expect("issuance succeeds");
        let err = service.verify_access(&token).expect_err("must fail");
        assert_eq!(err.kind(), &ErrorKind::ExpiredSignature);
    }

    #[test]
    #[serial_test::serial]
    fn test_config_from_env_parses_rotation_list() {
        unsafe {
            std::env::set_var("JWT_ACCESS_SECRET", "env-access");
            std::env::set_var("JWT_REFRESH_SECRET", "env-refresh");
            std::env::set_var("JWT_LEGACY_SECRETS", "old-1, old-2, ,");
        }

        let config = JwtConfig::from_env().expect("config loads");
        assert_eq!(config.access_secret, "env-access");
        assert_eq!(config.legacy_secrets, vec!["old-1", "old-2"]);
        assert_eq!(config.access_token_expiry, DEFAULT_ACCESS_EXPIRY_SECS);
        assert_eq!(config.refresh_token_expiry, DEFAULT_REFRESH_EXPIRY_SECS);

        unsafe {
            std::env::remove_var("JWT_ACCESS_SECRET");
            std::env::remove_var("JWT_REFRESH_SECRET");
            std::env::remove_var("JWT_LEGACY_SECRETS");
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_config_from_env_requires_both_secrets() {
        unsafe {
            std::env::remove_var("JWT_ACCESS_SECRET");
            std::env::remove_var("JWT_REFRESH_SECRET");
        }
        assert!(JwtConfig::from_env().is_err());
    }

    #[test]
    fn test_subject_accepted_under_either_field_name() {
        let config = test_config();
        let user_id = Uuid::new_v4();
        let now = Utc::now().timestamp();

        // Hand-rolled payload using the older `userId` spelling.
        let payload = serde_json::json!({
            "userId": user_id,
            "iat": now,
            "exp": now + 3600,
        });
        let token = encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(config.access_secret.as_bytes()),
        )
        .expect("encoding succeeds");

        let claims = JwtService::new(config)
            .verify_access(&token)
            .expect("verification succeeds");
        assert_eq!(claims.sub, Some(user_id));
    }
}
