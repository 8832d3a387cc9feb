//! User record (as far as loans care) and token claims

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Key prefix of user records
pub const USER_PREFIX: &str = "user_";

/// A stored user. The loan engine only maintains `loan_ids`; credentials
/// and profile data written by the account subsystem live in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub username: String,
    /// Ids of this user's pending and approved loans, unordered
    #[serde(
        alias = "LoanIDArray",
        default,
        deserialize_with = "super::null_as_empty"
    )]
    pub loan_ids: Vec<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            loan_ids: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn holds(&self, loan_id: i64) -> bool {
        self.loan_ids.contains(&loan_id)
    }

    /// Remove the first occurrence of `loan_id`; order of the rest may change
    pub fn drop_loan(&mut self, loan_id: i64) -> bool {
        match self.loan_ids.iter().position(|&id| id == loan_id) {
            Some(pos) => {
                self.loan_ids.swap_remove(pos);
                true
            }
            None => false,
        }
    }
}

pub fn user_key(username: &str) -> String {
    format!("{}{}", USER_PREFIX, username.to_lowercase())
}

/// JWT claims issued by the account subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub username: String,
    #[serde(default)]
    pub admin: bool,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse and verify a JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.admin {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator rights required".to_string()))
        }
    }
}
