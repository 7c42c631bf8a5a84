use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::gateway::{Gateway, NormalizedResponse, OutboundRequest};
use crate::store::AccessToken;

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const GET_ME_PATH: &str = "/auth/get-me";
const UPDATE_ME_PATH: &str = "/user/me";

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// Editable profile fields
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub city: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub city: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: AccessToken,
    #[serde(default)]
    pub user: UserProfile,
}

/// Authentication endpoints. Login is one of the two writers of the
/// credential store; the other is a successful token refresh.
///
/// The signed-in user's profile is cached next to the token and dropped on
/// logout.
#[derive(Debug, Clone)]
pub struct AuthApi {
    gateway: Gateway,
}

impl AuthApi {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Log in and store the issued access token.
    /// The server also sets the refresh cookie on this response.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, GatewayError> {
        let body = to_body(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let response = self
            .gateway
            .send(OutboundRequest::post(LOGIN_PATH).json(body))
            .await?;

        let login: LoginResponse = payload(&response)?;
        if login.access_token.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "login response carried an empty access token".to_string(),
            ));
        }
        self.gateway.set_token(&login.access_token);
        self.cache_user(&login.user);
        info!(user = %login.user.email, "Logged in");
        Ok(login)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Value, GatewayError> {
        let response = self
            .gateway
            .send(OutboundRequest::post(REGISTER_PATH).json(to_body(request)?))
            .await?;
        Ok(response
            .data()
            .cloned()
            .unwrap_or_else(|| response.clone().into_value()))
    }

    /// Profile of the signed-in user
    pub async fn get_me(&self) -> Result<UserProfile, GatewayError> {
        let response = self.gateway.send(OutboundRequest::get(GET_ME_PATH)).await?;
        payload(&response)
    }

    /// Update the signed-in user's profile and refresh the cached copy
    pub async fn update_me(&self, request: &UpdateProfileRequest) -> Result<UserProfile, GatewayError> {
        let response = self
            .gateway
            .send(OutboundRequest::put(UPDATE_ME_PATH).json(to_body(request)?))
            .await?;
        let profile: UserProfile = payload(&response)?;
        self.cache_user(&profile);
        Ok(profile)
    }

    /// Profile cached at the last login or update, without a network call
    pub fn cached_user(&self) -> Option<UserProfile> {
        let raw = self.gateway.store().user_data()?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable cached profile");
                None
            }
        }
    }

    /// Explicit sign-out: forget the access token and the cached profile
    pub fn logout(&self) {
        self.gateway.clear_token();
        self.gateway.store().clear_user_data();
        info!("Logged out");
    }

    fn cache_user(&self, profile: &UserProfile) {
        match serde_json::to_string(profile) {
            Ok(raw) => self.gateway.store().set_user_data(&raw),
            Err(e) => warn!(error = %e, "Failed to encode profile for caching"),
        }
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}

/// Decode the envelope's `data`, or the envelope itself for bare payloads
fn payload<T: serde::de::DeserializeOwned>(response: &NormalizedResponse) -> Result<T, GatewayError> {
    match response.data() {
        Some(data) if data.is_object() => response.data_as(),
        _ => response.json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    use crate::gateway::normalize::normalize;

    #[test]
    fn test_parse_login_envelope() {
        let json = r#"{"message": "Success", "status": 200, "data": {"accessToken": "T1", "user": {"_id": "u1", "email": "a@b.c", "fullName": "Ann Bee", "createdAt": 1700000000}}}"#;
        let response = normalize(StatusCode::OK, json).unwrap();

        let login: LoginResponse = payload(&response).unwrap();
        assert_eq!(login.access_token, AccessToken::new("T1"));
        assert_eq!(login.user.id, "u1");
        assert_eq!(login.user.full_name, "Ann Bee");
    }

    #[test]
    fn test_parse_bare_profile() {
        let json = r#"{"_id": "u2", "email": "x@y.z", "fullName": "Xavier"}"#;
        let response = normalize(StatusCode::OK, json).unwrap();

        let profile: UserProfile = payload(&response).unwrap();
        assert_eq!(profile.id, "u2");
        assert_eq!(profile.created_at, 0);
    }

    #[test]
    fn test_register_request_is_camel_case() {
        let body = to_body(&RegisterRequest {
            email: "a@b.c".to_string(),
            password: "pw".to_string(),
            full_name: "Ann".to_string(),
        })
        .unwrap();
        assert_eq!(body["fullName"], "Ann");
    }

    #[test]
    fn test_update_request_is_camel_case() {
        let body = to_body(&UpdateProfileRequest {
            first_name: "Ann".to_string(),
            last_name: "Bee".to_string(),
            ..UpdateProfileRequest::default()
        })
        .unwrap();
        assert_eq!(body["firstName"], "Ann");
        assert_eq!(body["lastName"], "Bee");
        assert_eq!(body["city"], "");
    }
}
