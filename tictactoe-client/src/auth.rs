//! Login and registration.
//!
//! Input is validated locally first; a successful login hands back the open
//! transport, which the app then moves into its network worker.

use tracing::info;

use tictactoe::network::protocol::{Credentials, Registration, Request, User};

use crate::config::ClientConfig;
use crate::error::{ClientError, ValidationError};
use crate::network::decode;
use crate::network::transport::TransportClient;

/// Validate login input.
pub fn credentials(username: &str, password: &str) -> Result<Credentials, ValidationError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ValidationError::EmptyField("Username"));
    }
    if password.is_empty() {
        return Err(ValidationError::EmptyField("Password"));
    }
    Ok(Credentials { username: username.to_string(), password: password.to_string() })
}

/// Validate registration input, including the password confirmation.
pub fn registration(
    username: &str,
    display_name: &str,
    password: &str,
    confirm_password: &str,
) -> Result<Registration, ValidationError> {
    let username = username.trim();
    let display_name = display_name.trim();
    if username.is_empty() {
        return Err(ValidationError::EmptyField("Username"));
    }
    if display_name.is_empty() {
        return Err(ValidationError::EmptyField("Display name"));
    }
    if password.is_empty() {
        return Err(ValidationError::EmptyField("Password"));
    }
    if password != confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(Registration {
        username: username.to_string(),
        display_name: display_name.to_string(),
        password: password.to_string(),
    })
}

/// Connect and log in. The connection is closed again if login fails.
pub async fn login(
    config: &ClientConfig,
    credentials: &Credentials,
) -> Result<(TransportClient, User), ClientError> {
    let mut transport =
        TransportClient::connect(&config.server_url, config.connect_timeout, config.request_timeout).await?;

    match decode::user(transport.send_request(Request::login(credentials)).await) {
        Ok(user) => {
            info!("Logged in as {}", user.username);
            Ok((transport, user))
        }
        Err(e) => {
            transport.close().await;
            Err(e)
        }
    }
}

/// Create an account on a short-lived connection.
pub async fn register(config: &ClientConfig, registration: &Registration) -> Result<User, ClientError> {
    let mut transport =
        TransportClient::connect(&config.server_url, config.connect_timeout, config.request_timeout).await?;
    let result = decode::user(transport.send_request(Request::register(registration)).await);
    transport.close().await;

    let user = result?;
    info!("Registered {}", user.username);
    Ok(user)
}
