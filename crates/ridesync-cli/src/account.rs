//! Sign-in and sign-out.

use std::io::Write;

use ridesync_client::api::LoginRequest;
use ridesync_common::{Result, RideSyncError, Role};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::app::{api_error, store_error, Services, ROLE_KEY};

pub async fn login(services: &Services, email: String, role: Role) -> Result<()> {
    let password = read_password().await?;
    if password.is_empty() {
        return Err(RideSyncError::Auth("empty password".into()));
    }

    let request = LoginRequest {
        email,
        password,
        role,
    };
    services.api.login(&request).await.map_err(api_error)?;
    services.remember(ROLE_KEY, Some(role.as_str()));
    info!(email = %request.email, role = role.as_str(), "Signed in");
    println!("Signed in as {} ({})", request.email, role.as_str());
    Ok(())
}

pub async fn logout(services: &Services) -> Result<()> {
    if let Err(e) = services.api.logout().await {
        warn!(error = %e, "Server sign-out failed; local session cleared anyway");
    }
    services.app_state.clear().map_err(store_error)?;
    println!("Signed out");
    Ok(())
}

async fn read_password() -> Result<String> {
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
