//! `login` and `logout` commands.

use crate::auth::SessionClient;
use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn login(client: &SessionClient, username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_password().await?,
    };

    client
        .login(username, &password)
        .await
        .with_context(|| format!("Login as {} failed", username))?;
    println!("Logged in as {}", username);
    Ok(())
}

pub fn logout(client: &SessionClient) {
    if !client.is_logged_in() {
        println!("Not logged in");
        return;
    }
    client.logout();
    println!("Logged out");
}

async fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("No password given");
    }
    Ok(password.to_string())
}
