use crate::config::ServerConfig;

/// Try to run a CLI command and capture stdout as a token
fn try_cli_token(command: &str) -> Option<String> {
    let output = std::process::Command::new("sh")
        .args(["-c", command])
        .output()
        .ok()?;

    if output.status.success() {
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !token.is_empty() {
            return Some(token);
        }
    }
    None
}

/// Stored token path: ~/.config/snag/tokens/{server_name}
fn server_token_path(server_name: &str) -> Option<std::path::PathBuf> {
    let config_dir = dirs::config_dir()?;
    Some(config_dir.join("snag").join("tokens").join(server_name))
}

fn load_stored_token(server_name: &str) -> Option<String> {
    let path = server_token_path(server_name)?;
    let token = std::fs::read_to_string(path).ok()?;
    non_empty(token)
}

fn save_server_token(server_name: &str, token: &str) -> std::io::Result<()> {
    if let Some(path) = server_token_path(server_name) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, token)?;
    }
    Ok(())
}

fn non_empty(token: String) -> Option<String> {
    let token = token.trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Find a user token for a server, trying in order:
/// 1. Server-specific env var (from config)
/// 2. Stored token from ~/.config/snag/tokens/{server_name}
/// 3. CLI command (from config), whose output is then stored
///
/// `None` means the server is browsed anonymously.
pub fn load_server_token(server: &ServerConfig) -> Option<String> {
    if let Some(env_var) = &server.token_env {
        if let Some(token) = std::env::var(env_var).ok().and_then(non_empty) {
            return Some(token);
        }
    }

    if let Some(token) = load_stored_token(&server.name) {
        return Some(token);
    }

    if let Some(cmd) = &server.token_command {
        if let Some(token) = try_cli_token(cmd) {
            if let Err(e) = save_server_token(&server.name, &token) {
                tracing::warn!(server = %server.name, error = %e, "could not store token");
            }
            return Some(token);
        }
    }

    tracing::info!(server = %server.name, "no token found, continuing anonymously");
    None
}
