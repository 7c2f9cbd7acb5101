//! User agent handling for HTTP requests.

pub const USER_AGENT: &str = concat!("partyfetch/", env!("CARGO_PKG_VERSION"));

/// Browser user agent used when the config asks for `impersonate`.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0";

/// Resolve user agent from config value.
/// - None => default partyfetch user agent
/// - "impersonate" => a real browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config.map(str::trim) {
        None | Some("") => USER_AGENT.to_string(),
        Some("impersonate") => BROWSER_USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}
