//! Browser-like request headers for intermediate-host fetches.

/// Real browser user agents.
pub const BROWSER_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Pick a user agent, varying per call.
pub fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    BROWSER_USER_AGENTS[nanos % BROWSER_USER_AGENTS.len()]
}

/// Configured user agent, or a random browser one.
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None | Some("") | Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent() {
        assert!(BROWSER_USER_AGENTS.contains(&resolve_user_agent(None).as_str()));
        assert!(BROWSER_USER_AGENTS.contains(&resolve_user_agent(Some("impersonate")).as_str()));
        assert_eq!(resolve_user_agent(Some("MyAgent/1.0")), "MyAgent/1.0");
    }
}
