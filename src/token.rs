//! GitHub token resolution.
//!
//! Reads work without a token (subject to rate limits); writes need one.
//! The token is resolved through a chain:
//!
//! 1. `--token <token>`: explicit per-command override
//! 2. `AWESOME_GITHUB_TOKEN` env var
//! 3. `GITHUB_TOKEN` env var
//! 4. `token` in `~/.awesome/config.toml`

use std::env;

/// Error message shown when a write has no token to authenticate with.
pub const TOKEN_REQUIRED: &str = "a GitHub token is required to write: pass --token, \
    set AWESOME_GITHUB_TOKEN or GITHUB_TOKEN, or add `token = \"...\"` to ~/.awesome/config.toml";

/// Resolve the token from the chain. Empty values are skipped.
pub fn resolve_token(explicit: Option<&str>, configured: Option<&str>) -> Option<String> {
    first_present([
        explicit.map(str::to_string),
        env::var("AWESOME_GITHUB_TOKEN").ok(),
        env::var("GITHUB_TOKEN").ok(),
        configured.map(str::to_string),
    ])
}

fn first_present<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
}
