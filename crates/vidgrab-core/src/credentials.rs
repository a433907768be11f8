//! Credential and strategy resolution for the extraction backend
//!
//! Builds a [`CredentialStrategy`] from process settings plus the local
//! filesystem: cookie jar discovery, player client selection, PO token
//! assembly, proxy and User-Agent passthrough. A strategy is rebuilt for every
//! request because credentials may be rotated on disk at any time.

use crate::config::{DownloaderSettings, COOKIE_FALLBACK_PATHS, DEFAULT_USER_AGENT};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Header yt-dlp requires on the first line of a cookie jar
pub const NETSCAPE_COOKIE_HEADER: &str = "# Netscape HTTP Cookie File";

/// Older header variant written by some browser exporters
pub const LEGACY_COOKIE_HEADER: &str = "# HTTP Cookie File";

/// File name of the cookie jar copy inside a request scratch directory
const SCRATCH_COOKIE_FILE: &str = "cookies.txt";

/// Player clients compatible with PO-token authorization
const TOKEN_PLAYER_CLIENTS: &[&str] = &["default", "mweb"];

/// Player clients that avoid sign-in challenges without a token
const TOKENLESS_PLAYER_CLIENTS: &[&str] = &["android", "ios"];

/// Everything the backend needs to authenticate one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStrategy {
    /// Validated Netscape cookie jar
    pub cookie_file: Option<PathBuf>,
    /// Proxy URL
    pub proxy: Option<String>,
    /// User-Agent header
    pub user_agent: String,
    /// Ordered player client identities
    pub player_clients: Vec<String>,
    /// Ordered fully-qualified `CONTEXT+TOKEN` entries
    pub po_tokens: Vec<String>,
}

impl Default for CredentialStrategy {
    fn default() -> Self {
        Self {
            cookie_file: None,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            player_clients: TOKENLESS_PLAYER_CLIENTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            po_tokens: Vec::new(),
        }
    }
}

/// Client a PO token is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClient {
    /// Desktop web player
    Web,
    /// Mobile web player
    MWeb,
    /// TV player
    Tv,
}

/// Request scope inside a client a PO token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    /// Video stream requests
    Gvs,
    /// Player requests
    Player,
    /// Subtitle requests
    Subs,
}

/// Context tag of a raw PO token, e.g. `web` or `mweb.gvs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenContext {
    /// Client the token belongs to
    pub client: TokenClient,
    /// Optional request scope
    pub scope: Option<TokenScope>,
}

/// Error for context tags outside the supported set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown PO token context '{0}'")]
pub struct UnknownTokenContext(pub String);

impl FromStr for TokenContext {
    type Err = UnknownTokenContext;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        let (client, scope) = match tag.split_once('.') {
            Some((client, scope)) => (client, Some(scope)),
            None => (tag.as_str(), None),
        };
        let client = match client {
            "web" => TokenClient::Web,
            "mweb" => TokenClient::MWeb,
            "tv" => TokenClient::Tv,
            _ => return Err(UnknownTokenContext(s.to_string())),
        };
        let scope = match scope {
            None => None,
            Some("gvs") => Some(TokenScope::Gvs),
            Some("player") => Some(TokenScope::Player),
            Some("subs") => Some(TokenScope::Subs),
            Some(_) => return Err(UnknownTokenContext(s.to_string())),
        };
        Ok(Self { client, scope })
    }
}

impl fmt::Display for TokenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let client = match self.client {
            TokenClient::Web => "web",
            TokenClient::MWeb => "mweb",
            TokenClient::Tv => "tv",
        };
        f.write_str(client)?;
        match self.scope {
            Some(TokenScope::Gvs) => f.write_str(".gvs"),
            Some(TokenScope::Player) => f.write_str(".player"),
            Some(TokenScope::Subs) => f.write_str(".subs"),
            None => Ok(()),
        }
    }
}

/// Assemble a fully-qualified token from a raw token and its context tag.
///
/// # Errors
///
/// Returns [`UnknownTokenContext`] if the tag is not a supported context.
///
/// # Examples
///
/// ```
/// use vidgrab_core::credentials::assemble_po_token;
///
/// assert_eq!(assemble_po_token("T1", "web").ok().as_deref(), Some("web+T1"));
/// assert!(assemble_po_token("T1", "desktop").is_err());
/// ```
pub fn assemble_po_token(raw_token: &str, context: &str) -> Result<String, UnknownTokenContext> {
    let context: TokenContext = context.parse()?;
    Ok(format!("{context}+{}", raw_token.trim()))
}

/// Validate one fully-qualified `CONTEXT+TOKEN` entry.
fn validate_qualified_token(entry: &str) -> Option<String> {
    match entry.split_once('+') {
        Some((context, token)) if !context.trim().is_empty() && !token.trim().is_empty() => {
            Some(format!("{}+{}", context.trim(), token.trim()))
        }
        _ => {
            warn!("Ignoring malformed PO token entry (expected CONTEXT+TOKEN)");
            None
        }
    }
}

/// UTF-8 byte order mark some exporters write before the header
const UTF8_BOM: &str = "\u{feff}";

/// Returns true if `first_line` is a recognized cookie jar header.
fn is_cookie_header(first_line: &str) -> bool {
    let line = first_line.trim_start_matches(UTF8_BOM).trim_end();
    line.starts_with(NETSCAPE_COOKIE_HEADER) || line.starts_with(LEGACY_COOKIE_HEADER)
}

/// Resolves a [`CredentialStrategy`] from settings and the local filesystem
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    cookie_candidates: Vec<PathBuf>,
    player_client_override: Option<Vec<String>>,
    po_tokens_raw: Option<String>,
    po_token: Option<String>,
    po_token_context: Option<String>,
    proxy: Option<String>,
    user_agent: Option<String>,
}

impl CredentialResolver {
    /// Create a resolver using the configured cookie path plus the fixed fallbacks
    #[must_use]
    pub fn new(settings: &DownloaderSettings) -> Self {
        let mut cookie_candidates: Vec<PathBuf> =
            settings.ytdlp_cookies_file.iter().cloned().collect();
        cookie_candidates.extend(COOKIE_FALLBACK_PATHS.iter().map(PathBuf::from));

        Self {
            cookie_candidates,
            player_client_override: settings.player_client_override(),
            po_tokens_raw: settings.ytdlp_po_tokens.clone(),
            po_token: settings.ytdlp_po_token.clone(),
            po_token_context: settings.ytdlp_po_token_context.clone(),
            proxy: settings.ytdlp_proxy.clone(),
            user_agent: settings.ytdlp_user_agent.clone(),
        }
    }

    /// Replace the ordered list of cookie jar candidates
    #[must_use]
    pub fn with_cookie_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.cookie_candidates = candidates;
        self
    }

    /// Build a strategy; the accepted cookie jar is copied into `scratch_dir`.
    ///
    /// Never fails: unreadable or invalid cookie jars are logged and skipped.
    #[must_use]
    pub fn resolve(&self, scratch_dir: &Path) -> CredentialStrategy {
        let po_tokens = self.po_tokens();
        let player_clients = self.player_clients(!po_tokens.is_empty());
        let cookie_file = self
            .find_cookie_jar()
            .map(|source| prepare_cookie_copy(&source, scratch_dir));

        CredentialStrategy {
            cookie_file,
            proxy: self.proxy.clone(),
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            player_clients,
            po_tokens,
        }
    }

    /// Priority: explicit override > token-compatible default > tokenless default.
    fn player_clients(&self, has_token: bool) -> Vec<String> {
        if let Some(clients) = &self.player_client_override {
            return clients.clone();
        }
        let defaults = if has_token {
            TOKEN_PLAYER_CLIENTS
        } else {
            TOKENLESS_PLAYER_CLIENTS
        };
        defaults.iter().map(ToString::to_string).collect()
    }

    fn po_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .po_tokens_raw
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(validate_qualified_token)
            .collect();

        if let Some(raw) = self.po_token.as_deref().filter(|t| !t.trim().is_empty()) {
            if raw.contains('+') {
                tokens.extend(validate_qualified_token(raw));
            } else {
                let context = self.po_token_context.as_deref().unwrap_or_default();
                match assemble_po_token(raw, context) {
                    Ok(token) => tokens.push(token),
                    Err(e) => warn!("Ignoring raw PO token: {e}"),
                }
            }
        }
        tokens
    }

    fn find_cookie_jar(&self) -> Option<PathBuf> {
        for candidate in &self.cookie_candidates {
            if !candidate.is_file() {
                continue;
            }
            match first_line(candidate) {
                Ok(line) if is_cookie_header(&line) => {
                    info!(path = %candidate.display(), "Using cookie jar");
                    return Some(candidate.clone());
                }
                Ok(_) => {
                    warn!(
                        path = %candidate.display(),
                        "Cookie file lacks a Netscape header, ignoring"
                    );
                }
                Err(e) => {
                    warn!(path = %candidate.display(), error = %e, "Failed to read cookie file");
                }
            }
        }
        debug!("No valid cookie jar found, continuing without cookies");
        None
    }
}

fn first_line(path: &Path) -> std::io::Result<String> {
    use std::io::BufRead;

    let file = std::fs::File::open(path)?;
    let mut line = String::new();
    std::io::BufReader::new(file).read_line(&mut line)?;
    Ok(line)
}

/// Copy the jar into a writable scratch location without a leading BOM,
/// prepending the Netscape header when the rest does not start with it. Falls back to
/// the source path if the copy cannot be written.
fn prepare_cookie_copy(source: &Path, scratch_dir: &Path) -> PathBuf {
    let copy = || -> std::io::Result<PathBuf> {
        let raw = std::fs::read(source)?;
        let data = raw.strip_prefix(UTF8_BOM.as_bytes()).unwrap_or(&raw);
        let mut out = Vec::with_capacity(data.len() + NETSCAPE_COOKIE_HEADER.len() + 1);
        if !data.starts_with(NETSCAPE_COOKIE_HEADER.as_bytes()) {
            out.extend_from_slice(NETSCAPE_COOKIE_HEADER.as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(data);

        std::fs::create_dir_all(scratch_dir)?;
        let target = scratch_dir.join(SCRATCH_COOKIE_FILE);
        std::fs::write(&target, out)?;
        Ok(target)
    };

    match copy() {
        Ok(target) => target,
        Err(e) => {
            warn!(
                path = %source.display(),
                error = %e,
                "Failed to copy cookie jar, using the original file"
            );
            source.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COOKIE_BODY: &str = ".youtube.com\tTRUE\t/\tTRUE\t0\tSID\tvalue\n";

    fn resolver_for(candidates: Vec<PathBuf>) -> CredentialResolver {
        CredentialResolver::new(&DownloaderSettings::default()).with_cookie_candidates(candidates)
    }

    #[test]
    fn test_assemble_raw_token() {
        assert_eq!(assemble_po_token("T1", "web").ok(), Some("web+T1".to_string()));
        assert_eq!(
            assemble_po_token("T2", "MWEB.gvs").ok(),
            Some("mweb.gvs+T2".to_string())
        );
        assert!(assemble_po_token("T3", "web.cookies").is_err());
        assert!(assemble_po_token("T4", "").is_err());
    }

    #[test]
    fn test_malformed_qualified_token_is_ignored() {
        let settings = DownloaderSettings {
            ytdlp_po_tokens: Some("webT1".to_string()),
            ..Default::default()
        };
        let scratch = TempDir::new().expect("tempdir");
        let strategy = CredentialResolver::new(&settings)
            .with_cookie_candidates(Vec::new())
            .resolve(scratch.path());

        assert!(strategy.po_tokens.is_empty());
        assert_eq!(strategy.player_clients, vec!["android", "ios"]);
    }

    #[test]
    fn test_qualified_tokens_and_raw_token_combine() {
        let settings = DownloaderSettings {
            ytdlp_po_tokens: Some("mweb.gvs+AAA, bad, mweb.player+BBB,+CCC".to_string()),
            ytdlp_po_token: Some("T1".to_string()),
            ytdlp_po_token_context: Some("web".to_string()),
            ..Default::default()
        };
        let scratch = TempDir::new().expect("tempdir");
        let strategy = CredentialResolver::new(&settings)
            .with_cookie_candidates(Vec::new())
            .resolve(scratch.path());

        assert_eq!(
            strategy.po_tokens,
            vec!["mweb.gvs+AAA", "mweb.player+BBB", "web+T1"]
        );
        assert_eq!(strategy.player_clients, vec!["default", "mweb"]);
    }

    #[test]
    fn test_player_client_override_wins() {
        let settings = DownloaderSettings {
            ytdlp_player_clients: Some("tv,web_safari".to_string()),
            ytdlp_po_tokens: Some("web+T1".to_string()),
            ..Default::default()
        };
        let scratch = TempDir::new().expect("tempdir");
        let strategy = CredentialResolver::new(&settings)
            .with_cookie_candidates(Vec::new())
            .resolve(scratch.path());

        assert_eq!(strategy.player_clients, vec!["tv", "web_safari"]);
    }

    #[test]
    fn test_proxy_and_user_agent_passthrough() {
        let scratch = TempDir::new().expect("tempdir");
        let strategy = resolver_for(Vec::new()).resolve(scratch.path());
        assert_eq!(strategy.proxy, None);
        assert_eq!(strategy.user_agent, DEFAULT_USER_AGENT);

        let settings = DownloaderSettings {
            ytdlp_proxy: Some("socks5://127.0.0.1:1080".to_string()),
            ytdlp_user_agent: Some("UA/1.0".to_string()),
            ..Default::default()
        };
        let strategy = CredentialResolver::new(&settings)
            .with_cookie_candidates(Vec::new())
            .resolve(scratch.path());
        assert_eq!(strategy.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(strategy.user_agent, "UA/1.0");
    }

    #[test]
    fn test_cookie_without_marker_is_treated_as_absent() {
        let dir = TempDir::new().expect("tempdir");
        let jar = dir.path().join("cookies.txt");
        std::fs::write(&jar, COOKIE_BODY).expect("write jar");

        let scratch = dir.path().join("scratch");
        let strategy = resolver_for(vec![jar]).resolve(&scratch);
        assert_eq!(strategy.cookie_file, None);
    }

    #[test]
    fn test_netscape_cookie_is_copied_verbatim() {
        let dir = TempDir::new().expect("tempdir");
        let jar = dir.path().join("cookies.txt");
        let content = format!("{NETSCAPE_COOKIE_HEADER}\n{COOKIE_BODY}");
        std::fs::write(&jar, &content).expect("write jar");

        let scratch = dir.path().join("scratch");
        let strategy = resolver_for(vec![jar]).resolve(&scratch);
        let copy = strategy.cookie_file.expect("cookie accepted");

        assert_eq!(copy, scratch.join(SCRATCH_COOKIE_FILE));
        assert_eq!(std::fs::read_to_string(copy).expect("read copy"), content);
    }

    #[test]
    fn test_legacy_header_gets_netscape_header_prepended() {
        let dir = TempDir::new().expect("tempdir");
        let jar = dir.path().join("cookies.txt");
        let content = format!("{LEGACY_COOKIE_HEADER}\n{COOKIE_BODY}");
        std::fs::write(&jar, &content).expect("write jar");

        let scratch = dir.path().join("scratch");
        let strategy = resolver_for(vec![jar.clone()]).resolve(&scratch);
        let copy = strategy.cookie_file.expect("cookie accepted");
        let copied = std::fs::read_to_string(copy).expect("read copy");

        assert!(copied.starts_with(NETSCAPE_COOKIE_HEADER));
        assert!(copied.ends_with(&content));
        // Source is untouched
        assert_eq!(std::fs::read_to_string(jar).expect("read jar"), content);
    }

    #[test]
    fn test_first_valid_candidate_wins() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("missing.txt");
        let invalid = dir.path().join("invalid.txt");
        let valid = dir.path().join("valid.txt");
        std::fs::write(&invalid, COOKIE_BODY).expect("write");
        std::fs::write(&valid, format!("\u{feff}{NETSCAPE_COOKIE_HEADER}\r\n{COOKIE_BODY}"))
            .expect("write");

        let scratch = dir.path().join("scratch");
        let strategy = resolver_for(vec![missing, invalid, valid]).resolve(&scratch);
        assert_eq!(strategy.cookie_file, Some(scratch.join(SCRATCH_COOKIE_FILE)));
    }

    #[test]
    fn test_bom_is_stripped_from_copy() {
        let dir = TempDir::new().expect("tempdir");
        let jar = dir.path().join("cookies.txt");
        std::fs::write(&jar, format!("\u{feff}{NETSCAPE_COOKIE_HEADER}\n{COOKIE_BODY}"))
            .expect("write jar");

        let scratch = dir.path().join("scratch");
        let strategy = resolver_for(vec![jar]).resolve(&scratch);
        let copy = strategy.cookie_file.expect("cookie accepted");

        assert_eq!(
            std::fs::read_to_string(copy).expect("read copy"),
            format!("{NETSCAPE_COOKIE_HEADER}\n{COOKIE_BODY}")
        );
    }

    #[test]
    fn test_unknown_context_message() {
        let err = "desktop".parse::<TokenContext>().expect_err("unknown tag");
        assert_eq!(err.to_string(), "unknown PO token context 'desktop'");
    }
}
