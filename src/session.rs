use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DashboardError, Result};

pub const AUTH_KEY: &str = "kdgAuthSession";
pub const LOGIN_PAGE: &str = "index.html";
pub const HOME_PAGE: &str = "home.html";
pub const INVALID_LOGIN: &str = "Incorrect email or password.";

/// Browser side of the gate, reading its keys from `data-*` attributes on `<body>`.
///
/// Protected pages without the flag go to the login view, `[data-signout]` links clear both
/// scopes, pages restored from history are re-checked, and `[data-login-form]` compares a
/// SHA-256 of `email:password` against its `data-credential` attribute.
pub const INLINE_GATE_JS: &str = r##"(() => {
  const body = document.body;
  const key = body.dataset.authKey;
  const loginPage = body.dataset.loginPage;
  const homePage = body.dataset.homePage;
  const guarded = () => body.dataset.requiresAuth === "true";
  const hasSession = () => localStorage.getItem(key) === "true";
  const start = () => {
    localStorage.setItem(key, "true");
    sessionStorage.setItem(key, "true");
  };
  const clear = () => {
    localStorage.removeItem(key);
    sessionStorage.removeItem(key);
  };
  const go = (target) => {
    if (target) window.location.href = target;
  };
  const digest = async (text) => {
    const bytes = await crypto.subtle.digest("SHA-256", new TextEncoder().encode(text));
    return Array.from(new Uint8Array(bytes), (b) => b.toString(16).padStart(2, "0")).join("");
  };

  if (guarded() && !hasSession()) {
    go(loginPage);
    return;
  }
  const form = document.querySelector("[data-login-form]");
  if (form) {
    if (hasSession()) {
      go(homePage);
      return;
    }
    const error = form.querySelector("[data-login-error]");
    form.addEventListener("submit", async (event) => {
      event.preventDefault();
      const email = (form.querySelector("#floatingInput").value || "").trim().toLowerCase();
      const password = form.querySelector("#floatingPassword").value || "";
      const expected = form.getAttribute("data-credential");
      if (!expected || (await digest(`${email}:${password}`)) !== expected) {
        clear();
        if (error) {
          error.textContent = "Incorrect email or password.";
          error.hidden = false;
        }
        return;
      }
      if (error) error.hidden = true;
      start();
      go(homePage);
    });
  }
  document.querySelectorAll("[data-signout]").forEach((link) => {
    link.addEventListener("click", (event) => {
      event.preventDefault();
      clear();
      go(link.getAttribute("href") || loginPage);
    });
  });
  window.addEventListener("pageshow", (event) => {
    if (event.persisted && guarded() && !hasSession()) go(loginPage);
  });
})();"##;

/// Key-value storage scope for the session flag.
pub trait SessionStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    values: BTreeMap<String, String>,
    updated_at: Option<DateTime<Utc>>,
}

/// Persistent scope, a JSON file that outlives the process.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("session.json"))
    }

    /// An unreadable state file counts as empty so a corrupt flag never locks the CLI out.
    fn read(&self) -> Result<StoreFile> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(file) => Ok(file),
                Err(err) => {
                    warn!(path = %self.path.display(), "ignoring corrupt session file: {err}");
                    Ok(StoreFile::default())
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, mut file: StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        file.updated_at = Some(Utc::now());
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut file = self.read()?;
        file.values.insert(key.to_string(), value.to_string());
        self.write(file)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut file = self.read()?;
        if file.values.remove(key).is_some() {
            self.write(file)?;
        }
        Ok(())
    }
}

/// Per-tab scope; lives only as long as the tab.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tab: Uuid,
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new_tab() -> Self {
        Self {
            tab: Uuid::new_v4(),
            values: BTreeMap::new(),
        }
    }

    pub fn tab(&self) -> Uuid {
        self.tab
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

pub trait CredentialVerifier {
    fn verify(&self, email: &str, password: &str) -> bool;
}

/// A single configured email/password pair.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    email: String,
    password: String,
}

impl StaticCredential {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: normalize_email(email),
            password: password.to_string(),
        }
    }
}

impl StaticCredential {
    /// Hex SHA-256 of `email:password`, what the login form compares against.
    pub fn digest(&self) -> String {
        credential_digest(&self.email, &self.password)
    }
}

pub fn credential_digest(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", normalize_email(email), password).as_bytes());
    hex::encode(hasher.finalize())
}

impl CredentialVerifier for StaticCredential {
    fn verify(&self, email: &str, password: &str) -> bool {
        normalize_email(email) == self.email && password == self.password
    }
}

/// Accepts nothing; for gates that only check or clear an existing session.
pub struct DenyAll;

impl CredentialVerifier for DenyAll {
    fn verify(&self, _email: &str, _password: &str) -> bool {
        false
    }
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Stay,
    Redirect(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
}

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("{}", INVALID_LOGIN)]
    InvalidCredentials,

    #[error(transparent)]
    Storage(#[from] DashboardError),
}

pub struct SessionGate<V> {
    persistent: Box<dyn SessionStore>,
    tab: Box<dyn SessionStore>,
    verifier: V,
}

impl<V: CredentialVerifier> SessionGate<V> {
    pub fn new(
        persistent: Box<dyn SessionStore>,
        tab: Box<dyn SessionStore>,
        verifier: V,
    ) -> Self {
        Self {
            persistent,
            tab,
            verifier,
        }
    }

    pub fn has_session(&self) -> Result<bool> {
        Ok(self.persistent.get(AUTH_KEY)?.as_deref() == Some("true"))
    }

    pub fn state(&self) -> Result<SessionState> {
        Ok(if self.has_session()? {
            SessionState::LoggedIn
        } else {
            SessionState::LoggedOut
        })
    }

    fn start(&mut self) -> Result<()> {
        self.persistent.set(AUTH_KEY, "true")?;
        self.tab.set(AUTH_KEY, "true")
    }

    fn clear(&mut self) -> Result<()> {
        self.persistent.remove(AUTH_KEY)?;
        self.tab.remove(AUTH_KEY)
    }

    /// Visiting the login view with a live session goes straight home.
    pub fn open_login(&self) -> Result<Navigation> {
        if self.has_session()? {
            Ok(Navigation::Redirect(HOME_PAGE.to_string()))
        } else {
            Ok(Navigation::Stay)
        }
    }

    pub fn login(
        &mut self,
        email: &str,
        password: &str,
    ) -> std::result::Result<Navigation, LoginError> {
        if !self.verifier.verify(email, password) {
            self.clear()?;
            warn!("login rejected");
            return Err(LoginError::InvalidCredentials);
        }
        self.start()?;
        info!(email = %normalize_email(email), "login accepted");
        Ok(Navigation::Redirect(HOME_PAGE.to_string()))
    }

    pub fn sign_out(&mut self, target: Option<&str>) -> Result<Navigation> {
        self.clear()?;
        info!("signed out");
        let target = target.filter(|t| !t.is_empty()).unwrap_or(LOGIN_PAGE);
        Ok(Navigation::Redirect(target.to_string()))
    }

    pub fn enforce(&self, requires_auth: bool) -> Result<Navigation> {
        if requires_auth && !self.has_session()? {
            debug!("protected page without session");
            return Ok(Navigation::Redirect(LOGIN_PAGE.to_string()));
        }
        Ok(Navigation::Stay)
    }

    /// Re-checks a page restored from the history cache.
    pub fn on_page_show(&self, persisted: bool, requires_auth: bool) -> Result<Navigation> {
        if persisted {
            self.enforce(requires_auth)
        } else {
            Ok(Navigation::Stay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: &str = "ops@example.com";
    const PASSWORD: &str = "s3cret";

    fn gate_in(dir: &Path) -> SessionGate<StaticCredential> {
        SessionGate::new(
            Box::new(FileStore::in_dir(dir)),
            Box::new(MemoryStore::new_tab()),
            StaticCredential::new(EMAIL, PASSWORD),
        )
    }

    #[test]
    fn verifier_normalizes_email_but_not_password() {
        let cred = StaticCredential::new(EMAIL, PASSWORD);
        assert!(cred.verify("  OPS@Example.com ", PASSWORD));
        assert!(!cred.verify(EMAIL, "S3CRET"));
        assert!(!cred.verify(EMAIL, " s3cret"));
        assert!(!cred.verify("other@example.com", PASSWORD));
    }

    #[test]
    fn login_sets_flag_and_redirects_home() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate_in(dir.path());
        assert_eq!(gate.state().unwrap(), SessionState::LoggedOut);

        let nav = gate.login("Ops@Example.com", PASSWORD).unwrap();
        assert_eq!(nav, Navigation::Redirect(HOME_PAGE.to_string()));
        assert_eq!(gate.state().unwrap(), SessionState::LoggedIn);
        let stored = FileStore::in_dir(dir.path()).get(AUTH_KEY).unwrap();
        assert_eq!(stored.as_deref(), Some("true"));
    }

    #[test]
    fn failed_login_clears_flag_and_stays() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate_in(dir.path());
        gate.login(EMAIL, PASSWORD).unwrap();

        let err = gate.login(EMAIL, "wrong").unwrap_err();
        assert!(matches!(err, LoginError::InvalidCredentials));
        assert_eq!(err.to_string(), "Incorrect email or password.");
        assert!(!gate.has_session().unwrap());
    }

    #[test]
    fn protected_pages_redirect_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate_in(dir.path());
        assert_eq!(gate.enforce(true).unwrap(), Navigation::Redirect(LOGIN_PAGE.to_string()));
        assert_eq!(gate.enforce(false).unwrap(), Navigation::Stay);

        gate.login(EMAIL, PASSWORD).unwrap();
        assert_eq!(gate.enforce(true).unwrap(), Navigation::Stay);
        assert_eq!(gate.open_login().unwrap(), Navigation::Redirect(HOME_PAGE.to_string()));
    }

    #[test]
    fn sign_out_clears_and_redirects() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate_in(dir.path());
        gate.login(EMAIL, PASSWORD).unwrap();

        assert_eq!(gate.sign_out(None).unwrap(), Navigation::Redirect(LOGIN_PAGE.to_string()));
        assert_eq!(gate.state().unwrap(), SessionState::LoggedOut);
        gate.login(EMAIL, PASSWORD).unwrap();
        assert_eq!(
            gate.sign_out(Some("bye.html")).unwrap(),
            Navigation::Redirect("bye.html".to_string())
        );
    }

    #[test]
    fn history_restore_rechecks_flag_cleared_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate_in(dir.path());
        gate.login(EMAIL, PASSWORD).unwrap();

        // another tab signs out
        let mut other = gate_in(dir.path());
        other.sign_out(None).unwrap();

        assert_eq!(gate.on_page_show(false, true).unwrap(), Navigation::Stay);
        assert_eq!(
            gate.on_page_show(true, true).unwrap(),
            Navigation::Redirect(LOGIN_PAGE.to_string())
        );
    }

    #[test]
    fn corrupt_session_file_reads_as_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session.json"), "{not json").unwrap();
        let mut gate = gate_in(dir.path());
        assert_eq!(gate.state().unwrap(), SessionState::LoggedOut);
        assert_eq!(gate.enforce(true).unwrap(), Navigation::Redirect(LOGIN_PAGE.to_string()));

        gate.login(EMAIL, PASSWORD).unwrap();
        assert_eq!(gate.state().unwrap(), SessionState::LoggedIn);
    }

    #[test]
    fn digest_covers_normalized_email_and_exact_password() {
        let cred = StaticCredential::new(" OPS@example.com", PASSWORD);
        assert_eq!(cred.digest(), credential_digest(EMAIL, PASSWORD));
        assert_eq!(cred.digest().len(), 64);
        assert_ne!(cred.digest(), credential_digest(EMAIL, "S3CRET"));
    }

    #[test]
    fn gate_script_reads_keys_from_body() {
        assert!(INLINE_GATE_JS.contains("body.dataset.authKey"));
        assert!(INLINE_GATE_JS.contains("[data-signout]"));
        assert!(INLINE_GATE_JS.contains("event.persisted"));
        assert!(INLINE_GATE_JS.contains(INVALID_LOGIN));
    }

    #[test]
    fn tab_scope_is_private_to_each_tab() {
        let mut a = MemoryStore::new_tab();
        let b = MemoryStore::new_tab();
        a.set(AUTH_KEY, "true").unwrap();
        assert_ne!(a.tab(), b.tab());
        assert_eq!(b.get(AUTH_KEY).unwrap(), None);
    }
}
