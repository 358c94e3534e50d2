use anyhow::{bail, Context, Result};
use keyring::Entry;
use reqwest::Url;
use tracing::{debug, warn};

const SERVICE_NAME: &str = "labdesk";

/// Remembered login passwords, scoped to one backend.
///
/// Keychain accounts are named `username@host/path`, so the same username on
/// two laboratory servers keeps two separate passwords.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    backend: String,
}

impl CredentialStore {
    pub fn for_backend(base_url: &Url) -> Self {
        let mut backend = base_url.host_str().unwrap_or_default().to_ascii_lowercase();
        if let Some(port) = base_url.port() {
            backend.push_str(&format!(":{}", port));
        }
        let path = base_url.path().trim_matches('/');
        if !path.is_empty() {
            backend.push('/');
            backend.push_str(path);
        }
        Self { backend }
    }

    fn account(&self, username: &str) -> Result<String> {
        let username = username.trim();
        if username.is_empty() {
            bail!("A username is required to use the keychain");
        }
        Ok(format!("{}@{}", username, self.backend))
    }

    fn entry(&self, username: &str) -> Result<Entry> {
        let account = self.account(username)?;
        Entry::new(SERVICE_NAME, &account)
            .with_context(|| format!("Keychain unavailable for {}", account))
    }

    /// Keep `password` for the next `login` of `username`
    pub fn remember(&self, username: &str, password: &str) -> Result<()> {
        self.entry(username)?
            .set_password(password)
            .with_context(|| format!("Could not save the password of {}", username))
    }

    /// The remembered password, if any. Keychain failures are logged and
    /// read as "nothing remembered" so login can fall back to a prompt.
    pub fn recall(&self, username: &str) -> Option<String> {
        let entry = match self.entry(username) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Keychain lookup skipped");
                return None;
            }
        };
        match entry.get_password() {
            Ok(password) => Some(password),
            Err(keyring::Error::NoEntry) => {
                debug!(username = username, "No remembered password");
                None
            }
            Err(e) => {
                warn!(error = %e, "Could not read remembered password");
                None
            }
        }
    }

    /// Drop the remembered password. Forgetting a user with nothing
    /// remembered succeeds.
    pub fn forget(&self, username: &str) -> Result<()> {
        match self.entry(username)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Could not delete the password of {}", username)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(url: &str) -> CredentialStore {
        CredentialStore::for_backend(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_accounts_are_scoped_to_backend() {
        assert_eq!(
            store("http://Serveur/hdmbanga/").account(" laborantin ").unwrap(),
            "laborantin@serveur/hdmbanga"
        );
        assert_eq!(
            store("http://localhost:8080/api/").account("admin").unwrap(),
            "admin@localhost:8080/api"
        );
        assert_eq!(store("https://lab.example/").account("admin").unwrap(), "admin@lab.example");
    }

    #[test]
    fn test_blank_username_is_refused() {
        let creds = store("http://serveur/hdmbanga/");
        assert!(creds.account("   ").is_err());
        assert!(creds.remember("", "secret").is_err());
        assert!(creds.forget(" ").is_err());
        assert!(creds.recall("").is_none());
    }
}
