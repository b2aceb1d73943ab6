//! GitHub token persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "tally-cli";

/// Keychain slot holding one profile's token.
#[derive(Clone)]
pub struct TokenStore {
    username: String,
}

type TokenResult<T> = Result<T, CliError>;

fn storage_error(error: impl ToString) -> CliError {
    CliError::Credentials(error.to_string())
}

impl TokenStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            username: format!("github_token:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> TokenResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username).map_err(storage_error)
    }

    #[cfg(not(test))]
    pub fn load(&self) -> TokenResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(storage_error(error)),
        }
    }

    #[cfg(test)]
    pub fn load(&self) -> TokenResult<Option<String>> {
        let guard = Self::test_store().lock().map_err(storage_error)?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    pub fn save(&self, token: &str) -> TokenResult<()> {
        self.entry()?.set_password(token).map_err(storage_error)
    }

    #[cfg(test)]
    pub fn save(&self, token: &str) -> TokenResult<()> {
        let mut guard = Self::test_store().lock().map_err(storage_error)?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    pub fn clear(&self) -> TokenResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(storage_error(error)),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> TokenResult<()> {
        let mut guard = Self::test_store().lock().map_err(storage_error)?;
        guard.remove(&self.username);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_scoped_per_profile() {
        let work = TokenStore::new("auth-test-work");
        let home = TokenStore::new("auth-test-home");

        work.save("ghp_work").unwrap();
        assert_eq!(work.load().unwrap().as_deref(), Some("ghp_work"));
        assert_eq!(home.load().unwrap(), None);

        work.clear().unwrap();
        assert_eq!(work.load().unwrap(), None);
        home.clear().unwrap();
    }
}
