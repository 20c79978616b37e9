use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keyring::Entry;
use rand::RngCore;
use tracing::debug;

const SERVICE_NAME: &str = "expensa";

/// Keychain account holding the secret that seals the session file
const STORE_SECRET_ACCOUNT: &str = "session-store-secret";

const STORE_SECRET_LEN: usize = 32;

pub struct CredentialStore;

impl CredentialStore {
    /// Fetch the session-store secret from the OS keychain, creating and
    /// storing a random one on first use.
    pub fn store_secret() -> Result<Vec<u8>> {
        let entry = Entry::new(SERVICE_NAME, STORE_SECRET_ACCOUNT)
            .context("Failed to create keyring entry")?;

        match entry.get_password() {
            Ok(encoded) => STANDARD
                .decode(encoded.trim())
                .context("Stored session secret is not valid base64"),
            Err(keyring::Error::NoEntry) => {
                let mut secret = vec![0u8; STORE_SECRET_LEN];
                rand::thread_rng().fill_bytes(&mut secret);
                entry
                    .set_password(&STANDARD.encode(&secret))
                    .context("Failed to store session secret in keychain")?;
                debug!("Generated new session store secret");
                Ok(secret)
            }
            Err(e) => Err(e).context("Failed to retrieve session secret from keychain"),
        }
    }

    /// Forget the session-store secret. Any sealed session file becomes unreadable.
    pub fn delete_store_secret() -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, STORE_SECRET_ACCOUNT)
            .context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session secret from keychain"),
        }
    }
}
