use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

struct ClientAccount {
    email: String,
    password_digest: [u8; 32],
}

/// Subscriber accounts, unique by login and by email.
#[derive(Default)]
pub struct ClientRegistry {
    accounts: RwLock<HashMap<String, ClientAccount>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the login or the email is already taken.
    pub fn register(&self, login: &str, password: &str, email: &str) -> bool {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(login) || accounts.values().any(|a| a.email == email) {
            return false;
        }
        accounts.insert(
            login.to_string(),
            ClientAccount {
                email: email.to_string(),
                password_digest: digest(password),
            },
        );
        true
    }

    pub fn verify(&self, login: &str, password: &str) -> bool {
        self.accounts
            .read()
            .get(login)
            .map(|account| account.password_digest == digest(password))
            .unwrap_or(false)
    }

    pub fn contains(&self, login: &str) -> bool {
        self.accounts.read().contains_key(login)
    }
}

fn digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}
