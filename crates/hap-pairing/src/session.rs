//! Pairing orchestrator.
//!
//! [`Pairer`] drives the Pair-Setup and Pair-Verify handshakes over a
//! [`PairingTransport`] and keeps the long-term material in a [`KeyStore`].

use std::sync::Arc;

use hap_core::error::{PairingError, Result};
use hap_crypto::keys::{SessionKeys, SharedSecret};
use tracing::{info, warn};

use crate::controller::AccessoryIdentity;
use crate::pair_setup::PairSetup;
use crate::pair_verify::PairVerify;
use crate::storage::{self, KeyStore};
use crate::traits::PairingTransport;

/// Setup codes HAP forbids because they are trivially guessable.
const DISALLOWED_SETUP_CODES: [&str; 12] = [
    "000-00-000",
    "111-11-111",
    "222-22-222",
    "333-33-333",
    "444-44-444",
    "555-55-555",
    "666-66-666",
    "777-77-777",
    "888-88-888",
    "999-99-999",
    "123-45-678",
    "876-54-321",
];

/// Pairing configuration for one controller identity.
#[derive(Clone)]
pub struct PairingConfig {
    storage_key: String,
    setup_code: Option<String>,
    pairing_id: Option<String>,
}

impl PairingConfig {
    pub fn builder() -> PairingConfigBuilder {
        PairingConfigBuilder::new()
    }

    /// Key under which this controller's material is stored.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Normalized setup code (`XXX-XX-XXX`), if one was given.
    pub fn setup_code(&self) -> Option<&str> {
        self.setup_code.as_deref()
    }

    /// Pairing identifier to use if a new controller identity is generated.
    pub fn pairing_id(&self) -> Option<&str> {
        self.pairing_id.as_deref()
    }
}

impl std::fmt::Debug for PairingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingConfig")
            .field("storage_key", &self.storage_key)
            .field("setup_code", &self.setup_code.as_ref().map(|_| "<redacted>"))
            .field("pairing_id", &self.pairing_id)
            .finish()
    }
}

/// Builder for [`PairingConfig`].
#[derive(Debug, Clone)]
pub struct PairingConfigBuilder {
    storage_key: String,
    setup_code: Option<String>,
    pairing_id: Option<String>,
}

impl PairingConfigBuilder {
    /// Create new builder with defaults.
    pub fn new() -> Self {
        Self {
            storage_key: "default".to_string(),
            setup_code: None,
            pairing_id: None,
        }
    }

    /// Set the key under which long-term material is stored.
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Set the accessory's setup code, as `XXX-XX-XXX` or eight digits.
    pub fn setup_code(mut self, code: impl Into<String>) -> Self {
        self.setup_code = Some(code.into());
        self
    }

    /// Use a fixed controller pairing identifier instead of a derived one.
    pub fn pairing_id(mut self, id: impl Into<String>) -> Self {
        self.pairing_id = Some(id.into());
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<PairingConfig> {
        let setup_code = self
            .setup_code
            .as_deref()
            .map(normalize_setup_code)
            .transpose()?;

        Ok(PairingConfig {
            storage_key: self.storage_key,
            setup_code,
            pairing_id: self.pairing_id,
        })
    }
}

impl Default for PairingConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Bring a setup code into `XXX-XX-XXX` form, rejecting malformed and
/// trivial codes.
pub fn normalize_setup_code(code: &str) -> Result<String> {
    let digits: String = match code.len() {
        8 => code.to_string(),
        10 if code.as_bytes()[3] == b'-' && code.as_bytes()[6] == b'-' => code.replace('-', ""),
        _ => String::new(),
    };
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PairingError::InvalidSetupCode(
            "expected XXX-XX-XXX or eight digits".to_string(),
        )
        .into());
    }

    let normalized = format!("{}-{}-{}", &digits[0..3], &digits[3..5], &digits[5..8]);
    if DISALLOWED_SETUP_CODES.contains(&normalized.as_str()) {
        return Err(PairingError::InvalidSetupCode("code is too easy to guess".to_string()).into());
    }
    Ok(normalized)
}

/// Result of a completed Pair-Setup.
pub struct PairSetupOutcome {
    /// The accessory's verified long-term identity, now persisted.
    pub accessory: AccessoryIdentity,
    /// The SRP session key K.
    pub session_key: SharedSecret,
}

impl std::fmt::Debug for PairSetupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairSetupOutcome")
            .field("accessory", &self.accessory)
            .field("session_key", &"<redacted>")
            .finish()
    }
}

/// Runs pairing handshakes for one controller identity.
pub struct Pairer<S: ?Sized> {
    config: PairingConfig,
    store: Arc<S>,
}

impl<S: KeyStore + ?Sized> Pairer<S> {
    pub fn new(config: PairingConfig, store: Arc<S>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Whether the store holds a completed pairing for this identity.
    pub fn is_paired(&self) -> Result<bool> {
        match storage::load_long_term(self.store.as_ref(), self.config.storage_key()) {
            Ok(_) => Ok(true),
            Err(hap_core::Error::Pairing(PairingError::NotPaired(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Run Pair-Setup M1-M6 and persist the accessory's identity.
    ///
    /// The controller identity is loaded, or generated and stored on first
    /// use. Nothing is persisted about the accessory unless M6 verifies.
    pub async fn pair_setup<P>(&self, transport: &mut P) -> Result<PairSetupOutcome>
    where
        P: PairingTransport + ?Sized,
    {
        let setup_code = self
            .config
            .setup_code()
            .ok_or_else(|| PairingError::InvalidSetupCode("no setup code configured".to_string()))?;
        let key = self.config.storage_key();
        let controller =
            storage::load_or_generate_controller(self.store.as_ref(), key, self.config.pairing_id())?;

        info!(storage_key = key, pairing_id = controller.pairing_id(), "Starting Pair-Setup");
        let mut setup = PairSetup::new(setup_code);

        let result = async {
            let m2 = transport.pair_setup(&setup.generate_m1()?).await?;
            setup.process_m2(&m2)?;
            let m4 = transport.pair_setup(&setup.generate_m3()?).await?;
            setup.process_m4(&m4)?;
            let m6 = transport.pair_setup(&setup.generate_m5(&controller)?).await?;
            setup.process_m6(&m6)
        }
        .await;

        let accessory = match result {
            Ok(accessory) => accessory,
            Err(e) => {
                warn!(storage_key = key, error = %e, "Pair-Setup failed");
                return Err(e);
            }
        };

        storage::save_accessory(self.store.as_ref(), key, &accessory)?;
        let session_key = setup
            .session_key()
            .map(SharedSecret::new)
            .ok_or_else(|| PairingError::InvalidState("session key missing".to_string()))?;

        Ok(PairSetupOutcome {
            accessory,
            session_key,
        })
    }

    /// Run Pair-Verify M1-M4 against the stored pairing.
    pub async fn pair_verify<P>(&self, transport: &mut P) -> Result<SessionKeys>
    where
        P: PairingTransport + ?Sized,
    {
        let key = self.config.storage_key();
        let identity = storage::load_long_term(self.store.as_ref(), key)?;

        info!(
            storage_key = key,
            accessory_id = %identity.accessory.pairing_id,
            "Starting Pair-Verify"
        );
        let mut verify = PairVerify::new(identity);

        let result = async {
            let m2 = transport.pair_verify(&verify.generate_m1()?).await?;
            verify.process_m2(&m2)?;
            let m4 = transport.pair_verify(&verify.generate_m3()?).await?;
            verify.process_m4(&m4)
        }
        .await;

        if let Err(e) = &result {
            warn!(storage_key = key, error = %e, "Pair-Verify failed");
        }
        result
    }
}
