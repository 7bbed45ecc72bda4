//! Durable storage for long-term pairing material.
//!
//! A [`KeyStore`] holds named byte fields per controller identity. Each field
//! write is atomic on its own; multi-field updates for one identity are made
//! while holding that identity's lock so concurrent pairings cannot
//! interleave them.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hap_core::error::{PairingError, Result, StorageError};
use hap_crypto::ed25519::IdentityKeyPair;
use parking_lot::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::controller::{AccessoryIdentity, ControllerIdentity, LongTermIdentity};

/// Field names used by the pairing layer.
pub mod fields {
    /// Controller Ed25519 seed.
    pub const LTSK: &str = "ltsk";
    /// Controller pairing identifier.
    pub const PAIRING_ID: &str = "pairing_id";
    pub const ACCESSORY_PAIRING_ID: &str = "accessory_pairing_id";
    pub const ACCESSORY_LTPK: &str = "accessory_ltpk";
}

/// Byte-field storage keyed by identity.
pub trait KeyStore: Send + Sync {
    /// Replace one field atomically.
    fn store(&self, identity: &str, field: &str, value: &[u8]) -> Result<()>;

    /// Read one field. Missing fields are [`StorageError::NotFound`].
    fn load(&self, identity: &str, field: &str) -> Result<Vec<u8>>;

    /// The lock guarding multi-field updates for `identity`.
    fn identity_lock(&self, identity: &str) -> Arc<Mutex<()>>;
}

/// Lazily created per-identity locks.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    pub fn get(&self, identity: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(identity.to_string())
            .or_default()
            .clone()
    }
}

/// Key store backed by one directory per identity and one hex file per field.
#[derive(Debug)]
pub struct FileKeyStore {
    root: PathBuf,
    locks: IdentityLocks,
}

impl FileKeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: IdentityLocks::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn field_path(&self, identity: &str, field: &str) -> PathBuf {
        self.root.join(hex::encode(identity)).join(field)
    }
}

/// Write a file readable only by its owner.
///
/// A leftover file from an interrupted write is removed first, since the
/// creation mode is only applied to new files.
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

impl KeyStore for FileKeyStore {
    fn store(&self, identity: &str, field: &str, value: &[u8]) -> Result<()> {
        let path = self.field_path(identity, field);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(StorageError::Io)?;
        }

        // Write beside the target and rename so readers never see a partial field.
        let tmp = path.with_extension("tmp");
        write_private(&tmp, hex::encode(value).as_bytes()).map_err(StorageError::Io)?;
        fs::rename(&tmp, &path).map_err(StorageError::Io)?;

        debug!(identity, field, path = %path.display(), "Stored key field");
        Ok(())
    }

    fn load(&self, identity: &str, field: &str) -> Result<Vec<u8>> {
        let path = self.field_path(identity, field);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => Zeroizing::new(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    identity: identity.to_string(),
                    field: field.to_string(),
                }
                .into())
            }
            Err(e) => return Err(StorageError::Io(e).into()),
        };

        hex::decode(contents.trim()).map_err(|e| {
            StorageError::Corrupt {
                field: field.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn identity_lock(&self, identity: &str) -> Arc<Mutex<()>> {
        self.locks.get(identity)
    }
}

/// In-process key store that also counts writes per field.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    fields: Mutex<HashMap<(String, String), Vec<u8>>>,
    writes: Mutex<HashMap<(String, String), usize>>,
    locks: IdentityLocks,
}

impl MemoryKeyStore {
    /// How many times `field` has been written for `identity`.
    pub fn write_count(&self, identity: &str, field: &str) -> usize {
        self.writes
            .lock()
            .get(&(identity.to_string(), field.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl KeyStore for MemoryKeyStore {
    fn store(&self, identity: &str, field: &str, value: &[u8]) -> Result<()> {
        let key = (identity.to_string(), field.to_string());
        self.fields.lock().insert(key.clone(), value.to_vec());
        *self.writes.lock().entry(key).or_insert(0) += 1;
        Ok(())
    }

    fn load(&self, identity: &str, field: &str) -> Result<Vec<u8>> {
        self.fields
            .lock()
            .get(&(identity.to_string(), field.to_string()))
            .cloned()
            .ok_or_else(|| {
                StorageError::NotFound {
                    identity: identity.to_string(),
                    field: field.to_string(),
                }
                .into()
            })
    }

    fn identity_lock(&self, identity: &str) -> Arc<Mutex<()>> {
        self.locks.get(identity)
    }
}

/// Load the controller identity for `identity`, generating and storing one
/// if none exists yet.
///
/// An explicit `pairing_id` only applies when a new identity is generated.
pub fn load_or_generate_controller<S: KeyStore + ?Sized>(
    store: &S,
    identity: &str,
    pairing_id: Option<&str>,
) -> Result<ControllerIdentity> {
    let lock = store.identity_lock(identity);
    let _guard = lock.lock();

    match load_controller(store, identity) {
        Ok(controller) => return Ok(controller),
        Err(hap_core::Error::Storage(StorageError::NotFound { .. })) => {}
        Err(e) => return Err(e),
    }

    let keypair = IdentityKeyPair::generate();
    let controller = match pairing_id {
        Some(id) => ControllerIdentity::with_id(keypair, id),
        None => ControllerIdentity::from_keypair(keypair),
    };
    let seed = Zeroizing::new(controller.keypair().seed());
    store.store(identity, fields::LTSK, seed.as_slice())?;
    store.store(identity, fields::PAIRING_ID, controller.pairing_id().as_bytes())?;

    info!(
        identity,
        pairing_id = controller.pairing_id(),
        "Generated controller identity"
    );
    Ok(controller)
}

/// Load a previously stored controller identity.
///
/// Both fields missing is [`StorageError::NotFound`]; exactly one missing is
/// [`StorageError::Corrupt`], so a half-written identity is never replaced
/// by a freshly generated one.
pub fn load_controller<S: KeyStore + ?Sized>(store: &S, identity: &str) -> Result<ControllerIdentity> {
    let seed = optional(store.load(identity, fields::LTSK))?.map(Zeroizing::new);
    let pairing_id = optional(store.load(identity, fields::PAIRING_ID))?;
    let (seed, pairing_id) = match (seed, pairing_id) {
        (Some(seed), Some(pairing_id)) => (seed, pairing_id),
        (None, None) => {
            return Err(StorageError::NotFound {
                identity: identity.to_string(),
                field: fields::LTSK.to_string(),
            }
            .into())
        }
        (Some(_), None) => return Err(missing_half(fields::PAIRING_ID, fields::LTSK)),
        (None, Some(_)) => return Err(missing_half(fields::LTSK, fields::PAIRING_ID)),
    };

    let seed: &[u8; 32] = seed.as_slice().try_into().map_err(|_| StorageError::Corrupt {
        field: fields::LTSK.to_string(),
        reason: format!("seed must be 32 bytes, got {}", seed.len()),
    })?;
    let pairing_id = utf8_field(pairing_id, fields::PAIRING_ID)?;

    Ok(ControllerIdentity::with_id(
        IdentityKeyPair::from_seed(seed),
        pairing_id,
    ))
}

/// Persist the accessory learned in Pair-Setup M6.
pub fn save_accessory<S: KeyStore + ?Sized>(
    store: &S,
    identity: &str,
    accessory: &AccessoryIdentity,
) -> Result<()> {
    let lock = store.identity_lock(identity);
    let _guard = lock.lock();

    store.store(
        identity,
        fields::ACCESSORY_PAIRING_ID,
        accessory.pairing_id.as_bytes(),
    )?;
    store.store(
        identity,
        fields::ACCESSORY_LTPK,
        &accessory.long_term_public_key,
    )?;

    info!(identity, accessory_id = %accessory.pairing_id, "Stored accessory identity");
    Ok(())
}

/// Load both sides of a completed pairing.
///
/// Any missing field means the identity was never paired.
pub fn load_long_term<S: KeyStore + ?Sized>(store: &S, identity: &str) -> Result<LongTermIdentity> {
    let lock = store.identity_lock(identity);
    let _guard = lock.lock();

    let not_paired = |e: hap_core::Error| match e {
        hap_core::Error::Storage(StorageError::NotFound { .. }) => {
            PairingError::NotPaired(identity.to_string()).into()
        }
        other => other,
    };

    let controller = load_controller(store, identity).map_err(not_paired)?;
    let accessory_id = store
        .load(identity, fields::ACCESSORY_PAIRING_ID)
        .map_err(not_paired)?;
    let accessory_ltpk = store
        .load(identity, fields::ACCESSORY_LTPK)
        .map_err(not_paired)?;
    let accessory = AccessoryIdentity::from_raw(&accessory_id, &accessory_ltpk)?;

    Ok(LongTermIdentity {
        controller,
        accessory,
    })
}

fn optional(loaded: Result<Vec<u8>>) -> Result<Option<Vec<u8>>> {
    match loaded {
        Ok(value) => Ok(Some(value)),
        Err(hap_core::Error::Storage(StorageError::NotFound { .. })) => Ok(None),
        Err(e) => Err(e),
    }
}

fn missing_half(missing: &str, present: &str) -> hap_core::Error {
    StorageError::Corrupt {
        field: missing.to_string(),
        reason: format!("missing while {} is stored", present),
    }
    .into()
}

fn utf8_field(bytes: Vec<u8>, field: &str) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| {
        StorageError::Corrupt {
            field: field.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
