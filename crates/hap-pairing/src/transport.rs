//! Pairing messages carried over the HAP-BLE pairing characteristics.

use async_trait::async_trait;
use hap_ble::{CharacteristicTransport, HapCharacteristic, RetryPolicy};
use hap_core::error::Result;
use tracing::trace;

use crate::traits::PairingTransport;

/// [`PairingTransport`] over the Pair-Setup and Pair-Verify characteristics.
///
/// `setup` and `verify` are links to the characteristics identified by
/// [`hap_ble::uuids::PAIR_SETUP_CHARACTERISTIC`] and
/// [`hap_ble::uuids::PAIR_VERIFY_CHARACTERISTIC`]. Every message is a
/// characteristic write whose response carries the accessory's reply.
pub struct BlePairingTransport<T> {
    setup: HapCharacteristic<T>,
    verify: HapCharacteristic<T>,
}

impl<T: CharacteristicTransport> BlePairingTransport<T> {
    pub fn new(setup: T, verify: T) -> Self {
        Self {
            setup: HapCharacteristic::new(setup),
            verify: HapCharacteristic::new(verify),
        }
    }

    /// Use `policy` for both characteristics.
    pub fn with_retry_policy(self, policy: RetryPolicy) -> Self {
        Self {
            setup: self.setup.with_retry_policy(policy.clone()),
            verify: self.verify.with_retry_policy(policy),
        }
    }

    pub fn setup_characteristic(&self) -> &HapCharacteristic<T> {
        &self.setup
    }

    pub fn verify_characteristic(&self) -> &HapCharacteristic<T> {
        &self.verify
    }
}

#[async_trait]
impl<T: CharacteristicTransport> PairingTransport for BlePairingTransport<T> {
    async fn pair_setup(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        trace!(len = request.len(), "Pair-Setup write");
        self.setup.write_tlv(request).await
    }

    async fn pair_verify(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        trace!(len = request.len(), "Pair-Verify write");
        self.verify.write_tlv(request).await
    }
}
