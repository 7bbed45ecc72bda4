//! The GATT link a HAP characteristic is accessed through.

use async_trait::async_trait;
use hap_core::error::Result;
use uuid::Uuid;

/// Raw access to one GATT characteristic of a connected accessory.
///
/// Implemented by the embedding application on top of its Bluetooth stack.
/// Link failures must surface as `Error::Transport` so callers can tell them
/// apart from protocol failures.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait CharacteristicTransport: Send + Sync {
    /// Write a PDU to the characteristic.
    async fn write(&self, data: &[u8], require_ack: bool) -> Result<()>;

    /// Read the characteristic value (the response PDU).
    async fn read(&self) -> Result<Vec<u8>>;

    /// Read a descriptor of the characteristic.
    async fn read_descriptor(&self, uuid: Uuid) -> Result<Vec<u8>>;

    /// Re-establish the link after a failure.
    async fn reconnect(&self) -> Result<()>;
}

#[async_trait]
impl<T: CharacteristicTransport + ?Sized> CharacteristicTransport for std::sync::Arc<T> {
    async fn write(&self, data: &[u8], require_ack: bool) -> Result<()> {
        (**self).write(data, require_ack).await
    }

    async fn read(&self) -> Result<Vec<u8>> {
        (**self).read().await
    }

    async fn read_descriptor(&self, uuid: Uuid) -> Result<Vec<u8>> {
        (**self).read_descriptor(uuid).await
    }

    async fn reconnect(&self) -> Result<()> {
        (**self).reconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hap_core::error::{Error, TransportError};
    use std::sync::Arc;

    mod mock_transport {
        use super::*;

        #[tokio::test]
        async fn mock_read_returns_configured_response() {
            let mut mock = MockCharacteristicTransport::new();
            mock.expect_read()
                .returning(|| Box::pin(async { Ok(vec![0x02, 0x10, 0x00]) }));

            assert_eq!(mock.read().await.unwrap(), vec![0x02, 0x10, 0x00]);
        }

        #[tokio::test]
        async fn mock_write_reports_disconnect() {
            let mut mock = MockCharacteristicTransport::new();
            mock.expect_write()
                .returning(|_, _| Box::pin(async { Err(TransportError::Disconnected.into()) }));

            let err = mock.write(&[0x00], true).await.unwrap_err();
            assert!(err.is_transient());
            assert!(matches!(err, Error::Transport(TransportError::Disconnected)));
        }

        #[tokio::test]
        async fn arc_forwards_to_inner() {
            let mut mock = MockCharacteristicTransport::new();
            mock.expect_read_descriptor()
                .withf(|uuid| *uuid == crate::uuids::CHARACTERISTIC_INSTANCE_ID_DESCRIPTOR)
                .times(1)
                .returning(|_| Box::pin(async { Ok(vec![0x22, 0x00]) }));

            let shared = Arc::new(mock);
            let value = shared
                .read_descriptor(crate::uuids::CHARACTERISTIC_INSTANCE_ID_DESCRIPTOR)
                .await
                .unwrap();
            assert_eq!(value, vec![0x22, 0x00]);
        }
    }
}
