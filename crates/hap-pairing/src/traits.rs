//! Transport seam between the pairing handshakes and the accessory.

use hap_core::error::Result;
use async_trait::async_trait;

/// Carries pairing messages to the accessory and returns its reply.
///
/// Each call is one request/response exchange; the handshakes never
/// overlap calls.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PairingTransport: Send + Sync {
    /// Exchange one Pair-Setup TLV message.
    async fn pair_setup(&mut self, request: &[u8]) -> Result<Vec<u8>>;

    /// Exchange one Pair-Verify TLV message.
    async fn pair_verify(&mut self, request: &[u8]) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hap_core::error::{Error, TransportError};

    mod mock_transport {
        use super::*;

        #[tokio::test]
        async fn mock_pair_setup_returns_configured_response() {
            let mut mock = MockPairingTransport::new();

            let expected_response = vec![0x06, 0x01, 0x02];
            let expected_clone = expected_response.clone();

            mock.expect_pair_setup().returning(move |_| {
                Box::pin({
                    let resp = expected_clone.clone();
                    async move { Ok(resp) }
                })
            });

            let result = mock.pair_setup(&[0x06, 0x01, 0x01]).await.unwrap();
            assert_eq!(result, expected_response);
        }

        #[tokio::test]
        async fn mock_pair_verify_surfaces_transport_error() {
            let mut mock = MockPairingTransport::new();
            mock.expect_pair_verify()
                .returning(|_| Box::pin(async { Err(TransportError::Timeout.into()) }));

            let result = mock.pair_verify(&[0x06, 0x01, 0x01]).await;
            assert!(matches!(result, Err(Error::Transport(TransportError::Timeout))));
        }
    }
}
