//! A HAP characteristic reached through a GATT transport.

use hap_core::error::{ParseError, Result};
use hap_core::registry::{OpCode, ParamType};
use hap_crypto::tlv;
use tracing::{debug, trace};

use crate::pdu::{self, ParamMap, PduRequestHeader, PduResponse};
use crate::retry::RetryPolicy;
use crate::traits::CharacteristicTransport;
use crate::uuids::CHARACTERISTIC_INSTANCE_ID_DESCRIPTOR;

const VALUE_PARAM: &str = "Value";

/// HAP-BLE access to one characteristic.
///
/// The instance id is read from the characteristic's descriptor on first use
/// and cached. Every request is a write of the PDU followed by a read of the
/// response, retried as a unit according to the [`RetryPolicy`].
pub struct HapCharacteristic<T> {
    transport: T,
    retry: RetryPolicy,
    instance_id: Option<u16>,
}

impl<T: CharacteristicTransport> HapCharacteristic<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            instance_id: None,
        }
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The characteristic instance id, read from the descriptor if not cached.
    pub async fn instance_id(&mut self) -> Result<u16> {
        if let Some(cid) = self.instance_id {
            return Ok(cid);
        }

        let transport = &self.transport;
        let raw = self
            .retry
            .run(transport, move || async move {
                transport
                    .read_descriptor(CHARACTERISTIC_INSTANCE_ID_DESCRIPTOR)
                    .await
            })
            .await?;

        let bytes: [u8; 2] = raw.as_slice().try_into().map_err(|_| {
            ParseError::InvalidValue(format!(
                "characteristic instance id must be 2 bytes, got {}",
                raw.len()
            ))
        })?;
        let cid = u16::from_le_bytes(bytes);
        debug!(cid, "Read characteristic instance id");

        self.instance_id = Some(cid);
        Ok(cid)
    }

    /// Perform a characteristic signature read.
    pub async fn signature_read(&mut self) -> Result<ParamMap> {
        let cid = self.instance_id().await?;
        let header = PduRequestHeader::for_instance(OpCode::CharacteristicSignatureRead, cid);
        let response = self.exchange(&pdu::build_request(&header)).await?;

        let params = pdu::parse_signature_response(&response, header.transaction_id())?;
        debug!(cid, params = params.len(), "Signature read complete");
        Ok(params)
    }

    /// Read the characteristic value.
    pub async fn read_value(&mut self) -> Result<Vec<u8>> {
        let cid = self.instance_id().await?;
        let header = PduRequestHeader::for_instance(OpCode::CharacteristicRead, cid);
        let response = self.exchange(&pdu::build_request(&header)).await?;

        value_param(PduResponse::parse(&response, header.transaction_id())?.params()?)
    }

    /// Write `value` and return the value the accessory sends back.
    ///
    /// The request body carries the value and the Return-Response flag, so
    /// the accessory answers in the response PDU's Value parameter.
    pub async fn write_tlv(&mut self, value: &[u8]) -> Result<Vec<u8>> {
        let cid = self.instance_id().await?;
        let header = PduRequestHeader::for_instance(OpCode::CharacteristicWrite, cid);

        let mut body = tlv::encode_to_vec(ParamType::VALUE, value);
        body.extend(tlv::encode_to_vec(ParamType::RETURN_RESPONSE, &[0x01]));
        let frame = pdu::build_body_request(&header, &body)?;

        let response = self.exchange(&frame).await?;
        value_param(PduResponse::parse(&response, header.transaction_id())?.params()?)
    }

    /// Write one framed request and read its response.
    ///
    /// The frame is built by the caller, so a retry resends identical bytes.
    async fn exchange(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let transport = &self.transport;
        trace!(len = frame.len(), "Sending PDU");
        self.retry
            .run(transport, move || async move {
                transport.write(frame, true).await?;
                transport.read().await
            })
            .await
    }
}

fn value_param(mut params: ParamMap) -> Result<Vec<u8>> {
    match params.remove(VALUE_PARAM) {
        Some(value) => value.as_bytes().map(<[u8]>::to_vec).ok_or_else(|| {
            ParseError::InvalidValue("Value parameter is not raw bytes".to_string()).into()
        }),
        None => Err(ParseError::InvalidValue("response has no Value parameter".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::RESPONSE_CONTROL_FIELD;
    use crate::traits::MockCharacteristicTransport;
    use hap_core::error::{Error, PduError, TransportError};
    use mockall::Sequence;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Frames written to the mock, in order.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<Vec<u8>>>>);

    impl Captured {
        fn push(&self, frame: &[u8]) {
            self.0.lock().unwrap().push(frame.to_vec());
        }

        fn frames(&self) -> Vec<Vec<u8>> {
            self.0.lock().unwrap().clone()
        }
    }

    fn response(tid: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![RESPONSE_CONTROL_FIELD, tid, 0x00];
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::builder().wait(Duration::ZERO).build()
    }

    /// Mock that answers the descriptor read and echoes each request's tid.
    fn echoing_transport(captured: Captured, body: Vec<u8>) -> MockCharacteristicTransport {
        let mut mock = MockCharacteristicTransport::new();
        mock.expect_read_descriptor()
            .returning(|_| Box::pin(async { Ok(vec![0x22, 0x00]) }));

        let writes = captured.clone();
        mock.expect_write().returning(move |data, _| {
            writes.push(data);
            Box::pin(async { Ok(()) })
        });

        mock.expect_read().returning(move || {
            let tid = captured.frames().last().map(|f| f[2]).unwrap_or(0);
            let resp = response(tid, &body);
            Box::pin(async move { Ok(resp) })
        });
        mock
    }

    mod instance_id {
        use super::*;

        #[tokio::test]
        async fn read_once_and_cached() {
            let mut mock = MockCharacteristicTransport::new();
            mock.expect_read_descriptor()
                .withf(|uuid| *uuid == CHARACTERISTIC_INSTANCE_ID_DESCRIPTOR)
                .times(1)
                .returning(|_| Box::pin(async { Ok(vec![0x34, 0x12]) }));

            let mut characteristic = HapCharacteristic::new(mock);
            assert_eq!(characteristic.instance_id().await.unwrap(), 0x1234);
            assert_eq!(characteristic.instance_id().await.unwrap(), 0x1234);
        }

        #[tokio::test]
        async fn wrong_length_rejected() {
            let mut mock = MockCharacteristicTransport::new();
            mock.expect_read_descriptor()
                .returning(|_| Box::pin(async { Ok(vec![0x01, 0x02, 0x03]) }));

            let mut characteristic = HapCharacteristic::new(mock);
            assert!(matches!(
                characteristic.instance_id().await,
                Err(Error::Parse(ParseError::InvalidValue(_)))
            ));
        }

        #[tokio::test]
        async fn descriptor_read_retried_after_reconnect() {
            let mut mock = MockCharacteristicTransport::new();
            let mut seq = Sequence::new();
            mock.expect_read_descriptor()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Box::pin(async { Err(TransportError::Disconnected.into()) }));
            mock.expect_reconnect()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|| Box::pin(async { Ok(()) }));
            mock.expect_read_descriptor()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Box::pin(async { Ok(vec![0x05, 0x00]) }));

            let mut characteristic = HapCharacteristic::new(mock).with_retry_policy(fast());
            assert_eq!(characteristic.instance_id().await.unwrap(), 5);
        }
    }

    mod signature_read {
        use super::*;

        #[tokio::test]
        async fn sends_signature_read_and_parses_response() {
            let captured = Captured::default();
            let body = tlv::encode_to_vec(ParamType::SERVICE_INSTANCE_ID, &[0x10, 0x00]);
            let mut characteristic = HapCharacteristic::new(echoing_transport(captured.clone(), body));

            let params = characteristic.signature_read().await.unwrap();
            assert_eq!(params["Service_Instance_ID"].as_u16(), Some(0x10));

            let frames = captured.frames();
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0][0], 0x00);
            assert_eq!(frames[0][1], OpCode::CharacteristicSignatureRead.code());
            assert_eq!(&frames[0][3..], &[0x22, 0x00]);
        }

        #[tokio::test]
        async fn mismatched_tid_rejected() {
            let mut mock = MockCharacteristicTransport::new();
            mock.expect_read_descriptor()
                .returning(|_| Box::pin(async { Ok(vec![0x22, 0x00]) }));
            let last_tid = Captured::default();
            let writes = last_tid.clone();
            mock.expect_write().returning(move |data, _| {
                writes.push(data);
                Box::pin(async { Ok(()) })
            });
            mock.expect_read().returning(move || {
                let tid = last_tid.frames()[0][2].wrapping_add(1);
                Box::pin(async move { Ok(vec![RESPONSE_CONTROL_FIELD, tid, 0x00]) })
            });

            let mut characteristic = HapCharacteristic::new(mock);
            assert!(matches!(
                characteristic.signature_read().await,
                Err(Error::Pdu(PduError::TransactionIdMismatch { .. }))
            ));
        }
    }

    mod write {
        use super::*;

        #[tokio::test]
        async fn body_carries_value_and_return_response() {
            let captured = Captured::default();
            let reply = tlv::encode_to_vec(ParamType::VALUE, &[0x06, 0x01, 0x02]);
            let mut characteristic =
                HapCharacteristic::new(echoing_transport(captured.clone(), reply));

            let value = characteristic.write_tlv(&[0x06, 0x01, 0x01]).await.unwrap();
            assert_eq!(value, vec![0x06, 0x01, 0x02]);

            let frame = &captured.frames()[0];
            assert_eq!(frame[1], OpCode::CharacteristicWrite.code());
            assert_eq!(&frame[3..5], &[0x22, 0x00]);
            let body_len = u16::from_le_bytes([frame[5], frame[6]]) as usize;
            let body = &frame[7..];
            assert_eq!(body.len(), body_len);
            assert_eq!(body, &[0x01, 0x03, 0x06, 0x01, 0x01, 0x09, 0x01, 0x01]);
        }

        #[tokio::test]
        async fn retry_resends_identical_frame() {
            let captured = Captured::default();
            let mut mock = MockCharacteristicTransport::new();
            mock.expect_read_descriptor()
                .returning(|_| Box::pin(async { Ok(vec![0x22, 0x00]) }));
            mock.expect_reconnect()
                .times(1)
                .returning(|| Box::pin(async { Ok(()) }));

            let writes = captured.clone();
            mock.expect_write().returning(move |data, _| {
                writes.push(data);
                let first = writes.frames().len() == 1;
                Box::pin(async move {
                    if first {
                        Err(TransportError::Disconnected.into())
                    } else {
                        Ok(())
                    }
                })
            });

            let reads = captured.clone();
            mock.expect_read().times(1).returning(move || {
                let tid = reads.frames()[0][2];
                let resp = response(tid, &tlv::encode_to_vec(ParamType::VALUE, &[0xAA]));
                Box::pin(async move { Ok(resp) })
            });

            let mut characteristic = HapCharacteristic::new(mock).with_retry_policy(fast());
            assert_eq!(characteristic.write_tlv(&[0x01]).await.unwrap(), vec![0xAA]);

            let frames = captured.frames();
            assert_eq!(frames.len(), 2);
            assert_eq!(frames[0], frames[1]);
        }

        #[tokio::test]
        async fn missing_value_parameter_fails() {
            let captured = Captured::default();
            let mut characteristic = HapCharacteristic::new(echoing_transport(captured, Vec::new()));
            assert!(matches!(
                characteristic.write_tlv(&[0x01]).await,
                Err(Error::Parse(ParseError::InvalidValue(_)))
            ));
        }

        #[tokio::test]
        async fn shared_transport_works() {
            let captured = Captured::default();
            let reply = tlv::encode_to_vec(ParamType::VALUE, &[0x42]);
            let shared = Arc::new(echoing_transport(captured, reply));
            let mut characteristic = HapCharacteristic::new(Arc::clone(&shared));
            assert_eq!(characteristic.read_value().await.unwrap(), vec![0x42]);
        }
    }
}
