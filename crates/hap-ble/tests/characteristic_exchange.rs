//! Characteristic requests against an in-memory accessory link.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hap_ble::pdu::RESPONSE_CONTROL_FIELD;
use hap_ble::uuids::CHARACTERISTIC_INSTANCE_ID_DESCRIPTOR;
use hap_ble::{CharacteristicTransport, HapCharacteristic, RetryPolicy};
use hap_core::error::{Error, PduError, Result, TransportError};
use hap_core::registry::{OpCode, ParamType};
use hap_crypto::tlv;
use uuid::Uuid;

/// Accessory side of one characteristic.
///
/// Requests are answered with canned bodies, echoing the request's tid.
/// A number of leading writes can be made to fail with a disconnect.
struct Link {
    instance_id: u16,
    status: u8,
    bodies: Mutex<VecDeque<Vec<u8>>>,
    pending: Mutex<Option<Vec<u8>>>,
    requests: Mutex<Vec<Vec<u8>>>,
    drop_writes: AtomicU32,
    reconnects: AtomicU32,
}

impl Link {
    fn new(instance_id: u16, bodies: Vec<Vec<u8>>) -> Self {
        Self {
            instance_id,
            status: 0,
            bodies: Mutex::new(bodies.into()),
            pending: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            drop_writes: AtomicU32::new(0),
            reconnects: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CharacteristicTransport for Link {
    async fn write(&self, data: &[u8], _require_ack: bool) -> Result<()> {
        self.requests.lock().unwrap().push(data.to_vec());
        if self.drop_writes.load(Ordering::SeqCst) > 0 {
            self.drop_writes.fetch_sub(1, Ordering::SeqCst);
            return Err(TransportError::Disconnected.into());
        }

        let body = self.bodies.lock().unwrap().pop_front().unwrap_or_default();
        let mut response = vec![RESPONSE_CONTROL_FIELD, data[2], self.status];
        response.extend_from_slice(&(body.len() as u16).to_le_bytes());
        response.extend_from_slice(&body);
        *self.pending.lock().unwrap() = Some(response);
        Ok(())
    }

    async fn read(&self) -> Result<Vec<u8>> {
        self.pending
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::Other("nothing to read".into()).into())
    }

    async fn read_descriptor(&self, uuid: Uuid) -> Result<Vec<u8>> {
        if uuid != CHARACTERISTIC_INSTANCE_ID_DESCRIPTOR {
            return Err(TransportError::DescriptorNotFound(uuid).into());
        }
        Ok(self.instance_id.to_le_bytes().to_vec())
    }

    async fn reconnect(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::builder().wait(Duration::ZERO).build()
}

#[tokio::test]
async fn signature_read_then_write() {
    let signature = [
        tlv::encode_to_vec(ParamType::SERVICE_INSTANCE_ID, &[0x10, 0x00]),
        tlv::encode_to_vec(ParamType::USER_DESCRIPTION, b"Pair Setup"),
    ]
    .concat();
    let reply = tlv::encode_to_vec(ParamType::VALUE, &[0x06, 0x01, 0x02]);
    let link = Link::new(0x0042, vec![signature, reply]);

    let mut characteristic = HapCharacteristic::new(link);
    let params = characteristic.signature_read().await.unwrap();
    assert_eq!(params["Service_Instance_ID"].as_u16(), Some(0x10));
    assert_eq!(params["GATT_User_Description_Descriptor"].as_str(), Some("Pair Setup"));

    let value = characteristic.write_tlv(&[0x06, 0x01, 0x01]).await.unwrap();
    assert_eq!(value, vec![0x06, 0x01, 0x02]);

    let requests = characteristic.transport().requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0][1], OpCode::CharacteristicSignatureRead.code());
    assert_eq!(&requests[0][3..5], &[0x42, 0x00]);
    assert_eq!(requests[1][1], OpCode::CharacteristicWrite.code());
}

#[tokio::test]
async fn disconnect_is_retried_with_same_transaction_id() {
    let reply = tlv::encode_to_vec(ParamType::VALUE, &[0x01]);
    let link = Link::new(7, vec![reply]);
    link.drop_writes.store(1, Ordering::SeqCst);

    let mut characteristic = HapCharacteristic::new(link).with_retry_policy(fast_retry());
    assert_eq!(characteristic.write_tlv(&[0xFF]).await.unwrap(), vec![0x01]);

    let link = characteristic.transport();
    assert_eq!(link.reconnects.load(Ordering::SeqCst), 1);
    let requests = link.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);
}

#[tokio::test]
async fn persistent_disconnect_surfaces_transport_error() {
    let link = Link::new(7, vec![]);
    link.drop_writes.store(10, Ordering::SeqCst);

    let mut characteristic = HapCharacteristic::new(link).with_retry_policy(fast_retry());
    let err = characteristic.signature_read().await.unwrap_err();
    assert!(err.is_transient());

    // Default policy: two attempts, one reconnect.
    let link = characteristic.transport();
    assert_eq!(link.requests.lock().unwrap().len(), 2);
    assert_eq!(link.reconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn error_status_is_a_protocol_error() {
    let mut link = Link::new(7, vec![]);
    link.status = 5;

    let mut characteristic = HapCharacteristic::new(link).with_retry_policy(fast_retry());
    match characteristic.signature_read().await {
        Err(Error::Pdu(PduError::Protocol { name, message, .. })) => {
            assert_eq!(name, "Insufficient Authentication");
            assert_eq!(
                message,
                "Characteristic access required a secure session to be established."
            );
        }
        other => panic!("unexpected {:?}", other.map(|p| p.len())),
    }
    assert_eq!(characteristic.transport().reconnects.load(Ordering::SeqCst), 0);
}
