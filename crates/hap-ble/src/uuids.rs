//! Well-known GATT UUIDs of the HAP-BLE pairing service.

use uuid::Uuid;

/// Descriptor holding a characteristic's HAP instance id.
pub const CHARACTERISTIC_INSTANCE_ID_DESCRIPTOR: Uuid =
    Uuid::from_u128(0xDC46F0FE_81D2_4616_B5D9_6ABDD796939A);

/// Pairing service.
pub const PAIRING_SERVICE: Uuid = Uuid::from_u128(0x00000055_0000_1000_8000_0026BB765291);

/// Pair-Setup characteristic.
pub const PAIR_SETUP_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000004C_0000_1000_8000_0026BB765291);

/// Pair-Verify characteristic.
pub const PAIR_VERIFY_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000004E_0000_1000_8000_0026BB765291);

/// Pairing-Features characteristic.
pub const PAIRING_FEATURES_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000004F_0000_1000_8000_0026BB765291);
