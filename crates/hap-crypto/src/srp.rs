//! SRP-6a implementation for HAP Pair-Setup.
//!
//! Uses 3072-bit prime (RFC 5054), generator g=5, SHA-512. Integers are
//! big-endian; values entering the transcript are left-padded to 384 bytes.

use std::sync::OnceLock;

use hap_core::error::PairingError;
use num_bigint::{BigUint, RandBigInt};
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Username used by every HAP Pair-Setup exchange.
pub const PAIR_SETUP_IDENTITY: &[u8] = b"Pair-Setup";

/// N size in bytes (3072 bits = 384 bytes).
pub const N_BYTES: usize = 384;

/// Bits of entropy in the controller's private value `a`.
const PRIVATE_KEY_BITS: u64 = 256;

/// RFC 5054 3072-bit prime N as hex string.
const RFC5054_N_3072: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08",
    "8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B",
    "302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9",
    "A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6",
    "49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8",
    "FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C",
    "180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D",
    "04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D",
    "B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226",
    "1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C",
    "BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC",
    "E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF"
);

const N_BE: [u8; N_BYTES] = decode_hex(RFC5054_N_3072);

const fn decode_hex(s: &str) -> [u8; N_BYTES] {
    const fn nibble(c: u8) -> u8 {
        match c {
            b'0'..=b'9' => c - b'0',
            b'A'..=b'F' => c - b'A' + 10,
            b'a'..=b'f' => c - b'a' + 10,
            _ => panic!("invalid hex digit in SRP prime"),
        }
    }

    let b = s.as_bytes();
    assert!(b.len() == 2 * N_BYTES);
    let mut out = [0u8; N_BYTES];
    let mut i = 0;
    while i < N_BYTES {
        out[i] = (nibble(b[2 * i]) << 4) | nibble(b[2 * i + 1]);
        i += 1;
    }
    out
}

/// SRP-6a group constants (3072-bit, RFC 5054).
#[derive(Debug)]
pub struct SrpGroup {
    /// Prime modulus N.
    pub n: BigUint,
    /// Generator g (always 5).
    pub g: BigUint,
    /// Multiplier k = H(N || PAD(g)).
    pub k: BigUint,
}

/// The fixed HAP group, built once and shared read-only.
pub fn group() -> &'static SrpGroup {
    static GROUP: OnceLock<SrpGroup> = OnceLock::new();
    GROUP.get_or_init(|| {
        let n = BigUint::from_bytes_be(&N_BE);
        let g = BigUint::from(5u32);
        let k = compute_k(&n, &g);
        SrpGroup { n, g, k }
    })
}

/// Pad BigUint to N_BYTES with leading zeros.
pub fn pad_to_n(value: &BigUint) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    if bytes.len() >= N_BYTES {
        bytes[bytes.len() - N_BYTES..].to_vec()
    } else {
        let mut padded = vec![0u8; N_BYTES - bytes.len()];
        padded.extend_from_slice(&bytes);
        padded
    }
}

/// Compute k = SHA512(N || PAD(g)).
pub fn compute_k(n: &BigUint, g: &BigUint) -> BigUint {
    let mut hasher = Sha512::new();
    hasher.update(pad_to_n(n));
    hasher.update(pad_to_n(g));
    BigUint::from_bytes_be(&hasher.finalize())
}

/// Compute u = SHA512(PAD(A) || PAD(B)).
pub fn compute_u(a_pub: &BigUint, b_pub: &BigUint) -> BigUint {
    let mut hasher = Sha512::new();
    hasher.update(pad_to_n(a_pub));
    hasher.update(pad_to_n(b_pub));
    BigUint::from_bytes_be(&hasher.finalize())
}

/// x = SHA512(salt || SHA512(identity || ":" || password)).
pub fn derive_private_key(salt: &[u8], identity: &[u8], password: &[u8]) -> BigUint {
    let mut hasher = Sha512::new();
    hasher.update(identity);
    hasher.update(b":");
    hasher.update(password);
    let inner_hash = hasher.finalize();

    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(inner_hash);
    BigUint::from_bytes_be(&hasher.finalize())
}

/// A = g^a mod N.
pub fn compute_public_key(a: &BigUint) -> BigUint {
    let group = group();
    group.g.modpow(a, &group.n)
}

/// S = (B - k * g^x)^(a + u*x) mod N.
///
/// Fails if B is a multiple of N or the scrambling parameter is zero.
pub fn compute_shared_secret(
    b_pub: &BigUint,
    a: &BigUint,
    u: &BigUint,
    x: &BigUint,
) -> Result<BigUint, PairingError> {
    let group = group();

    if (b_pub % &group.n) == BigUint::ZERO || *u == BigUint::ZERO {
        return Err(PairingError::InvalidAccessoryPublicKey);
    }

    let g_x = group.g.modpow(x, &group.n);
    let k_gx = (&group.k * &g_x) % &group.n;
    let b_red = b_pub % &group.n;

    // B - k*g^x may underflow before reduction
    let base = if b_red >= k_gx {
        &b_red - &k_gx
    } else {
        &b_red + &group.n - &k_gx
    };

    let exponent = a + u * x;
    Ok(base.modpow(&exponent, &group.n))
}

/// K = SHA512(PAD(S)).
pub fn compute_session_key(s: &BigUint) -> Vec<u8> {
    Sha512::digest(pad_to_n(s)).to_vec()
}

/// M1 = H(H(N) XOR H(g) || H(I) || salt || PAD(A) || PAD(B) || K).
pub fn compute_proof_m1(
    identity: &[u8],
    salt: &[u8],
    a_pub: &BigUint,
    b_pub: &BigUint,
    session_key: &[u8],
) -> Vec<u8> {
    let group = group();

    let h_n = Sha512::digest(pad_to_n(&group.n));
    // H(g) is taken over the unpadded generator byte, unlike k.
    let h_g = Sha512::digest(group.g.to_bytes_be());

    let mut xor_result = [0u8; 64];
    for (out, (n, g)) in xor_result.iter_mut().zip(h_n.iter().zip(h_g.iter())) {
        *out = n ^ g;
    }

    let mut hasher = Sha512::new();
    hasher.update(xor_result);
    hasher.update(Sha512::digest(identity));
    hasher.update(salt);
    hasher.update(pad_to_n(a_pub));
    hasher.update(pad_to_n(b_pub));
    hasher.update(session_key);
    hasher.finalize().to_vec()
}

/// M2 = H(PAD(A) || M1 || K).
pub fn compute_proof_m2(a_pub: &BigUint, m1: &[u8], session_key: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(pad_to_n(a_pub));
    hasher.update(m1);
    hasher.update(session_key);
    hasher.finalize().to_vec()
}

/// Constant-time proof comparison.
pub fn verify_proof(received: &[u8], expected: &[u8]) -> bool {
    received.ct_eq(expected).into()
}

/// Uniformly random integer of at most `n_bits` bits, reduced into [0, N).
pub fn random_int(n_bits: u64) -> BigUint {
    OsRng.gen_biguint(n_bits) % &group().n
}

/// Accessory challenge from Pair-Setup M2.
#[derive(Debug, Clone)]
pub struct SrpChallenge {
    pub salt: [u8; 16],
    pub server_public_key: Vec<u8>,
}

/// Outputs of processing a challenge.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SrpProof {
    /// M1, sent to the accessory in M3.
    pub client_proof: Vec<u8>,
    /// K, the SRP session key.
    pub session_key: Vec<u8>,
    /// M2 the accessory must return in M4.
    pub expected_server_proof: Vec<u8>,
}

impl SrpProof {
    /// Check the accessory's M2 in constant time.
    pub fn verify_server_proof(&self, received: &[u8]) -> Result<(), PairingError> {
        if verify_proof(received, &self.expected_server_proof) {
            Ok(())
        } else {
            Err(PairingError::ProofMismatch)
        }
    }
}

/// Controller-side SRP state for one Pair-Setup attempt.
///
/// The private value is drawn fresh per instance and cleared on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SrpClient {
    identity: Vec<u8>,
    password: Vec<u8>,
    private_key: Vec<u8>,
    #[zeroize(skip)]
    public_key: BigUint,
}

impl SrpClient {
    /// Create new SRP client with identity and password.
    ///
    /// For HAP, identity is "Pair-Setup" and password is the setup code.
    pub fn new(identity: &[u8], password: &[u8]) -> Self {
        let a = random_int(PRIVATE_KEY_BITS);
        Self::with_private_key(identity, password, &a.to_bytes_be())
    }

    /// Create SRP client with a specific private key.
    pub fn with_private_key(identity: &[u8], password: &[u8], private_key: &[u8]) -> Self {
        let a = BigUint::from_bytes_be(private_key);
        let public_key = compute_public_key(&a);

        Self {
            identity: identity.to_vec(),
            password: password.to_vec(),
            private_key: private_key.to_vec(),
            public_key,
        }
    }

    /// Get client public key A (384 bytes for 3072-bit).
    pub fn public_key(&self) -> Vec<u8> {
        pad_to_n(&self.public_key)
    }

    /// Process the accessory's challenge into M1, K and the expected M2.
    pub fn process_challenge(&self, challenge: &SrpChallenge) -> Result<SrpProof, PairingError> {
        let b_pub = BigUint::from_bytes_be(&challenge.server_public_key);
        let a = BigUint::from_bytes_be(&self.private_key);

        let u = compute_u(&self.public_key, &b_pub);
        let x = derive_private_key(&challenge.salt, &self.identity, &self.password);
        let s = compute_shared_secret(&b_pub, &a, &u, &x)?;
        let session_key = compute_session_key(&s);

        let client_proof = compute_proof_m1(
            &self.identity,
            &challenge.salt,
            &self.public_key,
            &b_pub,
            &session_key,
        );
        let expected_server_proof = compute_proof_m2(&self.public_key, &client_proof, &session_key);

        debug!(
            m1_prefix = %hex_prefix(&client_proof),
            "SRP challenge processed"
        );

        Ok(SrpProof {
            client_proof,
            session_key,
            expected_server_proof,
        })
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}
