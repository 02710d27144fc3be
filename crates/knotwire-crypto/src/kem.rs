//! ML-KEM key encapsulation with runtime parameter-set selection
//!
//! The parameter set is chosen once at device creation and carried on every
//! PQ public record so that peers can reconstruct the right key type. Keygen
//! and encapsulation randomness come from the caller's RNG.

use base64::{engine::general_purpose::STANDARD, Engine};
use libcrux_ml_kem::{mlkem1024, mlkem512, mlkem768};
use rand_core::{CryptoRng, RngCore};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

/// ML-KEM shared secret size (32 bytes for every parameter set)
pub const SHARED_SECRET_SIZE: usize = 32;

/// Keygen randomness size (d ‖ z seeds)
const KEYGEN_RANDOMNESS: usize = 64;

/// Encapsulation randomness size
const ENCAPS_RANDOMNESS: usize = 32;

/// ML-KEM security level, fixed per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KemParameterSet {
    /// ML-KEM-512 (default)
    MlKem512,
    /// ML-KEM-768
    MlKem768,
    /// ML-KEM-1024
    MlKem1024,
}

impl KemParameterSet {
    /// Stable name carried on wire records.
    pub fn name(self) -> &'static str {
        match self {
            Self::MlKem512 => "ml_kem_512",
            Self::MlKem768 => "ml_kem_768",
            Self::MlKem1024 => "ml_kem_1024",
        }
    }

    /// Parse a wire name back into a parameter set.
    ///
    /// # Errors
    ///
    /// - `UnsupportedPqParameter` if the name is unknown
    pub fn from_name(name: &str) -> Result<Self, CryptoError> {
        match name {
            "ml_kem_512" => Ok(Self::MlKem512),
            "ml_kem_768" => Ok(Self::MlKem768),
            "ml_kem_1024" => Ok(Self::MlKem1024),
            _ => Err(CryptoError::UnsupportedPqParameter { name: name.to_string() }),
        }
    }

    /// Encoded public (encapsulation) key length.
    pub fn public_key_len(self) -> usize {
        match self {
            Self::MlKem512 => 800,
            Self::MlKem768 => 1184,
            Self::MlKem1024 => 1568,
        }
    }

    /// Encoded ciphertext length.
    pub fn ciphertext_len(self) -> usize {
        match self {
            Self::MlKem512 => 768,
            Self::MlKem768 => 1088,
            Self::MlKem1024 => 1568,
        }
    }

    /// Encoded private (decapsulation) key length.
    pub fn private_key_len(self) -> usize {
        match self {
            Self::MlKem512 => 1632,
            Self::MlKem768 => 2400,
            Self::MlKem1024 => 3168,
        }
    }
}

impl Default for KemParameterSet {
    fn default() -> Self {
        Self::MlKem512
    }
}

impl std::fmt::Display for KemParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An ML-KEM public (encapsulation) key with its parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KemPublicKey {
    parameter_set: KemParameterSet,
    bytes: Vec<u8>,
}

impl KemPublicKey {
    /// Wrap encoded public bytes, checking the length for the parameter set.
    ///
    /// # Errors
    ///
    /// - `InvalidPqPublic` on a length mismatch
    pub fn new(parameter_set: KemParameterSet, bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != parameter_set.public_key_len() {
            return Err(CryptoError::InvalidPqPublic {
                expected: parameter_set.public_key_len(),
                actual: bytes.len(),
            });
        }
        Ok(Self { parameter_set, bytes })
    }

    /// The key's parameter set.
    pub fn parameter_set(&self) -> KemParameterSet {
        self.parameter_set
    }

    /// Encoded public bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key id: base64 of the encoded public bytes.
    pub fn key_id(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Encapsulate to this key.
    ///
    /// Returns `(ciphertext, shared_secret)`.
    pub fn encapsulate(
        &self,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> (Vec<u8>, [u8; SHARED_SECRET_SIZE]) {
        let mut randomness = [0u8; ENCAPS_RANDOMNESS];
        rng.fill_bytes(&mut randomness);

        // Length was validated at construction, so the conversions hold.
        match self.parameter_set {
            KemParameterSet::MlKem512 => {
                let pk = mlkem512::MlKem512PublicKey::from(to_array::<800>(&self.bytes));
                let (ct, ss) = mlkem512::encapsulate(&pk, randomness);
                (ct.as_ref().to_vec(), ss)
            },
            KemParameterSet::MlKem768 => {
                let pk = mlkem768::MlKem768PublicKey::from(to_array::<1184>(&self.bytes));
                let (ct, ss) = mlkem768::encapsulate(&pk, randomness);
                (ct.as_ref().to_vec(), ss)
            },
            KemParameterSet::MlKem1024 => {
                let pk = mlkem1024::MlKem1024PublicKey::from(to_array::<1568>(&self.bytes));
                let (ct, ss) = mlkem1024::encapsulate(&pk, randomness);
                (ct.as_ref().to_vec(), ss)
            },
        }
    }
}

/// An ML-KEM key pair. The private half is zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct KemKeyPair {
    #[zeroize(skip)]
    parameter_set: KemParameterSet,
    #[zeroize(skip)]
    public: Vec<u8>,
    private: Vec<u8>,
}

impl KemKeyPair {
    /// Generate a fresh key pair for the parameter set.
    pub fn generate(
        parameter_set: KemParameterSet,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Self {
        let mut randomness = [0u8; KEYGEN_RANDOMNESS];
        rng.fill_bytes(&mut randomness);

        let (public, private) = match parameter_set {
            KemParameterSet::MlKem512 => {
                let pair = mlkem512::generate_key_pair(randomness);
                (pair.public_key().as_ref().to_vec(), pair.private_key().as_ref().to_vec())
            },
            KemParameterSet::MlKem768 => {
                let pair = mlkem768::generate_key_pair(randomness);
                (pair.public_key().as_ref().to_vec(), pair.private_key().as_ref().to_vec())
            },
            KemParameterSet::MlKem1024 => {
                let pair = mlkem1024::generate_key_pair(randomness);
                (pair.public_key().as_ref().to_vec(), pair.private_key().as_ref().to_vec())
            },
        };

        Self { parameter_set, public, private }
    }

    /// The pair's parameter set.
    pub fn parameter_set(&self) -> KemParameterSet {
        self.parameter_set
    }

    /// The public half as a standalone key.
    pub fn public_key(&self) -> KemPublicKey {
        KemPublicKey { parameter_set: self.parameter_set, bytes: self.public.clone() }
    }

    /// Key id of the public half.
    pub fn key_id(&self) -> String {
        STANDARD.encode(&self.public)
    }

    /// Decapsulate a ciphertext with the private half.
    ///
    /// # Errors
    ///
    /// - `PqDecapsulationFailed` if the ciphertext length does not match the
    ///   parameter set. A well-formed but forged ciphertext decapsulates to a
    ///   pseudorandom secret (implicit rejection); the mismatch surfaces at
    ///   the AEAD layer instead.
    pub fn decapsulate(
        &self,
        ciphertext: &[u8],
    ) -> Result<[u8; SHARED_SECRET_SIZE], CryptoError> {
        let expected = self.parameter_set.ciphertext_len();
        if ciphertext.len() != expected {
            return Err(CryptoError::PqDecapsulationFailed {
                expected,
                actual: ciphertext.len(),
            });
        }

        let secret = match self.parameter_set {
            KemParameterSet::MlKem512 => {
                let sk = mlkem512::MlKem512PrivateKey::from(to_array::<1632>(&self.private));
                let ct = mlkem512::MlKem512Ciphertext::from(to_array::<768>(ciphertext));
                mlkem512::decapsulate(&sk, &ct)
            },
            KemParameterSet::MlKem768 => {
                let sk = mlkem768::MlKem768PrivateKey::from(to_array::<2400>(&self.private));
                let ct = mlkem768::MlKem768Ciphertext::from(to_array::<1088>(ciphertext));
                mlkem768::decapsulate(&sk, &ct)
            },
            KemParameterSet::MlKem1024 => {
                let sk = mlkem1024::MlKem1024PrivateKey::from(to_array::<3168>(&self.private));
                let ct = mlkem1024::MlKem1024Ciphertext::from(to_array::<1568>(ciphertext));
                mlkem1024::decapsulate(&sk, &ct)
            },
        };

        Ok(secret)
    }
}

impl std::fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KemKeyPair")
            .field("parameter_set", &self.parameter_set)
            .finish_non_exhaustive()
    }
}

/// Copy a length-checked slice into a fixed array.
fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let Ok(array) = <[u8; N]>::try_from(bytes) else {
        unreachable!("length validated against the parameter set");
    };
    array
}
