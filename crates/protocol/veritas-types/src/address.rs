//! Base58-encoded ledger identifiers.
//!
//! Account addresses, blockhashes and transaction signatures all share the
//! same shape: a fixed number of bytes shown to humans as base58. Parsing is
//! strict; anything that does not decode to exactly the right length is
//! rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{KEY_LENGTH, SIGNATURE_LENGTH};
use crate::error::{TypesError, TypesResult};

macro_rules! base58_id {
    ($(#[$meta:meta])* $name:ident, $len:expr, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Length in bytes.
            pub const LEN: usize = $len;

            /// Wrap raw bytes.
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Build from a byte slice of exactly the right length.
            pub fn from_slice(bytes: &[u8]) -> TypesResult<Self> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| TypesError::InvalidLength {
                    kind: $kind,
                    expected: $len,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }

            /// Parse from base58 text.
            pub fn parse(s: &str) -> TypesResult<Self> {
                let decoded = bs58::decode(s.trim()).into_vec().map_err(|e| {
                    TypesError::InvalidBase58 {
                        kind: $kind,
                        reason: e.to_string(),
                    }
                })?;
                Self::from_slice(&decoded)
            }

            /// Raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Generate a random value. Used by mocks and tests.
            pub fn random() -> Self {
                let mut bytes = [0u8; $len];
                for b in bytes.iter_mut() {
                    *b = rand::random();
                }
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", bs58::encode(&self.0).into_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

base58_id!(
    /// A ledger account address (32-byte public key).
    ///
    /// Used for wallets, token accounts, mints and program ids alike.
    Address,
    KEY_LENGTH,
    "address"
);

base58_id!(
    /// A recent blockhash; the ledger's liveness token for a transaction.
    Blockhash,
    KEY_LENGTH,
    "blockhash"
);

base58_id!(
    /// A confirmed transaction signature.
    TxSignature,
    SIGNATURE_LENGTH,
    "signature"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip() {
        let addr = Address::new([7u8; 32]);
        let text = addr.to_string();
        assert_eq!(Address::parse(&text).unwrap(), addr);
    }

    #[test]
    fn test_known_address() {
        // System program id: 32 zero bytes
        let addr: Address = "11111111111111111111111111111111".parse().unwrap();
        assert_eq!(addr.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_rejects_bad_base58() {
        let err = Address::parse("0OIl-not-base58").unwrap_err();
        assert!(matches!(err, TypesError::InvalidBase58 { kind: "address", .. }));
    }

    #[test]
    fn test_rejects_wrong_length() {
        let short = bs58::encode([1u8; 31]).into_string();
        let err = Address::parse(&short).unwrap_err();
        assert_eq!(
            err,
            TypesError::InvalidLength {
                kind: "address",
                expected: 32,
                actual: 31
            }
        );
    }

    #[test]
    fn test_trims_whitespace() {
        let addr = Address::new([3u8; 32]);
        let padded = format!("  {}\n", addr);
        assert_eq!(Address::parse(&padded).unwrap(), addr);
    }

    #[test]
    fn test_serde_as_string() {
        let addr = Address::new([9u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let result: Result<Address, _> = serde_json::from_str("\"abc\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_signature_length() {
        let sig = TxSignature::random();
        let parsed = TxSignature::parse(&sig.to_string()).unwrap();
        assert_eq!(parsed, sig);
        assert!(TxSignature::parse(&Address::random().to_string()).is_err());
    }

    #[test]
    fn test_debug_format() {
        let hash = Blockhash::new([0u8; 32]);
        assert_eq!(
            format!("{:?}", hash),
            "Blockhash(11111111111111111111111111111111)"
        );
    }
}
