//! Charge requests and the burn split.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::Address;
use crate::amount::RawAmount;
use crate::constants::{BURN_DIVISOR, CHARGE_ID_LENGTH};
use crate::error::{TypesError, TypesResult};

/// Idempotency key for a single charge.
///
/// Generated once per query. A charge id that has been executed once can
/// never move funds again.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChargeId([u8; CHARGE_ID_LENGTH]);

impl ChargeId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: [u8; CHARGE_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse from lowercase or uppercase hex.
    pub fn parse(s: &str) -> TypesResult<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| TypesError::InvalidChargeId(e.to_string()))?;
        let arr: [u8; CHARGE_ID_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            TypesError::InvalidChargeId(format!(
                "expected {} hex characters, got {}",
                CHARGE_ID_LENGTH * 2,
                s.trim().len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl FromStr for ChargeId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ChargeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ChargeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChargeId({})", self)
    }
}

impl Serialize for ChargeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChargeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A request to charge a payer for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Idempotency key
    pub charge_id: ChargeId,
    /// Wallet paying for the query
    pub payer: Address,
    /// Total raw amount to charge
    pub amount: RawAmount,
}

impl ChargeRequest {
    /// Create a request with a freshly generated charge id.
    pub fn new(payer: Address, amount: RawAmount) -> Self {
        Self {
            charge_id: ChargeId::generate(),
            payer,
            amount,
        }
    }

    /// Create a request with a caller-supplied charge id.
    pub fn with_id(charge_id: ChargeId, payer: Address, amount: RawAmount) -> Self {
        Self {
            charge_id,
            payer,
            amount,
        }
    }

    /// The fee/burn split of this charge.
    pub fn split(&self) -> BurnSplit {
        BurnSplit::of(self.amount)
    }
}

/// How a charged total divides between the fee collector and the burn.
///
/// `burned` is 1% rounded down; the fee collector keeps the remainder, so the
/// two parts always sum to the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnSplit {
    /// Raw units the fee collector keeps
    pub fee_retained: RawAmount,
    /// Raw units removed from supply
    pub burned: RawAmount,
}

impl BurnSplit {
    /// Split a total charge.
    pub fn of(total: RawAmount) -> Self {
        let burned = total / BURN_DIVISOR;
        Self {
            fee_retained: total - burned,
            burned,
        }
    }

    /// The original total.
    pub fn total(&self) -> RawAmount {
        self.fee_retained + self.burned
    }

    /// Whether a burn step is needed at all.
    pub fn has_burn(&self) -> bool {
        self.burned > 0
    }
}

/// A delegate's authority over a user's token account, as reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateAllowance {
    /// Wallet that owns the token account
    pub owner: Address,
    /// Account allowed to move tokens
    pub delegate: Address,
    /// Raw units the delegate may still move
    pub remaining: RawAmount,
}

impl DelegateAllowance {
    /// Whether this allowance lets `delegate` move `amount`.
    pub fn covers(&self, delegate: &Address, amount: RawAmount) -> bool {
        self.delegate == *delegate && self.remaining >= amount
    }
}

/// Mint metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInfo {
    /// Mint address
    pub address: Address,
    /// Decimal places of the token
    pub decimals: u8,
    /// Current total supply in raw units
    pub supply: RawAmount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_scenario() {
        let split = BurnSplit::of(6600);
        assert_eq!(split.burned, 66);
        assert_eq!(split.fee_retained, 6534);
    }

    #[test]
    fn test_split_below_divisor_burns_nothing() {
        let split = BurnSplit::of(99);
        assert_eq!(split.burned, 0);
        assert_eq!(split.fee_retained, 99);
        assert!(!split.has_burn());
    }

    #[test]
    fn test_split_zero() {
        assert_eq!(
            BurnSplit::of(0),
            BurnSplit {
                fee_retained: 0,
                burned: 0
            }
        );
    }

    #[test]
    fn test_charge_id_roundtrip() {
        let id = ChargeId::generate();
        assert_eq!(ChargeId::parse(&id.to_string()).unwrap(), id);
        assert_eq!(id.to_string().len(), 32);
    }

    #[test]
    fn test_charge_id_rejects() {
        assert!(ChargeId::parse("zz").is_err());
        assert!(ChargeId::parse("abcd").is_err());
    }

    #[test]
    fn test_charge_ids_unique() {
        assert_ne!(ChargeId::generate(), ChargeId::generate());
    }

    #[test]
    fn test_allowance_covers() {
        let delegate = Address::new([1u8; 32]);
        let other = Address::new([2u8; 32]);
        let allowance = DelegateAllowance {
            owner: Address::new([3u8; 32]),
            delegate,
            remaining: 1000,
        };
        assert!(allowance.covers(&delegate, 1000));
        assert!(!allowance.covers(&delegate, 1001));
        assert!(!allowance.covers(&other, 10));
    }

    #[test]
    fn test_request_json() {
        let req = ChargeRequest::new(Address::new([5u8; 32]), 6600);
        let json = serde_json::to_string(&req).unwrap();
        let back: ChargeRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }

    proptest! {
        #[test]
        fn prop_split_conserves_total(total in any::<u64>()) {
            let split = BurnSplit::of(total);
            prop_assert_eq!(split.fee_retained + split.burned, total);
            prop_assert_eq!(split.burned, total / 100);
            prop_assert!(split.burned <= split.fee_retained);
        }
    }
}
