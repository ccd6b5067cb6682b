//! Wire format of the routing vector exchanged between neighbors.
//!
//! One UDP datagram carries one JSON-encoded [`Advertisement`]:
//!
//! ```text
//! {"sender_id":"r2","vector":{"r1":999,"r2":0,"r3":21}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::RouterId;
use crate::error::DecodeError;

use super::types::{Cost, INFINITY};

pub type DistanceVector = BTreeMap<RouterId, Cost>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Advertisement {
    pub sender_id: RouterId,
    pub vector: DistanceVector,
}

impl Advertisement {
    pub fn new(sender_id: RouterId, vector: DistanceVector) -> Self {
        Self { sender_id, vector }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a datagram and checks it against the schema. Anything that
    /// does not conform is rejected as a whole.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let advertisement: Advertisement = serde_json::from_slice(payload)?;
        advertisement.validate()?;
        Ok(advertisement)
    }

    fn validate(&self) -> Result<(), DecodeError> {
        if self.sender_id.is_empty() {
            return Err(DecodeError::EmptySender);
        }
        for (destination, &cost) in &self.vector {
            if destination.is_empty() {
                return Err(DecodeError::EmptyDestination);
            }
            if cost > INFINITY {
                return Err(DecodeError::CostOutOfRange {
                    destination: destination.clone(),
                    cost,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_infinity_and_unreachable_destinations() {
        let vector: DistanceVector = [("r1".to_string(), 0), ("r2".to_string(), INFINITY)]
            .into_iter()
            .collect();
        let advertisement = Advertisement::new("r1".into(), vector);
        let bytes = advertisement.encode().unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"sender_id":"r1","vector":{"r1":0,"r2":999}}"#
        );
        assert_eq!(Advertisement::decode(&bytes).unwrap(), advertisement);
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            Advertisement::decode(b"HELLO:r1"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn rejects_loosely_typed_vectors() {
        // the original script's nested `table` layout
        let legacy = br#"{"type":"update","sender_id":"r1","table":{"r1":{"cost":0,"next_hop":"r1"}}}"#;
        assert!(Advertisement::decode(legacy).is_err());

        let negative = br#"{"sender_id":"r1","vector":{"r2":-4}}"#;
        assert!(Advertisement::decode(negative).is_err());

        let fractional = br#"{"sender_id":"r1","vector":{"r2":20.5}}"#;
        assert!(Advertisement::decode(fractional).is_err());
    }

    #[test]
    fn rejects_out_of_range_cost() {
        let payload = br#"{"sender_id":"r1","vector":{"r2":1000}}"#;
        assert!(matches!(
            Advertisement::decode(payload),
            Err(DecodeError::CostOutOfRange { cost: 1000, .. })
        ));
    }

    #[test]
    fn rejects_empty_ids() {
        assert!(matches!(
            Advertisement::decode(br#"{"sender_id":"","vector":{}}"#),
            Err(DecodeError::EmptySender)
        ));
        assert!(matches!(
            Advertisement::decode(br#"{"sender_id":"r1","vector":{"":3}}"#),
            Err(DecodeError::EmptyDestination)
        ));
    }
}
