//! Versioned record encoding: every value written to the coordination store
//! starts with a one-byte schema version so future changes can roll forward
//! without a flag day (§3 supplemental).

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

const SCHEMA_VERSION: u8 = 1;

/// Encode `value` as `[schema_version] ++ cbor_bytes`.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = vec![SCHEMA_VERSION];
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Decode bytes produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (version, body) = bytes
        .split_first()
        .ok_or_else(|| StoreError::Serialization("empty record".into()))?;
    if *version != SCHEMA_VERSION {
        return Err(StoreError::Serialization(format!(
            "unsupported schema version {version}"
        )));
    }
    ciborium::from_reader(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn roundtrip() {
        let value = Sample {
            a: 7,
            b: "hi".into(),
        };
        let bytes = encode(&value).unwrap();
        assert_eq!(bytes[0], SCHEMA_VERSION);
        let decoded: Sample = decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = encode(&Sample {
            a: 1,
            b: "x".into(),
        })
        .unwrap();
        bytes[0] = 99;
        let result: Result<Sample, _> = decode(&bytes);
        assert!(result.is_err());
    }
}
