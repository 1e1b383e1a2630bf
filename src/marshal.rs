//! The protobuf marshaller collaborator (§6.2). The core only needs
//! `marshal`/`unmarshal`; which encoding actually runs is opaque to it.
//! Kept generic so generated protobuf code can plug in its own
//! `Marshal` impl without this crate depending on `prost`/`protobuf`.

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("failed to marshal message: {0}")]
    Encode(String),
    #[error("failed to unmarshal message: {0}")]
    Decode(String),
}

/// `marshal(msg) -> bytes`.
pub trait Marshal {
    fn marshal(&self) -> Result<Bytes, MarshalError>;
}

/// `unmarshal(bytes, msg_slot) -> void`.
pub trait Unmarshal: Sized {
    fn unmarshal(bytes: &[u8]) -> Result<Self, MarshalError>;
}

/// The identity marshaller: messages that are already opaque byte buffers
/// (used by tests and by the demo binary, and by any caller whose
/// generated code hands the core pre-serialized bytes directly).
impl Marshal for Bytes {
    fn marshal(&self) -> Result<Bytes, MarshalError> {
        Ok(self.clone())
    }
}

impl Unmarshal for Bytes {
    fn unmarshal(bytes: &[u8]) -> Result<Self, MarshalError> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}

/// JSON marshalling, gated behind the `json` feature like the opaque-bytes
/// default in the rest of this module.
#[cfg(feature = "json")]
pub mod json {
    use super::{MarshalError, Marshal, Unmarshal};
    use bytes::Bytes;
    use serde::{de::DeserializeOwned, Serialize};

    /// Wrapper so any `Serialize + DeserializeOwned` type gets `Marshal`/
    /// `Unmarshal` without this crate having to own the type.
    pub struct Json<T>(pub T);

    impl<T: Serialize> Marshal for Json<T> {
        fn marshal(&self) -> Result<Bytes, MarshalError> {
            serde_json::to_vec(&self.0)
                .map(Bytes::from)
                .map_err(|e| MarshalError::Encode(e.to_string()))
        }
    }

    impl<T: DeserializeOwned> Unmarshal for Json<T> {
        fn unmarshal(bytes: &[u8]) -> Result<Self, MarshalError> {
            serde_json::from_slice(bytes)
                .map(Json)
                .map_err(|e| MarshalError::Decode(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_marshaller_is_identity() {
        let original = Bytes::from_static(b"payload");
        let marshalled = original.marshal().unwrap();
        let unmarshalled = Bytes::unmarshal(&marshalled).unwrap();
        assert_eq!(unmarshalled, original);
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_marshaller_round_trips() {
        use json::Json;
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Greeting {
            name: String,
        }
        let original = Json(Greeting {
            name: "World".to_owned(),
        });
        let bytes = original.marshal().unwrap();
        let Json(decoded) = Json::<Greeting>::unmarshal(&bytes).unwrap();
        assert_eq!(decoded, Greeting { name: "World".to_owned() });
    }
}
