use crate::error::Result;

/// An object that can encode a particular type to, and decode it from, a
/// message payload. The implementation can be based on a `serde` data
/// format, or anything else.
pub trait Coder {
    type Type;

    /// Convert an instance of the encodable type to bytes.
    fn encode(&self, inst: &Self::Type) -> Result<Vec<u8>>;

    /// Decode a buffer of bytes to the decodable type.
    fn decode(&self, data: &[u8]) -> Result<Self::Type>;
}

/// Identity implementation of `Coder`, for payloads that already are bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCoder;

impl Coder for BytesCoder {
    type Type = Vec<u8>;

    fn encode(&self, inst: &Self::Type) -> Result<Vec<u8>> {
        Ok(inst.clone())
    }

    fn decode(&self, data: &[u8]) -> Result<Self::Type> {
        Ok(data.to_vec())
    }
}

#[cfg(feature = "serde")]
pub use self::cbor::CborCoder;

#[cfg(feature = "serde")]
mod cbor {
    use super::Coder;
    use crate::error::{Error, Result};
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    /// Encodes any `serde` type as CBOR.
    pub struct CborCoder<T> {
        phantom: std::marker::PhantomData<T>,
    }

    impl<T> CborCoder<T> {
        pub fn new() -> Self {
            Self {
                phantom: std::marker::PhantomData::<T> {},
            }
        }
    }

    impl<T> Default for CborCoder<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T> Coder for CborCoder<T>
    where
        T: Serialize + DeserializeOwned,
    {
        type Type = T;

        fn encode(&self, inst: &Self::Type) -> Result<Vec<u8>> {
            let mut buffer = Vec::new();
            ciborium::ser::into_writer(inst, &mut buffer)
                .map_err(|e| Error::Codec(e.to_string()))?;
            Ok(buffer)
        }

        fn decode(&self, data: &[u8]) -> Result<Self::Type> {
            ciborium::de::from_reader(data).map_err(|e| Error::Codec(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_coder_is_the_identity() {
        let data = vec![1, 2, 3];
        assert_eq!(BytesCoder.encode(&data).unwrap(), data);
        assert_eq!(BytesCoder.decode(&data).unwrap(), data);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn cbor_coder_decodes_what_it_encodes() {
        let coder = CborCoder::<(u32, Vec<f64>)>::new();
        let value = (7, vec![0.5, 1.5]);
        let bytes = coder.encode(&value).unwrap();
        assert_eq!(coder.decode(&bytes).unwrap(), value);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn cbor_coder_rejects_garbage() {
        let coder = CborCoder::<String>::new();
        assert!(matches!(coder.decode(&[0xff, 0x00]), Err(crate::Error::Codec(_))));
    }
}
