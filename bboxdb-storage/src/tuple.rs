use crate::hyperrectangle::Hyperrectangle;

/// One stored record: a key, its spatial extent, an opaque payload and two
/// logical timestamps. Tuples are immutable once built.
#[derive(Clone, PartialEq, Debug)]
pub struct Tuple {
    key: String,
    bounding_box: Hyperrectangle,
    payload: Vec<u8>,
    version_timestamp: i64,
    received_timestamp: i64,
}

impl Tuple {
    pub fn new(
        key: impl Into<String>,
        bounding_box: Hyperrectangle,
        payload: Vec<u8>,
        version_timestamp: i64,
        received_timestamp: i64,
    ) -> Tuple {
        Tuple {
            key: key.into(),
            bounding_box,
            payload,
            version_timestamp,
            received_timestamp,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bounding_box(&self) -> &Hyperrectangle {
        &self.bounding_box
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn version_timestamp(&self) -> i64 {
        self.version_timestamp
    }

    pub fn received_timestamp(&self) -> i64 {
        self.received_timestamp
    }

    /// Consumes the tuple and returns its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
