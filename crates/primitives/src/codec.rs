//! JSON codec for stored values
//!
//! Encoding failures are the caller's fault (`InvalidInput`); decoding
//! failures mean the stored bytes are bad (`Corruption`) and carry the
//! location of the value.

use canvass_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) fn encode<T: Serialize + ?Sized>(what: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::invalid_input(format!("cannot encode {what}: {e}")))
}

pub(crate) fn decode<T: DeserializeOwned>(location: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::corruption(location, e.to_string()))
}

/// Location of a document, used in corruption errors
pub(crate) fn document_location(collection: &str, id: &str) -> String {
    format!("{collection}/{id}")
}
