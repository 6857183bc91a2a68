//! Deserialization with the failing JSON path in the error.
use serde::de::DeserializeOwned;

use crate::error::PathError;

pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(located)
}

pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, PathError> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(located)
}

fn located<E: std::fmt::Display>(err: serde_path_to_error::Error<E>) -> PathError {
    PathError {
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    }
}
