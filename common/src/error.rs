use thiserror::Error;

use crate::settings::SettingsField;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to mount storage volume at `{root}`: {source}")]
    Mount {
        root: String,
        #[source]
        source: std::io::Error,
    },
    #[error("storage volume is not mounted")]
    NotMounted,
    #[error("document `{0}` does not exist")]
    NotFound(String),
    #[error("i/o error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("failed to serialize configuration document: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("configuration document is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("`{}` cannot be changed remotely", .0.key())]
    NotRemotelySettable(SettingsField),
    #[error("`{}` cannot be empty", .0.key())]
    Empty(SettingsField),
    #[error("invalid desired temperature `{0}`")]
    InvalidTemperature(String),
}
