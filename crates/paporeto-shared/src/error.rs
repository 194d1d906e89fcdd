use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ColorError {
    #[error("Invalid colour '{0}': expected #RRGGBB")]
    InvalidHex(String),
}
