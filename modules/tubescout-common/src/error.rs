use thiserror::Error;

#[derive(Error, Debug)]
pub enum TubescoutError {
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
