use thiserror::Error;

/// GPU 抽象层返回的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GfxError {
    #[error("Out of device memory while creating {0}")]
    OutOfDeviceMemory(String),
    #[error("Device lost")]
    DeviceLost,
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

pub type GfxResult<T> = Result<T, GfxError>;
