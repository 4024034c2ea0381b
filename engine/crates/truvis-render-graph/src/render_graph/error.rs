use thiserror::Error;
use truvis_render_interface::gfx_error::GfxError;

/// 错误发生的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgErrorPhase {
    /// 构建阶段：只影响当前这次 Builder 调用，调用者可以跳过该 Pass 继续构建
    Build,
    /// 编译阶段：当前帧必须丢弃
    Compile,
    /// 执行阶段：当前帧丢弃，`DeviceLost` 还需要重建所有池
    Execute,
}

/// RenderGraph 的错误
#[derive(Error, Debug)]
pub enum RgError {
    // ---------- build ----------
    #[error("Invalid descriptor for \"{resource}\": {reason}")]
    InvalidDescriptor { resource: String, reason: String },

    #[error("Invalid binding index in pass \"{pass}\": {reason}")]
    InvalidBindingIndex { pass: String, reason: String },

    #[error("Unknown resource handle {handle}: {reason}")]
    UnknownResourceHandle { handle: String, reason: String },

    #[error("Pass \"{pass}\" does not support {operation}")]
    UnsupportedPassOperation { pass: String, operation: &'static str },

    #[error("Pass \"{pass}\" has no executor")]
    MissingExecutor { pass: String },

    // ---------- compile ----------
    #[error("Cyclic dependency between passes: {passes:?}")]
    CyclicDependency { passes: Vec<String> },

    #[error("Resource \"{resource}\" is never read or written")]
    DanglingResource { resource: String },

    #[error("Present pass \"{pass}\" must be the last pass, but \"{dependent}\" depends on it")]
    PresentNotTerminal { pass: String, dependent: String },

    // ---------- execute ----------
    #[error("Out of device memory: {0}")]
    OutOfDeviceMemory(String),

    #[error("Device lost")]
    DeviceLost,

    #[error("Invalid GPU handle: {0}")]
    InvalidGfxHandle(String),

    #[error("Pass \"{pass}\" accessed undeclared resource {resource}")]
    UndeclaredResource { pass: String, resource: String },

    #[error("Pass \"{pass}\" failed: {source}")]
    PassExecutionFailed {
        pass: String,
        #[source]
        source: anyhow::Error,
    },
}

impl RgError {
    pub fn phase(&self) -> RgErrorPhase {
        match self {
            Self::InvalidDescriptor { .. }
            | Self::InvalidBindingIndex { .. }
            | Self::UnknownResourceHandle { .. }
            | Self::UnsupportedPassOperation { .. }
            | Self::MissingExecutor { .. } => RgErrorPhase::Build,

            Self::CyclicDependency { .. } | Self::DanglingResource { .. } | Self::PresentNotTerminal { .. } => {
                RgErrorPhase::Compile
            }

            Self::OutOfDeviceMemory(_)
            | Self::DeviceLost
            | Self::InvalidGfxHandle(_)
            | Self::UndeclaredResource { .. }
            | Self::PassExecutionFailed { .. } => RgErrorPhase::Execute,
        }
    }

    /// 是否需要销毁并重建所有池化/别名资源
    #[inline]
    pub fn requires_teardown(&self) -> bool {
        matches!(self, Self::DeviceLost)
    }
}

impl From<GfxError> for RgError {
    fn from(value: GfxError) -> Self {
        match value {
            GfxError::OutOfDeviceMemory(what) => Self::OutOfDeviceMemory(what),
            GfxError::DeviceLost => Self::DeviceLost,
            GfxError::InvalidHandle(what) => Self::InvalidGfxHandle(what),
        }
    }
}

pub type RgResult<T> = Result<T, RgError>;
