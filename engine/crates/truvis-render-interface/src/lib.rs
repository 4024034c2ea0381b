//! GPU 边界
//!
//! RenderGraph 只通过这里定义的接口与底层 GPU 抽象层、任务系统交互：
//!
//! - `handles`: 物理资源句柄（SlotMap key）
//! - `resource_desc`: 纹理/缓冲区描述
//! - `resource_state`: 与后端无关的资源状态以及 barrier 描述
//! - `gfx_device`: 设备 trait（创建/销毁资源、录制 barrier、提交、呈现）
//! - `task_system`: 并行录制使用的任务系统
//! - `headless_device`: 不依赖真实 GPU 的记录型设备，用于测试和 headless 运行

pub mod frame_counter;
pub mod gfx_device;
pub mod gfx_error;
pub mod handles;
pub mod headless_device;
pub mod resource_desc;
pub mod resource_state;
pub mod task_system;
pub mod vk_mapping;
