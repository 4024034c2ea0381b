use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// RenderGraph 的配置
///
/// 可以从 TOML 加载，缺省的字段使用默认值：
///
/// ```toml
/// enable_aliasing = true
/// parallel_recording = false
/// transient_max_idle_frames = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgConfig {
    /// 生命周期不重叠的临时纹理复用同一块显存
    pub enable_aliasing: bool,
    /// 剔除输出没有被使用的 Pass
    pub enable_culling: bool,
    /// 通过 TaskSystem 并行录制各个 Pass
    pub parallel_recording: bool,

    /// 对象池每次扩容的数量
    pub encoder_pool_grow: usize,
    pub bind_table_pool_grow: usize,
    pub descriptor_set_pool_grow: usize,

    /// 临时资源在空闲列表中超过这么多帧没有被使用就销毁
    pub transient_max_idle_frames: u64,

    /// 每次重新编译时打印执行计划
    pub print_execution_plan: bool,
}

impl Default for RgConfig {
    fn default() -> Self {
        Self {
            enable_aliasing: true,
            enable_culling: true,
            parallel_recording: true,
            encoder_pool_grow: 8,
            bind_table_pool_grow: 32,
            descriptor_set_pool_grow: 32,
            transient_max_idle_frames: 8,
            print_execution_plan: false,
        }
    }
}

impl RgConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read render graph config: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse render graph config: {:?}", path.as_ref()))
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
