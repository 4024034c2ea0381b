use slotmap::new_key_type;

// 物理资源句柄，由 GfxDevice 分配
new_key_type! {
    /// GPU 纹理
    pub struct GfxTextureHandle;
    /// GPU 缓冲区
    pub struct GfxBufferHandle;
    /// 命令编码器（command buffer）
    pub struct GfxEncoderHandle;
    /// Bind table（shader 可见的资源绑定组）
    pub struct GfxBindTableHandle;
    /// Descriptor set
    pub struct GfxDescriptorSetHandle;
    /// Swapchain
    pub struct GfxSwapchainHandle;
}
