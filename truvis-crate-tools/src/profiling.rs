//! tracy 性能分析辅助
//!
//! `tracy_client::span!` 在没有运行中的 Client 时会 panic。
//! 默认 feature 下 Client 随进程自动启动，宏总是得到一个 span；
//! `Client::running()` 为 `None` 时（例如关闭了 tracy）宏返回 `None`，不会 panic。

/// 创建一个作用域 span，返回值需要绑定到变量上以维持作用域
///
/// ```ignore
/// let _span = truvis_crate_tools::profile_span!("RenderGraph::compile");
/// ```
#[macro_export]
macro_rules! profile_span {
    ($name:literal) => {
        $crate::tracy_client::Client::running()
            .map(|client| client.span($crate::tracy_client::span_location!($name), 0))
    };
}

/// 启动 tracy client（通常只在 app 中调用一次）
pub fn start_profiler() {
    let _client = tracy_client::Client::start();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_span_opens_without_panic() {
        let span = crate::profile_span!("test-span");
        drop(span);

        super::start_profiler();
        let _span = crate::profile_span!("test-span-after-start");
    }
}
