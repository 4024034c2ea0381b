//! 任务系统
//!
//! RenderGraph 并行录制命令时使用的"提交任务、等待计数器"接口。
//! RenderGraph 自己不创建线程。

use std::sync::atomic::{AtomicUsize, Ordering};

/// 一个可以借用调用者栈上数据的任务
pub type GfxTask<'t> = Box<dyn FnOnce() + Send + 't>;

/// 任务计数器
///
/// `pending` 为尚未完成的任务数，归零即表示这一批任务全部完成。
#[derive(Debug, Default)]
pub struct TaskCounter {
    pending: AtomicUsize,
    completed: AtomicUsize,
}
impl TaskCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&self, count: usize) {
        self.pending.fetch_add(count, Ordering::AcqRel);
    }

    #[inline]
    pub fn finish_one(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// 自创建以来完成的任务总数
    #[inline]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}

/// 任务系统
pub trait TaskSystem: Send + Sync {
    /// 提交一组任务
    ///
    /// 任务可以借用调用者的数据，因此实现必须在返回前完成所有任务。
    fn submit<'t>(&self, tasks: Vec<GfxTask<'t>>, counter: &TaskCounter);

    /// 等待 `counter` 上的任务全部完成
    fn wait(&self, counter: &TaskCounter);

    fn name(&self) -> &str;
}

/// 在调用线程上依次执行
#[derive(Debug, Default)]
pub struct InlineTaskSystem;
impl TaskSystem for InlineTaskSystem {
    fn submit<'t>(&self, tasks: Vec<GfxTask<'t>>, counter: &TaskCounter) {
        counter.add(tasks.len());
        for task in tasks {
            task();
            counter.finish_one();
        }
    }

    fn wait(&self, counter: &TaskCounter) {
        debug_assert!(counter.is_idle());
    }

    fn name(&self) -> &str {
        "inline"
    }
}

/// 基于 rayon 的任务系统
///
/// 未指定线程池时使用 rayon 的全局线程池。
#[derive(Default)]
pub struct RayonTaskSystem {
    pool: Option<rayon::ThreadPool>,
}
// new & init
impl RayonTaskSystem {
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// 创建独立的线程池
    pub fn with_threads(num_threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|idx| format!("rg-record-{idx}"))
            .build()?;
        Ok(Self { pool: Some(pool) })
    }
}
// tools
impl RayonTaskSystem {
    fn spawn_all<'s>(scope: &rayon::Scope<'s>, tasks: Vec<GfxTask<'s>>, counter: &'s TaskCounter) {
        for task in tasks {
            scope.spawn(move |_| {
                task();
                counter.finish_one();
            });
        }
    }
}
impl TaskSystem for RayonTaskSystem {
    fn submit<'t>(&self, tasks: Vec<GfxTask<'t>>, counter: &TaskCounter) {
        counter.add(tasks.len());
        match &self.pool {
            Some(pool) => pool.scope(|scope| Self::spawn_all(scope, tasks, counter)),
            None => rayon::scope(|scope| Self::spawn_all(scope, tasks, counter)),
        }
    }

    fn wait(&self, counter: &TaskCounter) {
        while !counter.is_idle() {
            std::thread::yield_now();
        }
    }

    fn name(&self) -> &str {
        "rayon"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_sum(system: &dyn TaskSystem) -> usize {
        let mut slots = vec![0usize; 16];
        let counter = TaskCounter::new();
        let tasks: Vec<GfxTask> = slots
            .iter_mut()
            .enumerate()
            .map(|(idx, slot)| Box::new(move || *slot = idx * 2) as GfxTask)
            .collect();
        system.submit(tasks, &counter);
        system.wait(&counter);
        assert!(counter.is_idle());
        assert_eq!(counter.completed(), 16);
        slots.iter().sum()
    }

    #[test]
    fn test_inline_task_system() {
        assert_eq!(run_sum(&InlineTaskSystem), (0..16).map(|i| i * 2).sum::<usize>());
    }

    #[test]
    fn test_rayon_task_system() {
        let system = RayonTaskSystem::with_threads(4).unwrap();
        assert_eq!(run_sum(&system), (0..16).map(|i| i * 2).sum::<usize>());
        assert_eq!(run_sum(&RayonTaskSystem::new()), (0..16).map(|i| i * 2).sum::<usize>());
    }
}
