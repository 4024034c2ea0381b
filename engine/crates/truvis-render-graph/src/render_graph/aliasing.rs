//! 临时纹理的显存别名分配
//!
//! 区间调度的贪心策略：按 `lifespan.from` 排序，维护一个"已退休"集合
//! （`lifespan.to <= 当前 from` 的纹理），每个新纹理从中挑选布局兼容、
//! 容量差最小的一个作为别名来源。被选中的来源离开退休集合，
//! 新纹理退休后以同一块物理内存继续参与匹配。
//!
//! 结果不保证最优，只保证：别名双方的生命周期不重叠。

use truvis_render_interface::resource_desc::GfxTextureDesc;

use super::handle::RgNodeId;
use super::resource::RgLifespan;

/// 参与别名分配的纹理
#[derive(Clone, Copy, Debug)]
pub struct RgAliasCandidate {
    pub node: RgNodeId,
    pub lifespan: RgLifespan,
    pub desc: GfxTextureDesc,
}

/// 一次别名分配：`node` 复用 `source` 的物理内存
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgAliasAssignment {
    pub node: RgNodeId,
    pub source: RgNodeId,
    /// 整条别名链上真正持有显存的纹理
    pub root: RgNodeId,
}

/// 显存大小的分级（向上取 2 的幂）
#[inline]
fn size_class(desc: &GfxTextureDesc) -> u64 {
    desc.memory_size().next_power_of_two()
}

/// `candidate` 能否放进 `root` 的物理内存
///
/// 格式可以不同，只要每个 texel 的位数相同（typeless 别名）。
pub fn is_alias_compatible(root: &GfxTextureDesc, candidate: &GfxTextureDesc) -> bool {
    root.samples == candidate.samples
        && root.dimension == candidate.dimension
        && root.format.bits_per_texel() == candidate.format.bits_per_texel()
        && root.format.is_depth() == candidate.format.is_depth()
        && size_class(root) == size_class(candidate)
        && root.memory_size() >= candidate.memory_size()
}

struct AliasSlot {
    node: RgNodeId,
    root: RgNodeId,
    root_desc: GfxTextureDesc,
    to: u32,
}

/// 为一组临时纹理分配别名，返回的分配按 `node` 的 `lifespan.from` 排序
pub fn assign_aliasing(candidates: &[RgAliasCandidate]) -> Vec<RgAliasAssignment> {
    let mut sorted: Vec<_> = candidates.iter().filter(|candidate| candidate.lifespan.is_set()).collect();
    sorted.sort_by_key(|candidate| (candidate.lifespan.from, candidate.node));

    let mut live: Vec<AliasSlot> = Vec::new();
    let mut retired: Vec<AliasSlot> = Vec::new();
    let mut assignments = Vec::new();

    for candidate in sorted {
        let mut idx = 0;
        while idx < live.len() {
            if live[idx].to <= candidate.lifespan.from {
                retired.push(live.remove(idx));
            } else {
                idx += 1;
            }
        }

        let size = candidate.desc.memory_size();
        let best = retired
            .iter()
            .enumerate()
            .filter(|(_, slot)| is_alias_compatible(&slot.root_desc, &candidate.desc))
            .min_by_key(|(_, slot)| (slot.root_desc.memory_size() - size, slot.node))
            .map(|(idx, _)| idx);

        let slot = match best {
            Some(idx) => {
                let source = retired.remove(idx);
                log::trace!(
                    "RgAliasing: {:?} reuses memory of {:?} (root {:?})",
                    candidate.node,
                    source.node,
                    source.root
                );
                assignments.push(RgAliasAssignment {
                    node: candidate.node,
                    source: source.node,
                    root: source.root,
                });
                AliasSlot {
                    node: candidate.node,
                    root: source.root,
                    root_desc: source.root_desc,
                    to: candidate.lifespan.to,
                }
            }
            None => AliasSlot {
                node: candidate.node,
                root: candidate.node,
                root_desc: candidate.desc,
                to: candidate.lifespan.to,
            },
        };
        live.push(slot);
    }

    assignments
}
