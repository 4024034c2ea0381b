//! 通用依赖图
//!
//! 节点和边都按插入顺序存放在数组中，节点 id 稠密、单调递增，帧内不会复用。
//! 邻接表保存的是边的索引，所以所有遍历都按边的插入顺序进行，结果是确定的。

use super::handle::RgNodeId;

/// 一条有向边
#[derive(Clone, Debug)]
pub struct RgEdge<E> {
    from: RgNodeId,
    to: RgNodeId,
    data: E,
}

// getters
impl<E> RgEdge<E> {
    #[inline]
    pub fn from(&self) -> RgNodeId {
        self.from
    }

    #[inline]
    pub fn to(&self) -> RgNodeId {
        self.to
    }

    #[inline]
    pub fn data(&self) -> &E {
        &self.data
    }
}

/// 依赖图
///
/// 同一对节点之间允许存在多条边（例如同一个 Pass 以不同的 mip 范围读取同一张纹理）。
/// 不实现 `Clone`：边通过节点 id 引用节点，复制后的 id 只在原图中有意义。
pub struct RgDependencyGraph<N, E> {
    nodes: Vec<N>,
    /// `unlink` 之后对应位置为 `None`，保证其余边的索引不变
    edges: Vec<Option<RgEdge<E>>>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    live_edges: usize,
}

impl<N, E> Default for RgDependencyGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl<N, E> RgDependencyGraph<N, E> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
            live_edges: 0,
        }
    }

    /// 清空所有节点和边，保留已分配的内存
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.live_edges = 0;
    }
}

// mutation
impl<N, E> RgDependencyGraph<N, E> {
    /// 插入节点，返回下一个 id
    pub fn insert(&mut self, node: N) -> RgNodeId {
        let id = RgNodeId::from_index(self.nodes.len());
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// 添加一条边
    ///
    /// `from` 或 `to` 无效时返回 `false`。
    pub fn link(&mut self, from: RgNodeId, to: RgNodeId, data: E) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }

        let edge_index = self.edges.len();
        self.edges.push(Some(RgEdge { from, to, data }));
        self.outgoing[from.index()].push(edge_index);
        self.incoming[to.index()].push(edge_index);
        self.live_edges += 1;
        true
    }

    /// 删除 `from -> to` 之间的所有边
    ///
    /// 不存在任何边时返回 `false`。
    pub fn unlink(&mut self, from: RgNodeId, to: RgNodeId) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }

        let edges = &mut self.edges;
        let mut removed = Vec::new();
        self.outgoing[from.index()].retain(|&edge_index| {
            let matches = edges[edge_index].as_ref().is_some_and(|edge| edge.to == to);
            if matches {
                edges[edge_index] = None;
                removed.push(edge_index);
            }
            !matches
        });
        if removed.is_empty() {
            return false;
        }

        self.incoming[to.index()].retain(|edge_index| !removed.contains(edge_index));
        self.live_edges -= removed.len();
        true
    }
}

// getters
impl<N, E> RgDependencyGraph<N, E> {
    #[inline]
    pub fn contains(&self, id: RgNodeId) -> bool {
        id.index() < self.nodes.len()
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.live_edges
    }

    /// O(1) 查找节点，id 超出范围时返回 `None`
    #[inline]
    pub fn node_at(&self, id: RgNodeId) -> Option<&N> {
        self.nodes.get(id.index())
    }

    #[inline]
    pub fn node_at_mut(&mut self, id: RgNodeId) -> Option<&mut N> {
        self.nodes.get_mut(id.index())
    }

    /// 出边数量，无效 id 返回 0
    #[inline]
    pub fn outgoing_edges(&self, id: RgNodeId) -> usize {
        self.outgoing.get(id.index()).map_or(0, Vec::len)
    }

    /// 入边数量，无效 id 返回 0
    #[inline]
    pub fn incoming_edges(&self, id: RgNodeId) -> usize {
        self.incoming.get(id.index()).map_or(0, Vec::len)
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = (RgNodeId, &N)> {
        self.nodes.iter().enumerate().map(|(idx, node)| (RgNodeId::from_index(idx), node))
    }

    /// 按插入顺序遍历出边
    pub fn outgoing(&self, id: RgNodeId) -> impl Iterator<Item = &RgEdge<E>> {
        self.outgoing
            .get(id.index())
            .into_iter()
            .flatten()
            .filter_map(|&edge_index| self.edges[edge_index].as_ref())
    }

    /// 按插入顺序遍历入边
    pub fn incoming(&self, id: RgNodeId) -> impl Iterator<Item = &RgEdge<E>> {
        self.incoming
            .get(id.index())
            .into_iter()
            .flatten()
            .filter_map(|&edge_index| self.edges[edge_index].as_ref())
    }

    /// 按插入顺序遍历所有边
    pub fn edges(&self) -> impl Iterator<Item = &RgEdge<E>> {
        self.edges.iter().flatten()
    }
}

// callback 形式的遍历
impl<N, E> RgDependencyGraph<N, E> {
    pub fn foreach_outgoing_edges(&self, id: RgNodeId, mut f: impl FnMut(&RgEdge<E>)) {
        self.outgoing(id).for_each(&mut f);
    }

    pub fn foreach_incoming_edges(&self, id: RgNodeId, mut f: impl FnMut(&RgEdge<E>)) {
        self.incoming(id).for_each(&mut f);
    }

    pub fn foreach_edges(&self, mut f: impl FnMut(&RgEdge<E>)) {
        self.edges().for_each(&mut f);
    }
}
