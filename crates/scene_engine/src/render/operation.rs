//! Draw-operation descriptors
//!
//! A [`RenderOperation`] is everything a backend needs to issue one draw call:
//! opaque handles to vertex/index data owned by an external resource manager,
//! element counts, and the primitive topology. The scene core never looks
//! inside the buffers.

/// Handle to a mesh owned by the external resource manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u64);

/// Handle to a vertex buffer owned by the external resource manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexDataHandle(pub u64);

/// Handle to an index buffer owned by the external resource manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexDataHandle(pub u64);

/// Primitive topology of a draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// Independent points
    PointList,
    /// Independent line segments (two elements each)
    LineList,
    /// Connected line segments
    LineStrip,
    /// Independent triangles (three elements each)
    TriangleList,
    /// Triangle strip
    TriangleStrip,
    /// Triangle fan
    TriangleFan,
}

/// Index buffer binding for an indexed draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexData {
    /// Index buffer handle
    pub handle: IndexDataHandle,
    /// Number of indices to draw
    pub count: u32,
}

/// Everything needed to issue a single draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderOperation {
    /// Vertex buffer handle
    pub vertex_data: VertexDataHandle,
    /// Number of vertices in the buffer
    pub vertex_count: u32,
    /// Optional index buffer
    pub index_data: Option<IndexData>,
    /// Primitive topology
    pub primitive: PrimitiveType,
}

impl RenderOperation {
    /// Create a non-indexed operation
    pub fn new(vertex_data: VertexDataHandle, vertex_count: u32, primitive: PrimitiveType) -> Self {
        Self {
            vertex_data,
            vertex_count,
            index_data: None,
            primitive,
        }
    }

    /// Attach an index buffer (builder pattern)
    pub fn with_indices(mut self, handle: IndexDataHandle, count: u32) -> Self {
        self.index_data = Some(IndexData { handle, count });
        self
    }

    /// Number of elements consumed by the draw (indices if indexed, else vertices)
    pub fn element_count(&self) -> u32 {
        self.index_data.map_or(self.vertex_count, |indices| indices.count)
    }

    /// Number of primitives the draw produces
    pub fn primitive_count(&self) -> u32 {
        let n = self.element_count();
        match self.primitive {
            PrimitiveType::PointList => n,
            PrimitiveType::LineList => n / 2,
            PrimitiveType::LineStrip => n.saturating_sub(1),
            PrimitiveType::TriangleList => n / 3,
            PrimitiveType::TriangleStrip | PrimitiveType::TriangleFan => n.saturating_sub(2),
        }
    }

    /// True when the operation would draw nothing
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0 || self.element_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_counts() {
        let list = RenderOperation::new(VertexDataHandle(1), 36, PrimitiveType::TriangleList);
        assert_eq!(list.primitive_count(), 12);

        let strip = RenderOperation::new(VertexDataHandle(1), 4, PrimitiveType::TriangleStrip);
        assert_eq!(strip.primitive_count(), 2);

        let indexed = RenderOperation::new(VertexDataHandle(1), 8, PrimitiveType::TriangleList)
            .with_indices(IndexDataHandle(2), 36);
        assert_eq!(indexed.element_count(), 36);
        assert_eq!(indexed.primitive_count(), 12);
    }

    #[test]
    fn test_empty_operation() {
        let op = RenderOperation::new(VertexDataHandle(1), 0, PrimitiveType::LineStrip);
        assert!(op.is_empty());
        assert_eq!(op.primitive_count(), 0);
    }
}
