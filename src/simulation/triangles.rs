use crate::simulation::points::decl_soa_store;
use crate::simulation::{ElementIndex, NONE_ELEMENT_INDEX};

decl_soa_store! {
    pub struct TriangleVec {
        pub point_a_index: Vec<ElementIndex> | 0,
        pub point_b_index: Vec<ElementIndex> | 0,
        pub point_c_index: Vec<ElementIndex> | 0,

        // The springs along the triangle's edges
        pub sub_springs: Vec<[ElementIndex; 3]> | [NONE_ELEMENT_INDEX; 3],

        pub is_destroyed: Vec<bool> | false,
    }
}

/// The triangle (area cell) container. Triangles exist for rendering and
/// area-based effects; they die with any of their sub-springs.
pub struct Triangles {
    pub v: TriangleVec,

    element_count: usize,
    destroyed_count: usize,
}

impl Triangles {
    pub fn new(
        endpoints: Vec<(ElementIndex, ElementIndex, ElementIndex)>,
        sub_springs: Vec<[ElementIndex; 3]>,
    ) -> Self {
        assert_eq!(endpoints.len(), sub_springs.len());
        let element_count = endpoints.len();
        let mut v = TriangleVec::with_len(element_count);

        for (i, (a, b, c)) in endpoints.into_iter().enumerate() {
            v.point_a_index[i] = a;
            v.point_b_index[i] = b;
            v.point_c_index[i] = c;
            v.sub_springs[i] = sub_springs[i];
        }

        Triangles {
            v,
            element_count,
            destroyed_count: 0,
        }
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn live_triangle_count(&self) -> usize {
        self.element_count - self.destroyed_count
    }

    pub fn triangles(&self) -> impl Iterator<Item = ElementIndex> {
        0..self.element_count as ElementIndex
    }

    pub fn is_destroyed(&self, triangle_index: ElementIndex) -> bool {
        self.v.is_destroyed[triangle_index as usize]
    }

    pub fn endpoints(&self, triangle_index: ElementIndex) -> [ElementIndex; 3] {
        let i = triangle_index as usize;
        [self.v.point_a_index[i], self.v.point_b_index[i], self.v.point_c_index[i]]
    }

    /// Marks the triangle destroyed; the caller maintains connectivity.
    pub(crate) fn mark_destroyed(&mut self, triangle_index: ElementIndex) {
        let i = triangle_index as usize;
        assert!(!self.v.is_destroyed[i]);
        self.v.is_destroyed[i] = true;
        self.destroyed_count += 1;
    }
}
