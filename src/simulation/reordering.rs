//! One-shot mesh reordering at ship load: point and spring order follows a
//! two-row stripe layout for memory locality, triangle order follows Tom
//! Forsyth's vertex-cache scoring. Everything here returns permutations
//! (lists of old indices in new order), so an identity order can stand in
//! during bring-up by skipping the pass.

// See Tom Forsyth's notes: 32 entries is good enough, 64 yields no
// significant difference
const VERTEX_CACHE_SIZE: usize = 32;

const CACHE_DECAY_POWER: f32 = 1.5;
const LAST_TRIANGLE_SCORE: f32 = 0.75;
const VALENCE_BOOST_SCALE: f32 = 2.0;
const VALENCE_BOOST_POWER: f32 = 0.5;

/// Orders points stripe-wise over pairs of image rows: all points of a
/// two-row band left to right, band by band. Points without a grid
/// position (rope chain fills) keep their relative order at the end.
pub fn reorder_points_stripewise(grid_coordinates: &[Option<(u32, u32)>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..grid_coordinates.len()).collect();
    order.sort_by_key(|&i| match grid_coordinates[i] {
        Some((x, y)) => (0u32, y / 2, x, y),
        None => (1u32, 0, 0, i as u32),
    });
    order
}

/// Orders springs by their (new) lowest endpoint, so springs touch memory
/// in roughly the same order as the points they read.
pub fn reorder_springs_for_points(spring_endpoints: &[(usize, usize)], point_remap: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..spring_endpoints.len()).collect();
    order.sort_by_key(|&s| {
        let (a, b) = spring_endpoints[s];
        let (na, nb) = (point_remap[a], point_remap[b]);
        (na.min(nb), na.max(nb))
    });
    order
}

/// Builds the old-index → new-index map from a permutation in
/// new-order-of-old-indices form.
pub fn invert_permutation(order: &[usize]) -> Vec<usize> {
    let mut remap = vec![0usize; order.len()];
    for (new_index, &old_index) in order.iter().enumerate() {
        remap[old_index] = new_index;
    }
    remap
}

struct VertexData {
    cache_position: i32,
    current_score: f32,
    remaining_triangles: Vec<usize>,
}

/// Tom Forsyth's linear-speed vertex cache optimization over the triangle
/// list. Returns the triangle indices in draw order.
pub fn reorder_triangles_tom_forsyth(triangle_vertices: &[[usize; 3]], point_count: usize) -> Vec<usize> {
    let triangle_count = triangle_vertices.len();
    if triangle_count == 0 {
        return Vec::new();
    }

    let mut vertices: Vec<VertexData> = (0..point_count)
        .map(|_| VertexData {
            cache_position: -1,
            current_score: 0.,
            remaining_triangles: Vec::new(),
        })
        .collect();
    for (t, vs) in triangle_vertices.iter().enumerate() {
        for &v in vs {
            vertices[v].remaining_triangles.push(t);
        }
    }
    for v in vertices.iter_mut() {
        v.current_score = vertex_score(v);
    }

    let mut triangle_drawn = vec![false; triangle_count];
    let mut triangle_score: Vec<f32> = triangle_vertices
        .iter()
        .map(|vs| vs.iter().map(|&v| vertices[v].current_score).sum())
        .collect();

    let mut cache: Vec<usize> = Vec::with_capacity(VERTEX_CACHE_SIZE + 3);
    let mut order: Vec<usize> = Vec::with_capacity(triangle_count);

    for _ in 0..triangle_count {
        // The best not-yet-drawn triangle. Scanning the cache's triangles
        // first would be faster; a full scan keeps this simple and the
        // pass runs once per ship load.
        let mut best_triangle = usize::MAX;
        let mut best_score = f32::MIN;
        for t in 0..triangle_count {
            if !triangle_drawn[t] && triangle_score[t] > best_score {
                best_score = triangle_score[t];
                best_triangle = t;
            }
        }

        let t = best_triangle;
        triangle_drawn[t] = true;
        order.push(t);

        //
        // Update the cache (LRU with the triangle's vertices at the front)
        // and the affected scores
        //

        for &v in &triangle_vertices[t] {
            vertices[v].remaining_triangles.retain(|&rt| rt != t);

            if let Some(position) = cache.iter().position(|&c| c == v) {
                cache.remove(position);
            }
            cache.insert(0, v);
        }

        let mut affected: Vec<usize> = cache.clone();
        while cache.len() > VERTEX_CACHE_SIZE {
            let evicted = cache.pop().unwrap();
            affected.push(evicted);
        }

        for &v in &affected {
            let cache_position = cache.iter().position(|&c| c == v).map(|p| p as i32).unwrap_or(-1);
            vertices[v].cache_position = cache_position;
            let old_score = vertices[v].current_score;
            let new_score = vertex_score(&vertices[v]);
            vertices[v].current_score = new_score;

            let delta = new_score - old_score;
            for &rt in &vertices[v].remaining_triangles {
                triangle_score[rt] += delta;
            }
        }
    }

    order
}

fn vertex_score(vertex: &VertexData) -> f32 {
    if vertex.remaining_triangles.is_empty() {
        // Never gets drawn again
        return -1.0;
    }

    let mut score = if vertex.cache_position < 0 {
        // Not in cache
        0.0
    } else if vertex.cache_position < 3 {
        // Among the vertices of the last drawn triangle
        LAST_TRIANGLE_SCORE
    } else {
        let scaler = 1.0 / (VERTEX_CACHE_SIZE - 3) as f32;
        let base = 1.0 - (vertex.cache_position as f32 - 3.0) * scaler;
        base.powf(CACHE_DECAY_POWER)
    };

    // Bonus for vertices with few remaining triangles, so lone corners get
    // finished off rather than left dangling
    score += VALENCE_BOOST_SCALE * (vertex.remaining_triangles.len() as f32).powf(-VALENCE_BOOST_POWER);

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn stripewise_order_is_a_permutation() {
        let coords = vec![
            Some((0, 0)),
            Some((1, 3)),
            Some((2, 1)),
            None,
            Some((0, 2)),
            None,
        ];
        let order = reorder_points_stripewise(&coords);
        let unique: HashSet<usize> = order.iter().copied().collect();
        assert_eq!(unique.len(), coords.len());
        // Gridless points retain relative order at the end
        assert_eq!(&order[4..], &[3, 5]);
    }

    #[test]
    fn stripewise_pairs_rows_into_bands() {
        let coords = vec![Some((0, 2)), Some((0, 0)), Some((1, 0)), Some((0, 1))];
        let order = reorder_points_stripewise(&coords);
        // Band {y=0,1} first (x-major), then band {y=2}
        assert_eq!(order, vec![1, 3, 2, 0]);
    }

    #[test]
    fn forsyth_order_is_a_permutation() {
        // A small fan: 6 triangles around vertex 0
        let triangles: Vec<[usize; 3]> = (1..7).map(|k| [0, k, (k % 6) + 1]).collect();
        let order = reorder_triangles_tom_forsyth(&triangles, 8);
        let unique: HashSet<usize> = order.iter().copied().collect();
        assert_eq!(unique.len(), triangles.len());
    }

    #[test]
    fn forsyth_keeps_adjacent_triangles_together() {
        // Two separate clusters of triangles; the pass should not
        // interleave them (each cluster's vertices stay cache-hot)
        let triangles = vec![
            [0, 1, 2],
            [1, 2, 3],
            [10, 11, 12],
            [11, 12, 13],
        ];
        let order = reorder_triangles_tom_forsyth(&triangles, 20);
        let position_0 = order.iter().position(|&t| t == 0).unwrap() as i32;
        let position_1 = order.iter().position(|&t| t == 1).unwrap() as i32;
        assert_eq!((position_0 - position_1).abs(), 1);
    }

    #[test]
    fn invert_permutation_roundtrips() {
        let order = vec![2, 0, 3, 1];
        let remap = invert_permutation(&order);
        assert_eq!(remap, vec![1, 3, 0, 2]);
        for (new_index, &old_index) in order.iter().enumerate() {
            assert_eq!(remap[old_index], new_index);
        }
    }
}
