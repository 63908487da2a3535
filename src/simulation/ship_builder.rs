use crate::floating_type_mod::FT;
use crate::simulation::electrical_elements::ElectricalElements;
use crate::simulation::game_parameters::GameParameters;
use crate::simulation::materials::{
    ColorKey, ElectricalMaterialId, GameError, MaterialDatabase, StructuralMaterialId,
};
use crate::simulation::points::Points;
use crate::simulation::reordering::{
    invert_permutation, reorder_points_stripewise, reorder_springs_for_points, reorder_triangles_tom_forsyth,
};
use crate::simulation::ship_definition::{ShipDefinition, ShipMetadata};
use crate::simulation::springs::{SpringAttributes, Springs};
use crate::simulation::triangles::Triangles;
use crate::simulation::{vec2f, ElementIndex, V2, V4};
use image::RgbImage;
use std::collections::HashMap;

/// The containers of one built ship, ready to be handed to `Ship::new`.
pub struct ShipParts {
    pub points: Points,
    pub springs: Springs,
    pub triangles: Triangles,
    pub electrical_elements: ElectricalElements,
    pub metadata: ShipMetadata,
}

struct PointInfo {
    position: V2,
    texture_coordinates: V2,
    render_color: V4,
    structural_material_id: StructuralMaterialId,
    electrical_material_id: Option<ElectricalMaterialId>,
    is_rope: bool,
    is_leaking: bool,
    // Pixel coordinates; rope fill points have none
    grid_coordinates: Option<(u32, u32)>,
}

struct RopeSegment {
    endpoints: Vec<usize>,
}

/// Builds the particle/spring/triangle mesh out of a ship definition:
/// one particle per non-background pixel, one spring per adjacent pixel
/// pair (8-neighborhood), one or two triangles per 2x2 block, rope chains
/// between rope-layer endpoint pairs, electrical decorations, and finally
/// the reordering pass for vertex-cache and memory locality.
pub fn build(
    definition: &ShipDefinition,
    material_database: &MaterialDatabase,
    game_parameters: &GameParameters,
) -> Result<ShipParts, GameError> {
    let structural = &definition.structural_layer;
    let width = structural.width();
    let height = structural.height();
    let background = material_database.background_color();

    //
    // 1. Instantiate particles from non-background pixels
    //

    let mut point_infos: Vec<PointInfo> = Vec::new();
    let mut point_index_matrix: HashMap<(u32, u32), usize> = HashMap::new();

    for y in 0..height {
        for x in 0..width {
            let pixel = structural.get_pixel(x, y);
            let color = ColorKey::new(pixel[0], pixel[1], pixel[2]);
            if color == background {
                continue;
            }

            let material_id = material_database
                .structural_by_color(color)
                .ok_or(GameError::MaterialNotFound(color, x, y))?;
            let material = material_database.structural(material_id);

            point_index_matrix.insert((x, y), point_infos.len());
            point_infos.push(PointInfo {
                position: pixel_to_world(x, y, width, height, definition.metadata.offset),
                texture_coordinates: vec2f(
                    (x as FT + 0.5) / width as FT,
                    (y as FT + 0.5) / height as FT,
                ),
                render_color: material.render_color(),
                structural_material_id: material_id,
                electrical_material_id: None,
                is_rope: material.is_rope,
                // Ropes leak by default
                is_leaking: material.is_rope,
                grid_coordinates: Some((x, y)),
            });
        }
    }

    //
    // 2. Springs over the 8-neighborhood; half the directions cover every
    //    adjacent pair exactly once
    //

    let mut spring_endpoints: Vec<(usize, usize)> = Vec::new();
    let mut edge_set: HashMap<(usize, usize), usize> = HashMap::new();

    const DIRECTIONS: [(i64, i64); 4] = [(1, 0), (-1, 1), (0, 1), (1, 1)];

    for (&(x, y), &point_a) in point_index_matrix.iter() {
        for (dx, dy) in DIRECTIONS {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 {
                continue;
            }
            if let Some(&point_b) = point_index_matrix.get(&(nx as u32, ny as u32)) {
                let key = (point_a.min(point_b), point_a.max(point_b));
                edge_set.entry(key).or_insert_with(|| {
                    spring_endpoints.push((point_a, point_b));
                    spring_endpoints.len() - 1
                });
            }
        }
    }

    //
    // 3. Triangles per 2x2 block: two on a full block (split along one
    //    diagonal so no two triangles overlap), one when only three
    //    particles are present. Every edge is an existing spring.
    //

    let mut triangle_vertices: Vec<[usize; 3]> = Vec::new();

    for y in 0..height.saturating_sub(1) {
        for x in 0..width.saturating_sub(1) {
            let a = point_index_matrix.get(&(x, y)).copied();
            let b = point_index_matrix.get(&(x + 1, y)).copied();
            let c = point_index_matrix.get(&(x, y + 1)).copied();
            let d = point_index_matrix.get(&(x + 1, y + 1)).copied();

            match (a, b, c, d) {
                (Some(a), Some(b), Some(c), Some(d)) => {
                    triangle_vertices.push([a, b, d]);
                    triangle_vertices.push([a, d, c]);
                }
                (Some(a), Some(b), Some(c), None) => triangle_vertices.push([a, b, c]),
                (Some(a), Some(b), None, Some(d)) => triangle_vertices.push([a, b, d]),
                (Some(a), None, Some(c), Some(d)) => triangle_vertices.push([a, d, c]),
                (None, Some(b), Some(c), Some(d)) => triangle_vertices.push([b, d, c]),
                _ => {}
            }
        }
    }

    //
    // 4. Rope chains between rope-layer endpoint pairs
    //

    if let Some(ropes_layer) = &definition.ropes_layer {
        append_ropes(
            ropes_layer,
            background,
            material_database,
            width,
            height,
            definition.metadata.offset,
            &point_index_matrix,
            &mut point_infos,
            &mut spring_endpoints,
        )?;
    }

    //
    // 5. Electrical decorations; an electrical pixel over background is a
    //    malformed ship
    //

    if let Some(electrical_layer) = &definition.electrical_layer {
        for y in 0..electrical_layer.height().min(height) {
            for x in 0..electrical_layer.width().min(width) {
                let pixel = electrical_layer.get_pixel(x, y);
                let color = ColorKey::new(pixel[0], pixel[1], pixel[2]);
                if color == background {
                    continue;
                }

                let material_id = material_database
                    .electrical_by_color(color)
                    .ok_or(GameError::ElectricalMaterialNotFound(color, x, y))?;

                let point = point_index_matrix
                    .get(&(x, y))
                    .copied()
                    .ok_or(GameError::ElectricalOnBackground(x, y))?;

                point_infos[point].electrical_material_id = Some(material_id);
            }
        }
    }

    //
    // 6. Reordering pass: stripe order for points, endpoint order for
    //    springs, Tom Forsyth for triangles
    //

    let grid_coordinates: Vec<Option<(u32, u32)>> = point_infos.iter().map(|p| p.grid_coordinates).collect();
    let point_order = reorder_points_stripewise(&grid_coordinates);
    let point_remap = invert_permutation(&point_order);

    let spring_order = reorder_springs_for_points(&spring_endpoints, &point_remap);

    let remapped_triangles: Vec<[usize; 3]> = triangle_vertices
        .iter()
        .map(|t| [point_remap[t[0]], point_remap[t[1]], point_remap[t[2]]])
        .collect();
    let triangle_order = reorder_triangles_tom_forsyth(&remapped_triangles, point_infos.len());

    //
    // 7. Create the containers in final order and wire up connectivity
    //

    let mut points = Points::new(point_infos.len(), game_parameters);
    let mut electrical_decorations: Vec<(ElementIndex, ElectricalMaterialId)> = Vec::new();

    for &old_index in &point_order {
        let info = &point_infos[old_index];
        let material = material_database.structural(info.structural_material_id);
        let new_index = points.add_ship_particle(
            info.position,
            info.structural_material_id,
            material,
            info.electrical_material_id,
            info.is_rope,
            info.is_leaking,
            info.render_color,
            info.texture_coordinates,
        );

        if let Some(electrical_id) = info.electrical_material_id {
            points.v.electrical_element[new_index as usize] = electrical_decorations.len() as ElementIndex;
            electrical_decorations.push((new_index, electrical_id));
        }
    }

    let mut spring_attributes: Vec<SpringAttributes> = Vec::with_capacity(spring_endpoints.len());
    for &old_spring in &spring_order {
        let (old_a, old_b) = spring_endpoints[old_spring];
        let a = point_remap[old_a] as ElementIndex;
        let b = point_remap[old_b] as ElementIndex;

        let material_a = material_database.structural(point_infos[old_a].structural_material_id);
        let material_b = material_database.structural(point_infos[old_b].structural_material_id);

        spring_attributes.push(SpringAttributes {
            endpoint_a_index: a,
            endpoint_b_index: b,
            is_rope: material_a.is_rope && material_b.is_rope,
            material_stiffness: (material_a.stiffness + material_b.stiffness) * 0.5,
            material_strength: (material_a.strength + material_b.strength) * 0.5,
            water_permeability: if material_a.is_hull && material_b.is_hull { 0.0 } else { 1.0 },
            material_thermal_conductivity: (material_a.thermal_conductivity + material_b.thermal_conductivity) * 0.5,
        });
    }

    let mut springs = Springs::new(spring_attributes, &points, game_parameters);

    for s in springs.springs() {
        let a = springs.v.endpoint_a_index[s as usize];
        let b = springs.v.endpoint_b_index[s as usize];
        points.v.connected_springs[a as usize].connect(s, b, true);
        points.v.connected_springs[b as usize].connect(s, a, false);
    }

    // Edge lookup in final index space for sub-spring resolution
    let mut edge_to_spring: HashMap<(ElementIndex, ElementIndex), ElementIndex> = HashMap::new();
    for s in springs.springs() {
        let a = springs.v.endpoint_a_index[s as usize];
        let b = springs.v.endpoint_b_index[s as usize];
        edge_to_spring.insert((a.min(b), a.max(b)), s);
    }

    let mut triangle_endpoints: Vec<(ElementIndex, ElementIndex, ElementIndex)> = Vec::new();
    let mut triangle_sub_springs: Vec<[ElementIndex; 3]> = Vec::new();
    for &old_triangle in &triangle_order {
        let [pa, pb, pc] = remapped_triangles[old_triangle];
        let (pa, pb, pc) = (pa as ElementIndex, pb as ElementIndex, pc as ElementIndex);

        let edge = |p: ElementIndex, q: ElementIndex| -> ElementIndex {
            *edge_to_spring
                .get(&(p.min(q), p.max(q)))
                .expect("triangle edge must be an existing spring")
        };

        triangle_endpoints.push((pa, pb, pc));
        triangle_sub_springs.push([edge(pa, pb), edge(pb, pc), edge(pc, pa)]);
    }

    let triangles = Triangles::new(triangle_endpoints, triangle_sub_springs.clone());

    for t in triangles.triangles() {
        let (pa, pb, pc) = {
            let i = t as usize;
            (
                triangles.v.point_a_index[i],
                triangles.v.point_b_index[i],
                triangles.v.point_c_index[i],
            )
        };

        points.v.connected_triangles[pa as usize].connect(t, true);
        points.v.connected_triangles[pb as usize].connect(t, false);
        points.v.connected_triangles[pc as usize].connect(t, false);

        for sub_spring in triangle_sub_springs[t as usize] {
            springs.register_super_triangle(sub_spring, t);
        }
    }

    // The factory graph: the live graph as built, before any destruction
    points.v.factory_connected_springs = points.v.connected_springs.clone();
    points.v.factory_connected_triangles = points.v.connected_triangles.clone();

    let electrical_elements = ElectricalElements::new(electrical_decorations);

    tracing::info!(
        ship_name = %definition.metadata.ship_name,
        points = points.ship_point_count(),
        springs = springs.element_count(),
        triangles = triangles.element_count(),
        electrical = electrical_elements.element_count(),
        "ship mesh built"
    );

    Ok(ShipParts {
        points,
        springs,
        triangles,
        electrical_elements,
        metadata: definition.metadata.clone(),
    })
}

fn pixel_to_world(x: u32, y: u32, width: u32, height: u32, offset: V2) -> V2 {
    offset + vec2f(x as FT - width as FT / 2.0, (height - 1 - y) as FT)
}

#[allow(clippy::too_many_arguments)]
fn append_ropes(
    ropes_layer: &RgbImage,
    background: ColorKey,
    material_database: &MaterialDatabase,
    width: u32,
    height: u32,
    offset: V2,
    point_index_matrix: &HashMap<(u32, u32), usize>,
    point_infos: &mut Vec<PointInfo>,
    spring_endpoints: &mut Vec<(usize, usize)>,
) -> Result<(), GameError> {
    //
    // Gather endpoint pairs: each distinct color in the rope layer marks
    // the two ends of one rope
    //

    let mut segments: HashMap<ColorKey, RopeSegment> = HashMap::new();

    for y in 0..ropes_layer.height().min(height) {
        for x in 0..ropes_layer.width().min(width) {
            let pixel = ropes_layer.get_pixel(x, y);
            let color = ColorKey::new(pixel[0], pixel[1], pixel[2]);
            if color == background {
                continue;
            }

            let segment = segments.entry(color).or_insert_with(|| RopeSegment { endpoints: Vec::new() });

            // Anchor on an existing particle, or create a rope particle
            let point = match point_index_matrix.get(&(x, y)) {
                Some(&p) => p,
                None => {
                    let rope_material = material_database.rope_material();
                    point_infos.push(PointInfo {
                        position: pixel_to_world(x, y, width, height, offset),
                        texture_coordinates: vec2f(
                            (x as FT + 0.5) / width as FT,
                            (y as FT + 0.5) / height as FT,
                        ),
                        render_color: color.render_color(),
                        structural_material_id: material_database.rope_material_id(),
                        electrical_material_id: None,
                        is_rope: true,
                        is_leaking: true,
                        grid_coordinates: Some((x, y)),
                    });
                    point_infos.len() - 1
                }
            };

            segment.endpoints.push(point);
        }
    }

    //
    // Lay a chain of rope particles between each endpoint pair
    //

    let mut colors: Vec<ColorKey> = segments.keys().copied().collect();
    colors.sort_by_key(|c| (c.r, c.g, c.b));

    for color in colors {
        let segment = &segments[&color];
        if segment.endpoints.len() != 2 {
            return Err(GameError::MalformedRopeSegment(color, segment.endpoints.len()));
        }

        let start = point_infos[segment.endpoints[0]].position;
        let end = point_infos[segment.endpoints[1]].position;
        let span = end - start;
        let chain_links = span.norm().ceil().max(1.) as usize;

        let rope_material_id = material_database.rope_material_id();
        let mut previous = segment.endpoints[0];
        for k in 1..chain_links {
            let t = k as FT / chain_links as FT;
            point_infos.push(PointInfo {
                position: start + span * t,
                texture_coordinates: nalgebra::zero(),
                render_color: color.render_color(),
                structural_material_id: rope_material_id,
                electrical_material_id: None,
                is_rope: true,
                is_leaking: true,
                grid_coordinates: None,
            });
            let current = point_infos.len() - 1;
            spring_endpoints.push((previous, current));
            previous = current;
        }
        spring_endpoints.push((previous, segment.endpoints[1]));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::materials::test_fixtures::test_database;
    use crate::simulation::points::EphemeralType;
    use image::Rgb;

    const HULL: Rgb<u8> = Rgb([0x40, 0x40, 0x50]);
    const WOOD: Rgb<u8> = Rgb([0xc2, 0x9a, 0x5b]);
    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn metadata() -> ShipMetadata {
        ShipMetadata {
            ship_name: "Test Ship".to_string(),
            author: None,
            offset: vec2f(0., 0.),
        }
    }

    fn solid_image(width: u32, height: u32, color: Rgb<u8>) -> RgbImage {
        RgbImage::from_pixel(width, height, color)
    }

    #[test]
    fn full_square_produces_expected_mesh() {
        let db = test_database();
        let params = GameParameters::default();
        let definition = ShipDefinition::from_images(solid_image(3, 3, HULL), None, None, metadata());

        let parts = build(&definition, &db, &params).unwrap();

        assert_eq!(parts.points.ship_point_count(), 9);
        // 6 horizontal + 6 vertical + 8 diagonal
        assert_eq!(parts.springs.element_count(), 20);
        // Two triangles per full 2x2 block
        assert_eq!(parts.triangles.element_count(), 8);

        // Every triangle edge is a live spring, and no spring borders more
        // than two triangles
        for s in parts.springs.springs() {
            assert!(parts.springs.v.super_triangles[s as usize].len() <= 2);
        }
        for t in parts.triangles.triangles() {
            for sub in parts.triangles.v.sub_springs[t as usize] {
                assert_ne!(sub, crate::simulation::NONE_ELEMENT_INDEX);
                assert!(!parts.springs.is_destroyed(sub));
            }
        }
    }

    #[test]
    fn connectivity_is_symmetric_and_factory_matches_live() {
        let db = test_database();
        let params = GameParameters::default();
        let definition = ShipDefinition::from_images(solid_image(4, 2, WOOD), None, None, metadata());

        let parts = build(&definition, &db, &params).unwrap();

        for s in parts.springs.springs() {
            let a = parts.springs.v.endpoint_a_index[s as usize];
            let b = parts.springs.v.endpoint_b_index[s as usize];
            assert!(parts.points.v.connected_springs[a as usize]
                .springs
                .contains(|c| c.spring_index == s && c.other_endpoint_index == b));
            assert!(parts.points.v.connected_springs[b as usize]
                .springs
                .contains(|c| c.spring_index == s && c.other_endpoint_index == a));
        }

        for p in 0..parts.points.ship_point_count() {
            assert_eq!(
                parts.points.v.factory_connected_springs[p].springs.len(),
                parts.points.v.connected_springs[p].springs.len()
            );
        }
    }

    #[test]
    fn unknown_structural_color_fails_the_load() {
        let db = test_database();
        let params = GameParameters::default();
        let mut image = solid_image(2, 2, WOOD);
        image.put_pixel(1, 1, Rgb([1, 2, 3]));
        let definition = ShipDefinition::from_images(image, None, None, metadata());

        assert!(matches!(
            build(&definition, &db, &params),
            Err(GameError::MaterialNotFound(..))
        ));
    }

    #[test]
    fn rope_layer_lays_a_leaking_chain() {
        let db = test_database();
        let params = GameParameters::default();

        let structural = solid_image(8, 1, BLACK);
        let mut structural = structural;
        structural.put_pixel(0, 0, WOOD);
        structural.put_pixel(7, 0, WOOD);

        let mut ropes = solid_image(8, 1, BLACK);
        let rope_color = Rgb([0x12, 0x34, 0x56]);
        ropes.put_pixel(0, 0, rope_color);
        ropes.put_pixel(7, 0, rope_color);

        let definition = ShipDefinition::from_images(structural, Some(ropes), None, metadata());
        let parts = build(&definition, &db, &params).unwrap();

        // The two wood anchors plus interior rope particles
        assert!(parts.points.ship_point_count() > 2);
        // Chain of springs between the anchors
        assert_eq!(parts.springs.element_count(), parts.points.ship_point_count() - 1);

        // All interior chain particles are leaking rope
        for p in 2..parts.points.ship_point_count() {
            assert!(parts.points.v.is_rope[p]);
            assert!(parts.points.v.is_leaking[p]);
        }
    }

    #[test]
    fn rope_color_with_one_endpoint_is_malformed() {
        let db = test_database();
        let params = GameParameters::default();

        let structural = solid_image(4, 1, WOOD);
        let mut ropes = solid_image(4, 1, BLACK);
        ropes.put_pixel(0, 0, Rgb([9, 9, 9]));

        let definition = ShipDefinition::from_images(structural, Some(ropes), None, metadata());
        assert!(matches!(
            build(&definition, &db, &params),
            Err(GameError::MalformedRopeSegment(_, 1))
        ));
    }

    #[test]
    fn electrical_pixel_on_background_fails_the_load() {
        let db = test_database();
        let params = GameParameters::default();

        let mut structural = solid_image(2, 2, WOOD);
        structural.put_pixel(1, 1, BLACK);
        let mut electrical = solid_image(2, 2, BLACK);
        electrical.put_pixel(1, 1, Rgb([0xff, 0xff, 0x80]));

        let definition = ShipDefinition::from_images(structural, None, Some(electrical), metadata());
        assert!(matches!(
            build(&definition, &db, &params),
            Err(GameError::ElectricalOnBackground(1, 1))
        ));
    }

    #[test]
    fn electrical_decorations_land_on_their_particles() {
        let db = test_database();
        let params = GameParameters::default();

        let structural = solid_image(2, 1, WOOD);
        let mut electrical = solid_image(2, 1, BLACK);
        electrical.put_pixel(0, 0, Rgb([0xff, 0xff, 0x80])); // lamp

        let definition = ShipDefinition::from_images(structural, None, Some(electrical), metadata());
        let parts = build(&definition, &db, &params).unwrap();

        assert_eq!(parts.electrical_elements.element_count(), 1);
        let element = &parts.electrical_elements.elements()[0];
        assert!(parts.points.v.electrical_material[element.point_index as usize].is_some());
    }

    #[test]
    fn bottom_row_of_the_image_is_world_y_zero() {
        let db = test_database();
        let params = GameParameters::default();
        let definition = ShipDefinition::from_images(solid_image(1, 3, WOOD), None, None, metadata());

        let parts = build(&definition, &db, &params).unwrap();
        let mut ys: Vec<FT> = (0..3).map(|p| parts.points.v.position[p].y).collect();
        ys.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(ys, vec![0., 1., 2.]);
    }

    #[test]
    fn no_ephemeral_slot_is_touched_by_construction() {
        let db = test_database();
        let params = GameParameters::default();
        let definition = ShipDefinition::from_images(solid_image(3, 3, WOOD), None, None, metadata());
        let parts = build(&definition, &db, &params).unwrap();

        for p in parts.points.ephemeral_points() {
            assert_eq!(parts.points.v.ephemeral_state[p as usize].kind(), EphemeralType::None);
        }
    }
}
