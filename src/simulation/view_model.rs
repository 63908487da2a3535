use crate::floating_type_mod::FT;
use crate::simulation::{vec2f, V2};

const MIN_ZOOM: FT = 0.0001;
const MAX_ZOOM: FT = 2000.0;

// Visible world height at zoom 1.0
const INITIAL_VISIBLE_WORLD_HEIGHT: FT = 100.0;

/// The camera: zoom, world position, canvas size, and the world↔screen
/// transform derived from them. Screen origin is top-left, world y grows
/// upward.
#[derive(Debug, Clone)]
pub struct ViewModel {
    zoom: FT,
    camera_world_position: V2,
    canvas_width: FT,
    canvas_height: FT,
}

impl ViewModel {
    pub fn new(canvas_width: u32, canvas_height: u32) -> Self {
        ViewModel {
            zoom: 1.0,
            camera_world_position: vec2f(0., 0.),
            canvas_width: canvas_width as FT,
            canvas_height: canvas_height as FT,
        }
    }

    pub fn zoom(&self) -> FT {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: FT) -> FT {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.zoom
    }

    pub fn camera_world_position(&self) -> V2 {
        self.camera_world_position
    }

    pub fn set_camera_world_position(&mut self, position: V2) {
        self.camera_world_position = position;
    }

    pub fn set_canvas_size(&mut self, width: u32, height: u32) {
        self.canvas_width = width as FT;
        self.canvas_height = height as FT;
    }

    pub fn visible_world_height(&self) -> FT {
        INITIAL_VISIBLE_WORLD_HEIGHT / self.zoom
    }

    pub fn visible_world_width(&self) -> FT {
        self.visible_world_height() * self.canvas_width / self.canvas_height
    }

    fn pixels_per_world_unit(&self) -> FT {
        self.canvas_height / self.visible_world_height()
    }

    pub fn screen_to_world(&self, screen: V2) -> V2 {
        let scale = self.pixels_per_world_unit();
        vec2f(
            self.camera_world_position.x + (screen.x - self.canvas_width / 2.0) / scale,
            self.camera_world_position.y - (screen.y - self.canvas_height / 2.0) / scale,
        )
    }

    pub fn world_to_screen(&self, world: V2) -> V2 {
        let scale = self.pixels_per_world_unit();
        vec2f(
            (world.x - self.camera_world_position.x) * scale + self.canvas_width / 2.0,
            -(world.y - self.camera_world_position.y) * scale + self.canvas_height / 2.0,
        )
    }

    /// Screen offsets scale into world offsets without the camera origin.
    pub fn screen_offset_to_world_offset(&self, screen_offset: V2) -> V2 {
        let scale = self.pixels_per_world_unit();
        vec2f(screen_offset.x / scale, -screen_offset.y / scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_world_roundtrip_within_one_pixel() {
        let mut view = ViewModel::new(1024, 768);
        view.set_zoom(1.7);
        view.set_camera_world_position(vec2f(13.0, -7.5));

        for &(x, y) in &[(0., 0.), (1024., 768.), (512., 384.), (17., 700.)] {
            let screen = vec2f(x, y);
            let roundtrip = view.world_to_screen(view.screen_to_world(screen));
            assert!((roundtrip - screen).norm() < 1.0, "{:?} -> {:?}", screen, roundtrip);
        }
    }

    #[test]
    fn screen_center_is_the_camera_position() {
        let mut view = ViewModel::new(800, 600);
        view.set_camera_world_position(vec2f(42., 10.));
        let world = view.screen_to_world(vec2f(400., 300.));
        assert!((world - vec2f(42., 10.)).norm() < 1e-4);
    }

    #[test]
    fn zooming_in_shrinks_the_visible_world() {
        let mut view = ViewModel::new(800, 600);
        let before = view.visible_world_width();
        view.set_zoom(2.0);
        assert!(view.visible_world_width() < before);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut view = ViewModel::new(800, 600);
        assert_eq!(view.set_zoom(1.0e9), MAX_ZOOM);
        assert_eq!(view.set_zoom(0.0), MIN_ZOOM);
    }

    #[test]
    fn screen_y_grows_downward() {
        let view = ViewModel::new(800, 600);
        let high = view.screen_to_world(vec2f(400., 0.));
        let low = view.screen_to_world(vec2f(400., 600.));
        assert!(high.y > low.y);
    }
}
