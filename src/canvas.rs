use glam::Vec2;

/// Infinite canvas state with pan and zoom
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteCanvas {
    /// Pan offset in world space
    pub pan_offset: Vec2,
    /// Zoom level (0.25x to 4x)
    pub zoom_level: f32,
    /// Viewport rectangle in screen space
    pub viewport_rect: Rect,
}

pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 4.0;

impl InfiniteCanvas {
    pub fn new(viewport_width: f32, viewport_height: f32) -> Self {
        Self {
            pan_offset: Vec2::ZERO,
            zoom_level: 1.0,
            viewport_rect: Rect::new(0.0, 0.0, viewport_width, viewport_height),
        }
    }

    /// Place the viewport; `x`/`y` are the screen offset of the canvas area.
    pub fn update_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.viewport_rect = Rect::new(x, y, width, height);
    }

    pub fn pan(&mut self, delta: Vec2) {
        self.pan_offset -= delta / self.zoom_level;
    }

    pub fn zoom(&mut self, delta: f32, pivot: Vec2) {
        let world_pivot = self.screen_to_world(pivot);
        self.zoom_level = (self.zoom_level + delta).clamp(MIN_ZOOM, MAX_ZOOM);
        // Keep the world point under the pivot fixed on screen.
        let drifted = self.world_to_screen(world_pivot);
        self.pan_offset += (drifted - pivot) / self.zoom_level;
    }

    /// World origin sits at the top-left of the viewport when unpanned.
    pub fn world_to_screen(&self, world_pos: Vec2) -> Vec2 {
        (world_pos - self.pan_offset) * self.zoom_level + self.viewport_rect.min()
    }

    pub fn screen_to_world(&self, screen_pos: Vec2) -> Vec2 {
        (screen_pos - self.viewport_rect.min()) / self.zoom_level + self.pan_offset
    }

    pub fn rect_to_screen(&self, world: Rect) -> Rect {
        let min = self.world_to_screen(world.min());
        Rect::new(min.x, min.y, world.width * self.zoom_level, world.height * self.zoom_level)
    }

    /// Check if a world position is within the visible viewport (with margin)
    pub fn is_in_viewport(&self, world_pos: Vec2, margin: f32) -> bool {
        let screen_pos = self.world_to_screen(world_pos);
        self.viewport_rect.expand(margin).contains(screen_pos)
    }

    pub fn rect_in_viewport(&self, world: Rect) -> bool {
        self.rect_to_screen(world).intersects(&self.viewport_rect)
    }
}

/// Rectangle helper
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn min(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    /// True if `other` lies entirely inside `self`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.contains(other.min()) && self.contains(other.max())
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    pub fn expand(&self, margin: f32) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    pub fn translate(&self, delta: Vec2) -> Rect {
        Rect::new(self.x + delta.x, self.y + delta.y, self.width, self.height)
    }
}
