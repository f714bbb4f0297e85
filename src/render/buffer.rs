/// Dense per-pixel depth storage shared between the rasterizer and the multi-pass
/// techniques. Accessors are bounds-checked: a mis-projected vertex can never write
/// outside the buffer, and reads outside it see the background depth.
#[derive(Clone)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl DepthBuffer {
    /// Most distant representable depth; larger values are closer to the camera.
    pub const BACKGROUND: f32 = f32::MIN;

    pub fn new(width: u32, height: u32) -> Self {
        return Self {
            width,
            height,
            values: vec![Self::BACKGROUND; (width * height) as usize],
        };
    }

    pub fn width(&self) -> u32 {
        return self.width;
    }

    pub fn height(&self) -> u32 {
        return self.height;
    }

    /// Out of bounds reads return the background depth.
    pub fn get(&self, x: i32, y: i32) -> f32 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return Self::BACKGROUND;
        }
        return self.values[(x + y * self.width as i32) as usize];
    }

    /// Out of bounds writes are dropped.
    pub fn set(&mut self, x: i32, y: i32, value: f32) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        self.values[(x + y * self.width as i32) as usize] = value;
    }

    /// Lookup at a float coordinate, rounded and clamped into bounds. Used for shadow
    /// buffer reads, where a transformed fragment coordinate can land slightly outside.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x = (x.round() as i32).clamp(0, self.width as i32 - 1);
        let y = (y.round() as i32).clamp(0, self.height as i32 - 1);
        return self.values[(x + y * self.width as i32) as usize];
    }

    /// Resets every value to the background depth for reuse in the next pass.
    pub fn clear(&mut self) {
        for value in &mut self.values {
            *value = Self::BACKGROUND;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_background_depth() {
        let depth_buffer = DepthBuffer::new(4, 4);
        assert_eq!(depth_buffer.get(0, 0), DepthBuffer::BACKGROUND);
        assert_eq!(depth_buffer.get(3, 3), DepthBuffer::BACKGROUND);
    }

    #[test]
    fn out_of_bounds_reads_and_writes_are_safe() {
        let mut depth_buffer = DepthBuffer::new(4, 4);
        depth_buffer.set(-1, 0, 1.0);
        depth_buffer.set(0, 4, 1.0);
        depth_buffer.set(100, 100, 1.0);
        assert_eq!(depth_buffer.get(-1, 0), DepthBuffer::BACKGROUND);
        assert_eq!(depth_buffer.get(4, 0), DepthBuffer::BACKGROUND);
        assert_eq!(depth_buffer.get(0, 0), DepthBuffer::BACKGROUND);
    }

    #[test]
    fn sample_clamps_into_bounds() {
        let mut depth_buffer = DepthBuffer::new(4, 4);
        depth_buffer.set(3, 3, 42.0);
        depth_buffer.set(0, 0, 7.0);
        assert_eq!(depth_buffer.sample(100.0, 100.0), 42.0);
        assert_eq!(depth_buffer.sample(-5.0, -5.0), 7.0);
        assert_eq!(depth_buffer.sample(2.6, 3.2), 42.0);
    }

    #[test]
    fn clear_restores_background() {
        let mut depth_buffer = DepthBuffer::new(2, 2);
        depth_buffer.set(1, 1, 3.0);
        depth_buffer.clear();
        assert_eq!(depth_buffer.get(1, 1), DepthBuffer::BACKGROUND);
    }
}
