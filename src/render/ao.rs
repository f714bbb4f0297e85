use std::f32::consts::{FRAC_PI_2, PI};
use std::sync::mpsc;
use std::sync::Arc;

use image::{GrayImage, Luma};
use na::{vector, Vector2};
use nalgebra as na;
use threadpool::ThreadPool;

use super::buffer::DepthBuffer;

/// 8 rays per pixel, 45 degrees apart in the image plane.
const DIRECTIONS: u32 = 8;
/// Unit-step march bound per ray.
const MARCH_LIMIT: f32 = 1000.0;
/// Power shaping the averaged unoccluded fraction into a contrasty factor.
const CONTRAST: f32 = 100.0;

/// Largest elevation angle seen marching the depth buffer from `origin` along
/// `direction` in unit steps, up to the march bound or the buffer edge.
fn max_elevation_angle(
    depth_buffer: &DepthBuffer,
    origin: Vector2<f32>,
    direction: Vector2<f32>,
) -> f32 {
    let width = depth_buffer.width() as f32;
    let height = depth_buffer.height() as f32;
    let origin_depth = depth_buffer.get(origin.x as i32, origin.y as i32);
    let mut max_angle: f32 = 0.0;
    let mut t: f32 = 0.0;
    while t < MARCH_LIMIT {
        let current = origin + direction * t;
        t += 1.0;
        if current.x >= width || current.y >= height || current.x < 0.0 || current.y < 0.0 {
            return max_angle;
        }
        let distance = (origin - current).norm();
        if distance < 1.0 {
            continue;
        }
        let elevation = depth_buffer.get(current.x as i32, current.y as i32) - origin_depth;
        max_angle = max_angle.max((elevation / distance).atan());
    }
    return max_angle;
}

/// Occlusion factors for one row of pixels; background pixels stay black.
fn occlusion_row(depth_buffer: &DepthBuffer, y: u32) -> Vec<u8> {
    let mut row = vec![0u8; depth_buffer.width() as usize];
    for x in 0..depth_buffer.width() {
        if depth_buffer.get(x as i32, y as i32) == DepthBuffer::BACKGROUND {
            continue;
        }
        let origin = vector![x as f32, y as f32];
        let mut total = 0.0;
        for i in 0..DIRECTIONS {
            let angle = 2.0 * PI * i as f32 / DIRECTIONS as f32;
            total += FRAC_PI_2
                - max_elevation_angle(depth_buffer, origin, vector![angle.cos(), angle.sin()]);
        }
        total /= FRAC_PI_2 * DIRECTIONS as f32;
        total = total.powf(CONTRAST);
        row[x as usize] = (total * 255.0) as u8;
    }
    return row;
}

/// Horizon-based ambient-occlusion post-process over a populated depth buffer.
///
/// Rows are independent reads of a finished buffer, so with `workers > 1` they are
/// fanned out to a worker pool and reassembled by row index; the output is identical
/// for any worker count. The pool needs 'static access, hence the clone behind an Arc.
pub fn ambient_occlusion(depth_buffer: &DepthBuffer, workers: usize) -> GrayImage {
    let width = depth_buffer.width();
    let height = depth_buffer.height();
    let mut result = GrayImage::new(width, height);

    if workers <= 1 {
        for y in 0..height {
            let row = occlusion_row(depth_buffer, y);
            for x in 0..width {
                result.put_pixel(x, y, Luma([row[x as usize]]));
            }
        }
        return result;
    }

    let shared = Arc::new(depth_buffer.clone());
    let pool = ThreadPool::new(workers);
    let (sender, receiver) = mpsc::channel();
    for y in 0..height {
        let shared = Arc::clone(&shared);
        let sender = sender.clone();
        pool.execute(move || {
            let row = occlusion_row(&shared, y);
            // The receiver outlives every worker, so the send cannot fail.
            sender.send((y, row)).unwrap();
        });
    }
    drop(sender);

    for (y, row) in receiver {
        for x in 0..width {
            result.put_pixel(x, y, Luma([row[x as usize]]));
        }
    }
    return result;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_buffer(size: u32, depth: f32) -> DepthBuffer {
        let mut depth_buffer = DepthBuffer::new(size, size);
        for y in 0..size as i32 {
            for x in 0..size as i32 {
                depth_buffer.set(x, y, depth);
            }
        }
        return depth_buffer;
    }

    #[test]
    fn flat_plane_is_unoccluded() {
        let depth_buffer = flat_buffer(64, 100.0);
        let ao = ambient_occlusion(&depth_buffer, 1);
        assert_eq!(ao.get_pixel(32, 32)[0], 255);
        assert_eq!(ao.get_pixel(1, 1)[0], 255);
        assert_eq!(ao.get_pixel(62, 62)[0], 255);
    }

    #[test]
    fn pit_floor_is_occluded() {
        let mut depth_buffer = flat_buffer(64, 200.0);
        // One pixel at the bottom of a deep pit.
        depth_buffer.set(32, 32, 0.0);
        let ao = ambient_occlusion(&depth_buffer, 1);
        assert!(ao.get_pixel(32, 32)[0] < 10);
        // The surrounding plane stays bright.
        assert_eq!(ao.get_pixel(5, 5)[0], 255);
    }

    #[test]
    fn background_pixels_stay_black() {
        let mut depth_buffer = DepthBuffer::new(16, 16);
        depth_buffer.set(8, 8, 50.0);
        let ao = ambient_occlusion(&depth_buffer, 1);
        assert_eq!(ao.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn threaded_output_matches_single_threaded() {
        let mut depth_buffer = flat_buffer(32, 100.0);
        for x in 0..32 {
            depth_buffer.set(x, 10, 100.0 + x as f32);
            depth_buffer.set(x, 20, 100.0 - x as f32);
        }
        depth_buffer.set(16, 16, 0.0);
        let single = ambient_occlusion(&depth_buffer, 1);
        let threaded = ambient_occlusion(&depth_buffer, 4);
        assert_eq!(single.as_raw(), threaded.as_raw());
    }
}
