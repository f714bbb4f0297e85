use std::time;

use image::{imageops, DynamicImage, GrayImage, Luma, RgbImage};
use log::{debug, info};
use na::{vector, Vector3};
use nalgebra as na;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use show_image::{create_window, event, ImageInfo, ImageView, WindowOptions};

use crate::error::{RenderError, RenderResult};
use crate::model::Model;
use crate::render::ao::ambient_occlusion;
use crate::render::buffer::DepthBuffer;
use crate::render::context::RenderContext;
use crate::render::render_pass;
use crate::render::shader::{DarbouxShader, DepthShader, OcclusionShader, ShadowShader};

/// Deterministic viewpoints for the occlusion-accumulation pipeline.
const OCCLUSION_SEED: u64 = 9;
const OCCLUSION_VIEWPOINTS: usize = 8;
/// Side of the uv-space visibility texture.
const OCCLUSION_SIZE: u32 = 1024;

pub struct Params {
    pub width: u32,
    pub height: u32,
    pub asset_path: String,
    pub pipeline_name: String,
    /// Worker count for the ambient-occlusion post-process; 1 keeps it on this thread.
    pub workers: usize,
    pub preview: bool,
}

/// Loads the model, runs the selected pipeline and writes its artifacts to the
/// working directory. Returns the primary artifact for the optional preview window.
pub fn run(params: &Params) -> RenderResult<RgbImage> {
    let model = Model::load(&params.asset_path)?;
    let time_begin = time::Instant::now();
    let frame = match params.pipeline_name.as_str() {
        "full" => run_full(params, &model)?,
        "darboux" => run_darboux(params, &model)?,
        "shadow" => run_shadow(params, &model)?.0,
        "ao" => run_ao(params, &model)?,
        "occlusion" => run_occlusion(params, &model)?,
        name => return Err(RenderError::UnknownPipeline(name.to_string())),
    };
    info!(
        "{} pipeline finished in {:.2}s",
        params.pipeline_name,
        time_begin.elapsed().as_secs_f32()
    );
    return Ok(frame);
}

fn light_direction() -> Vector3<f32> {
    return vector![1.0, 1.0, 1.0];
}

/// Eye camera with the single-coefficient perspective projection.
fn eye_context(width: u32, height: u32) -> RenderResult<RenderContext> {
    let eye = vector![1.0, 1.0, 3.0];
    let center = vector![0.0, 0.0, 0.0];
    let mut ctx = RenderContext::new();
    ctx.look_at(eye, center, vector![0.0, 1.0, 0.0])?;
    ctx.set_projection(-1.0 / (eye - center).norm());
    ctx.set_viewport(width / 8, height / 8, width * 3 / 4, height * 3 / 4);
    return Ok(ctx);
}

/// Camera placed at the light source with an orthographic projection.
fn light_context(width: u32, height: u32) -> RenderResult<RenderContext> {
    let mut ctx = RenderContext::new();
    ctx.look_at(light_direction(), vector![0.0, 0.0, 0.0], vector![0.0, 1.0, 0.0])?;
    ctx.set_projection(0.0);
    ctx.set_viewport(width / 8, height / 8, width * 3 / 4, height * 3 / 4);
    return Ok(ctx);
}

/// Rasterization fills bottom-up relative to the file format, so artifacts flip once
/// before persisting.
fn save_rgb(image: &mut RgbImage, name: &str) -> RenderResult<()> {
    imageops::flip_vertical_in_place(image);
    image.save(name)?;
    debug!("wrote {}", name);
    return Ok(());
}

fn save_gray(image: &mut GrayImage, name: &str) -> RenderResult<()> {
    imageops::flip_vertical_in_place(image);
    image.save(name)?;
    debug!("wrote {}", name);
    return Ok(());
}

/// Shadow pipeline: light-view depth pass into the shadow buffer (saved as the depth
/// visualization artifact), then the eye-view specular pass testing against it.
/// Returns the frame and its depth buffer for the composed `full` pipeline.
fn run_shadow(params: &Params, model: &Model) -> RenderResult<(RgbImage, DepthBuffer)> {
    let light_ctx = light_context(params.width, params.height)?;
    let mut depth_image = RgbImage::new(params.width, params.height);
    let mut shadow_buffer = DepthBuffer::new(params.width, params.height);
    let mut depth_shader = DepthShader::new(&light_ctx);
    render_pass(model, &mut depth_shader, &light_ctx, &mut depth_image, &mut shadow_buffer);
    save_rgb(&mut depth_image, "depth.tga")?;

    let ctx = eye_context(params.width, params.height)?;
    let mut frame = RgbImage::new(params.width, params.height);
    let mut depth_buffer = DepthBuffer::new(params.width, params.height);
    let mut shader = ShadowShader::new(&ctx, &light_ctx, light_direction(), &shadow_buffer)?;
    render_pass(model, &mut shader, &ctx, &mut frame, &mut depth_buffer);
    save_rgb(&mut frame, "framebuffer.tga")?;
    return Ok((frame, depth_buffer));
}

/// Default composition: shadow pipeline followed by the ambient-occlusion
/// post-process over the main pass's depth buffer.
fn run_full(params: &Params, model: &Model) -> RenderResult<RgbImage> {
    let (frame, depth_buffer) = run_shadow(params, model)?;
    let mut ao_image = ambient_occlusion(&depth_buffer, params.workers);
    save_gray(&mut ao_image, "ao.tga")?;
    return Ok(frame);
}

/// Single eye-view pass with the Darboux lit shader.
fn run_darboux(params: &Params, model: &Model) -> RenderResult<RgbImage> {
    let ctx = eye_context(params.width, params.height)?;
    let mut frame = RgbImage::new(params.width, params.height);
    let mut depth_buffer = DepthBuffer::new(params.width, params.height);
    let mut shader = DarbouxShader::new(&ctx, light_direction())?;
    render_pass(model, &mut shader, &ctx, &mut frame, &mut depth_buffer);
    save_rgb(&mut frame, "framebuffer.tga")?;
    return Ok(frame);
}

/// Eye-view depth prepass plus the horizon-based ambient-occlusion post-process.
fn run_ao(params: &Params, model: &Model) -> RenderResult<RgbImage> {
    let ctx = eye_context(params.width, params.height)?;
    let mut prepass_image = RgbImage::new(params.width, params.height);
    let mut depth_buffer = DepthBuffer::new(params.width, params.height);
    let mut shader = DepthShader::new(&ctx);
    render_pass(model, &mut shader, &ctx, &mut prepass_image, &mut depth_buffer);

    let mut ao_image = ambient_occlusion(&depth_buffer, params.workers);
    save_gray(&mut ao_image, "ao.tga")?;
    return Ok(DynamicImage::ImageLuma8(ao_image).to_rgb8());
}

/// A point on the upper unit hemisphere, uniform up to the y flip.
fn random_hemisphere_point(rng: &mut StdRng) -> Vector3<f32> {
    let u: f32 = rng.random();
    let v: f32 = rng.random();
    let theta = 2.0 * std::f32::consts::PI * u;
    let phi = (2.0 * v - 1.0).acos();
    let mut point = vector![phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos()];
    point.y = point.y.abs();
    return point;
}

/// Occlusion accumulation: for each seeded random viewpoint, an orthographic depth
/// prepass followed by a marking pass that flags visible uv texels, with a running
/// per-texel average across viewpoints building the uv-space visibility texture.
fn run_occlusion(params: &Params, model: &Model) -> RenderResult<RgbImage> {
    let mut rng = StdRng::seed_from_u64(OCCLUSION_SEED);
    let mut totals = vec![0.0f32; (OCCLUSION_SIZE * OCCLUSION_SIZE) as usize];

    let mut prepass_image = RgbImage::new(params.width, params.height);
    let mut prepass_depth = DepthBuffer::new(params.width, params.height);
    let mut frame = RgbImage::new(params.width, params.height);
    let mut depth_buffer = DepthBuffer::new(params.width, params.height);
    let mut occlusion_image = GrayImage::new(OCCLUSION_SIZE, OCCLUSION_SIZE);

    for iteration in 1..=OCCLUSION_VIEWPOINTS {
        let viewpoint = random_hemisphere_point(&mut rng);
        let mut ctx = RenderContext::new();
        ctx.look_at(viewpoint, vector![0.0, 0.0, 0.0], vector![0.0, 1.0, 0.0])?;
        ctx.set_projection(0.0);
        ctx.set_viewport(
            params.width / 8,
            params.height / 8,
            params.width * 3 / 4,
            params.height * 3 / 4,
        );

        prepass_depth.clear();
        let mut depth_shader = DepthShader::new(&ctx);
        render_pass(model, &mut depth_shader, &ctx, &mut prepass_image, &mut prepass_depth);

        depth_buffer.clear();
        occlusion_image.fill(0);
        let mut shader = OcclusionShader::new(&ctx, &prepass_depth, &mut occlusion_image);
        render_pass(model, &mut shader, &ctx, &mut frame, &mut depth_buffer);

        for (total, texel) in totals.iter_mut().zip(occlusion_image.pixels()) {
            *total = (*total * (iteration - 1) as f32 + texel[0] as f32) / iteration as f32;
        }
        debug!("occlusion viewpoint {}/{} done", iteration, OCCLUSION_VIEWPOINTS);
    }

    let mut result = GrayImage::new(OCCLUSION_SIZE, OCCLUSION_SIZE);
    for (pixel, total) in result.pixels_mut().zip(&totals) {
        *pixel = Luma([*total as u8]);
    }
    save_gray(&mut result, "occlusion.tga")?;
    return Ok(DynamicImage::ImageLuma8(result).to_rgb8());
}

/// Helper, defining exit event to be an Escape key release or a window close.
fn is_exit_event(window_event: &event::WindowEvent) -> bool {
    return match window_event {
        event::WindowEvent::KeyboardInput(event) => {
            event.input.key_code == Some(event::VirtualKeyCode::Escape)
                && event.input.state.is_released()
        }
        event::WindowEvent::CloseRequested(_) => true,
        _ => false,
    };
}

/// Displays the primary artifact in a window until Escape or close. Must run inside
/// `show_image::run_context`; headless runs never get here.
pub fn preview(frame: &RgbImage) -> RenderResult<()> {
    let window_options = WindowOptions {
        size: Some([frame.width(), frame.height()]),
        ..Default::default()
    };
    let window = create_window("softgl", window_options)
        .map_err(|error| RenderError::Preview(error.to_string()))?;
    let image_data = ImageView::new(ImageInfo::rgb8(frame.width(), frame.height()), frame.as_raw());
    window
        .set_image("frame", image_data)
        .map_err(|error| RenderError::Preview(error.to_string()))?;
    let event_channel = window
        .event_channel()
        .map_err(|error| RenderError::Preview(error.to_string()))?;

    // Blocking; channel disconnect means the window is already gone.
    for window_event in event_channel {
        if is_exit_event(&window_event) {
            break;
        }
    }
    return Ok(());
}
