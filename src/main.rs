use std::env;

use softgl::app;
use softgl::error::RenderError;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 800;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Default values.
    let mut asset_path = String::from("assets/diablo3_pose.obj");
    let mut pipeline_name = String::from("full");
    let mut workers: usize = 1;
    let mut preview = false;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-p" => {
                asset_path = args[i + 1].clone();
                i += 1;
            }
            "-s" => {
                pipeline_name = args[i + 1].clone();
                i += 1;
            }
            "-j" => {
                workers = args[i + 1].parse()?;
                i += 1;
            }
            "--preview" => {
                preview = true;
            }
            _ => (),
        }
        i += 1;
    }

    let params = app::Params {
        width: WIDTH,
        height: HEIGHT,
        asset_path,
        pipeline_name,
        workers,
        preview,
    };

    if params.preview {
        // The windowing context owns the process from here on and never returns.
        show_image::run_context(move || -> Result<(), RenderError> {
            let frame = app::run(&params)?;
            app::preview(&frame)?;
            return Ok(());
        });
    }

    app::run(&params)?;

    return Ok(());
}
