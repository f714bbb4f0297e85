/// Convenience result type used across the crate.
pub type RenderResult<T> = Result<T, RenderError>;

/// Fatal error taxonomy. Per-triangle and per-pixel degeneracies are not errors -
/// the rasterizer and shaders recover from those by skipping the offending work.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("obj parse error: {0}")]
    ObjParse(#[from] obj::ObjError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unknown pipeline name: {0}")]
    UnknownPipeline(String),

    /// `look_at` with `up` parallel to the view direction or `eye == center`.
    #[error("degenerate camera basis: up is parallel to the view direction")]
    DegenerateBasis,

    /// A pass transform that must be inverted (shadow lookup, normal transform) is singular.
    #[error("pass transform is not invertible")]
    SingularTransform,

    #[error("preview window error: {0}")]
    Preview(String),
}
