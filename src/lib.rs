mod colormap;
mod error;
mod feature;
mod render;
mod utils;

pub use colormap::viridis;
pub use error::{FeatPlotError, FeatPlotResult};
pub use feature::{ElementSize, FeatureHeader, FeatureMatrix, HEADER_LEN};
pub use render::{MAX_PIXELS, RenderOptions, render, save_heatmap};
