mod compositor;
mod config;
mod decode;
mod frame;
mod gif_writer;

pub use compositor::compose;
pub use config::{ComposeConfig, CropBox, DurationPolicy, QuantizeOptions};
pub use decode::load_frame;
pub use frame::Frame;
pub use gif_writer::GifWriter;
