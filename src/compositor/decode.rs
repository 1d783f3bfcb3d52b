use image::ImageReader;
use std::path::Path;

use super::Frame;
use crate::error::{DecodeError, Error};

/// 解码一帧图像。
///
/// 格式由文件内容判断，不看扩展名，所以以 `.png` 命名的 jpeg、bmp 等文件同样可以读取。
pub fn load_frame(index: usize, path: &Path) -> Result<Frame, Error> {
    let reader = ImageReader::open(path)
        .map_err(|err| Error::open(path.to_path_buf(), err))?
        .with_guessed_format()
        .map_err(|err| Error::io(path.to_path_buf(), err))?;

    let format = reader.format();
    let image = reader.decode().map_err(|err| DecodeError {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    tracing::debug!(
        index,
        width = image.width(),
        height = image.height(),
        ?format,
        color = ?image.color(),
        "decoded frame"
    );

    Ok(Frame::new(index, image))
}
