use gif::{Encoder, Repeat};
use imagequant::{Attributes, Histogram, Image, QuantizationResult, RGBA};
use rgb::FromSlice;
use std::{
    borrow::Cow,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use super::{Frame, QuantizeOptions};
use crate::error::{Encode, Error};

/// 调色板模式的一帧
struct IndexedFrame {
    /// 局部调色板，使用全局调色板时为 `None`
    palette: Option<Vec<u8>>,
    pixels: Vec<u8>,
}

/// GIF 编码结构体，将 RGB 帧序列量化后写为无限循环的动画
pub struct GifWriter {
    width: u16,
    height: u16,
    /// 帧延迟，单位百分之一秒
    delay: u16,
    attr: Attributes,
    dithering_level: f32,
    shared_palette: bool,
}

impl GifWriter {
    pub fn new(
        width: u32,
        height: u32,
        delay: u16,
        options: &QuantizeOptions,
    ) -> Result<GifWriter, Error> {
        let width = u16::try_from(width)
            .map_err(|_| Encode(format!("width {width} exceeds the gif limit")))?;
        let height = u16::try_from(height)
            .map_err(|_| Encode(format!("height {height} exceeds the gif limit")))?;

        let mut attr = imagequant::new();
        attr.set_speed(options.speed as i32)?;
        attr.set_quality(options.quality_min, options.quality_max)?;

        Ok(GifWriter {
            width,
            height,
            delay,
            attr,
            dithering_level: options.dithering_level,
            shared_palette: options.shared_palette,
        })
    }

    /// 编码到临时文件，成功后重命名为目标文件，失败时删除临时文件
    pub fn write_file(&self, frames: &[Frame], staging: &Path, output: &Path) -> Result<(), Error> {
        let result = File::create(staging)
            .map_err(|err| Error::io(staging.to_path_buf(), err))
            .and_then(|file| {
                let mut w = BufWriter::new(file);
                self.write(frames, &mut w)?;
                w.flush().map_err(|err| Error::io(staging.to_path_buf(), err))
            })
            .and_then(|_| {
                fs::rename(staging, output).map_err(|err| Error::io(output.to_path_buf(), err))
            });

        if result.is_err() {
            // 临时文件可能不存在，忽略删除失败
            let _ = fs::remove_file(staging);
        }
        result
    }

    /// 量化并编码全部帧，第一帧为基础帧，其余帧依次追加
    pub fn write<W: Write>(&self, frames: &[Frame], w: W) -> Result<(), Error> {
        if frames.is_empty() {
            return Err(Error::EmptySequence);
        }

        let (global_palette, indexed) = if self.shared_palette {
            self.quantize_shared(frames)?
        } else {
            let indexed = frames
                .iter()
                .map(|frame| self.quantize_local(frame))
                .collect::<Result<Vec<_>, _>>()?;
            (Vec::new(), indexed)
        };

        let mut encoder = Encoder::new(w, self.width, self.height, &global_palette)?;
        encoder.set_repeat(Repeat::Infinite)?;

        for (index, frame) in indexed.into_iter().enumerate() {
            // 每帧都是完整画面，不做帧间差分和透明优化
            let mut gif_frame = gif::Frame::default();
            gif_frame.width = self.width;
            gif_frame.height = self.height;
            gif_frame.delay = self.delay;
            gif_frame.palette = frame.palette;
            gif_frame.buffer = Cow::Owned(frame.pixels);
            encoder.write_frame(&gif_frame)?;
            tracing::trace!(index, "wrote gif frame");
        }

        encoder
            .into_inner()
            .map_err(|err| Encode(err.to_string()))?;
        Ok(())
    }

    /// 每帧生成各自的调色板
    fn quantize_local(&self, frame: &Frame) -> Result<IndexedFrame, Error> {
        let pixels = rgba_pixels(frame)?;
        let mut image = self.image(&pixels)?;
        let mut res = self.attr.quantize(&mut image)?;
        let (palette, pixels) = self.remap(&mut res, &mut image)?;
        Ok(IndexedFrame {
            palette: Some(flatten_palette(&palette)),
            pixels,
        })
    }

    /// 为所有帧生成一个共享调色板，所以要先统计全部帧的直方图
    fn quantize_shared(&self, frames: &[Frame]) -> Result<(Vec<u8>, Vec<IndexedFrame>), Error> {
        let buffers = frames
            .iter()
            .map(rgba_pixels)
            .collect::<Result<Vec<_>, _>>()?;

        let mut histogram = Histogram::new(&self.attr);
        for pixels in buffers.iter() {
            let mut image = self.image(pixels)?;
            histogram.add_image(&self.attr, &mut image)?;
        }
        let mut res = histogram.quantize(&self.attr)?;

        let mut global_palette: Vec<RGBA> = vec![];
        let mut indexed = Vec::with_capacity(frames.len());
        for pixels in buffers.iter() {
            let mut image = self.image(pixels)?;
            let (palette, pixels) = self.remap(&mut res, &mut image)?;
            if global_palette.is_empty() {
                global_palette = palette;
            }
            indexed.push(IndexedFrame {
                palette: None,
                pixels,
            });
        }

        Ok((flatten_palette(&global_palette), indexed))
    }

    fn image<'a>(&self, pixels: &'a [RGBA]) -> Result<Image<'a>, Error> {
        Ok(Image::new_borrowed(
            &self.attr,
            pixels,
            self.width as usize,
            self.height as usize,
            0.0,
        )?)
    }

    fn remap(
        &self,
        res: &mut QuantizationResult,
        image: &mut Image<'_>,
    ) -> Result<(Vec<RGBA>, Vec<u8>), Error> {
        res.set_dithering_level(self.dithering_level)?;
        Ok(res.remapped(image)?)
    }
}

/// imagequant 只接受 RGBA 像素
fn rgba_pixels(frame: &Frame) -> Result<Vec<RGBA>, Error> {
    let rgb = frame.rgb().ok_or_else(|| {
        Encode(format!(
            "frame {} is {:?}, expected Rgb8",
            frame.index,
            frame.color()
        ))
    })?;
    Ok(rgb
        .as_raw()
        .as_rgb()
        .iter()
        .map(|p| RGBA::new(p.r, p.g, p.b, 255))
        .collect())
}

/// 调色板转为 gif 使用的 `r, g, b` 连续字节
fn flatten_palette(palette: &[RGBA]) -> Vec<u8> {
    palette.iter().flat_map(|p| [p.r, p.g, p.b]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Rgb, RgbImage};
    use tempfile::TempDir;

    fn solid(index: usize, width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let image = RgbImage::from_pixel(width, height, Rgb(rgb));
        Frame::new(index, DynamicImage::ImageRgb8(image))
    }

    fn decode(bytes: &[u8]) -> Vec<(u16, Vec<u8>)> {
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::RGBA);
        let mut decoder = options.read_info(bytes).unwrap();
        let mut frames = vec![];
        while let Some(frame) = decoder.read_next_frame().unwrap() {
            frames.push((frame.delay, frame.buffer.to_vec()));
        }
        frames
    }

    /// 量化后的颜色允许极小的误差
    fn assert_color(pixel: &[u8], rgb: [u8; 3]) {
        for (got, want) in pixel.iter().zip(rgb) {
            assert!(got.abs_diff(want) <= 2, "{pixel:?} is not {rgb:?}");
        }
    }

    fn options(shared_palette: bool) -> QuantizeOptions {
        QuantizeOptions {
            speed: 10,
            shared_palette,
            ..QuantizeOptions::default()
        }
    }

    #[test]
    fn writes_frames_in_order_with_delay() {
        let frames = vec![
            solid(0, 4, 3, [255, 0, 0]),
            solid(1, 4, 3, [0, 0, 255]),
        ];
        let writer = GifWriter::new(4, 3, 50, &options(false)).unwrap();
        let mut bytes = vec![];
        writer.write(&frames, &mut bytes).unwrap();

        let decoded = decode(&bytes);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].0, 50);
        assert_color(&decoded[0].1[..3], [255, 0, 0]);
        assert_color(&decoded[1].1[..3], [0, 0, 255]);
        assert_eq!(decoded[1].1.len(), 4 * 3 * 4);
    }

    #[test]
    fn sets_infinite_loop() {
        let writer = GifWriter::new(2, 2, 10, &options(false)).unwrap();
        let mut bytes = vec![];
        writer.write(&[solid(0, 2, 2, [9, 9, 9])], &mut bytes).unwrap();

        let pos = bytes
            .windows(11)
            .position(|w| w == b"NETSCAPE2.0")
            .unwrap();
        // 子块长度 3，子块 id 1，循环次数 0
        assert_eq!(&bytes[pos + 11..pos + 15], &[3, 1, 0, 0]);
    }

    #[test]
    fn shared_palette_keeps_colors() {
        let frames = vec![
            solid(0, 3, 3, [0, 255, 0]),
            solid(1, 3, 3, [255, 255, 255]),
        ];
        let writer = GifWriter::new(3, 3, 10, &options(true)).unwrap();
        let mut bytes = vec![];
        writer.write(&frames, &mut bytes).unwrap();

        let decoded = decode(&bytes);
        assert_eq!(decoded.len(), 2);
        assert_color(&decoded[0].1[..3], [0, 255, 0]);
        assert_color(&decoded[1].1[..3], [255, 255, 255]);
    }

    #[test]
    fn rejects_empty_sequence() {
        let writer = GifWriter::new(2, 2, 10, &options(false)).unwrap();
        assert!(matches!(
            writer.write(&[], Vec::new()),
            Err(Error::EmptySequence)
        ));
    }

    #[test]
    fn rejects_non_rgb_frames() {
        let writer = GifWriter::new(1, 1, 10, &options(false)).unwrap();
        let gray = Frame::new(0, DynamicImage::ImageLuma8(GrayImage::new(1, 1)));
        assert!(matches!(
            writer.write(&[gray], Vec::new()),
            Err(Error::Encode(_))
        ));
    }

    #[test]
    fn failed_rename_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        // 输出路径是一个已存在的目录，重命名必然失败
        let output = dir.path().join("video.gif");
        std::fs::create_dir(&output).unwrap();
        std::fs::write(output.join("keep"), b"previous").unwrap();
        let staging = dir.path().join("video.gif.part");

        let writer = GifWriter::new(2, 2, 10, &options(false)).unwrap();
        let err = writer
            .write_file(&[solid(0, 2, 2, [1, 2, 3])], &staging, &output)
            .unwrap_err();

        assert!(matches!(err, Error::Io { ref path, .. } if path == &output));
        assert!(!staging.exists());
        assert!(output.is_dir());
        assert_eq!(std::fs::read(output.join("keep")).unwrap(), b"previous");
    }

    #[test]
    fn failed_encode_keeps_previous_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("video.gif");
        std::fs::write(&output, b"previous").unwrap();
        let staging = dir.path().join("video.gif.part");

        let writer = GifWriter::new(1, 1, 10, &options(false)).unwrap();
        let gray = Frame::new(0, DynamicImage::ImageLuma8(GrayImage::new(1, 1)));
        let err = writer.write_file(&[gray], &staging, &output).unwrap_err();

        assert!(matches!(err, Error::Encode(_)));
        assert!(!staging.exists());
        assert_eq!(std::fs::read(&output).unwrap(), b"previous");
    }

    #[test]
    fn successful_write_replaces_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("video.gif");
        std::fs::write(&output, b"previous").unwrap();
        let staging = dir.path().join("video.gif.part");

        let writer = GifWriter::new(2, 2, 10, &options(false)).unwrap();
        writer
            .write_file(&[solid(0, 2, 2, [200, 0, 0])], &staging, &output)
            .unwrap();

        assert!(!staging.exists());
        let decoded = decode(&std::fs::read(&output).unwrap());
        assert_eq!(decoded.len(), 1);
        assert_color(&decoded[0].1[..3], [200, 0, 0]);
    }
}
