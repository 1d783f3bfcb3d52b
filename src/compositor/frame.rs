use image::{imageops, ColorType, DynamicImage, GenericImageView, RgbImage};

use super::CropBox;
use crate::error::{CropOutOfBounds, Error};

/// 一帧图像及其在序列中的序号
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// 在序列中的序号
    pub index: usize,
    pub image: DynamicImage,
}

impl Frame {
    pub fn new(index: usize, image: DynamicImage) -> Frame {
        Frame { index, image }
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn color(&self) -> ColorType {
        self.image.color()
    }

    /// 统一后的 RGB 像素，其他模式返回 `None`
    pub fn rgb(&self) -> Option<&RgbImage> {
        self.image.as_rgb8()
    }

    /// 转为不带透明通道的 8 位 RGB 模式，透明通道直接丢弃。
    ///
    /// 16 位通道按比例缩放到 8 位。
    pub fn into_truecolor(self) -> Frame {
        if self.image.color() == ColorType::Rgb8 {
            return self;
        }
        let image = DynamicImage::ImageRgb8(self.image.to_rgb8());
        Frame { image, ..self }
    }

    /// 按绝对坐标裁剪，结果为 RGB 模式，区域超出图像范围时返回错误
    pub fn crop(&self, crop: &CropBox) -> Result<Frame, Error> {
        let (width, height) = self.size();
        if width < crop.right || height < crop.bottom {
            return Err(CropOutOfBounds {
                index: self.index,
                width,
                height,
                right: crop.right,
                bottom: crop.bottom,
            });
        }

        let (crop_width, crop_height) = crop.size();
        let crop_rgb = |rgb: &RgbImage| {
            imageops::crop_imm(rgb, crop.left, crop.top, crop_width, crop_height).to_image()
        };
        let image = match self.rgb() {
            Some(rgb) => crop_rgb(rgb),
            None => crop_rgb(&self.image.to_rgb8()),
        };
        let image = DynamicImage::ImageRgb8(image);
        Ok(Frame::new(self.index, image))
    }

    /// 统一颜色模式与尺寸。
    ///
    /// 尺寸已经等于裁剪尺寸的帧原样保留，其他尺寸一律按固定坐标裁剪，
    /// 即使图像并不是裁剪前的原始尺寸。
    pub fn normalize(self, crop: &CropBox) -> Result<Frame, Error> {
        let frame = self.into_truecolor();
        if frame.size() == crop.size() {
            return Ok(frame);
        }
        frame.crop(crop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, LumaA, Rgb, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([x as u8, y as u8, (x ^ y) as u8])
        });
        Frame::new(0, DynamicImage::ImageRgb8(image))
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> Rgb<u8> {
        *frame.rgb().unwrap().get_pixel(x, y)
    }

    #[test]
    fn grayscale_is_replicated_into_rgb() {
        let gray = GrayImage::from_raw(2, 1, vec![10, 200]).unwrap();
        let frame = Frame::new(0, DynamicImage::ImageLuma8(gray)).into_truecolor();
        assert_eq!(frame.color(), ColorType::Rgb8);
        assert_eq!(frame.rgb().unwrap().as_raw(), &vec![10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn alpha_is_dropped_without_compositing() {
        let rgba = RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 0]));
        let frame = Frame::new(0, DynamicImage::ImageRgba8(rgba)).into_truecolor();
        assert_eq!(frame.rgb().unwrap().as_raw(), &vec![1, 2, 3]);

        let gray_alpha: ImageBuffer<LumaA<u8>, _> =
            ImageBuffer::from_raw(2, 1, vec![7, 0, 9, 255]).unwrap();
        let frame = Frame::new(0, DynamicImage::ImageLumaA8(gray_alpha)).into_truecolor();
        assert_eq!(frame.rgb().unwrap().as_raw(), &vec![7, 7, 7, 9, 9, 9]);
    }

    #[test]
    fn sixteen_bit_samples_are_scaled_to_eight() {
        let gray: ImageBuffer<Luma<u16>, _> =
            ImageBuffer::from_raw(2, 1, vec![0xFFFF, 0x8080]).unwrap();
        let frame = Frame::new(0, DynamicImage::ImageLuma16(gray)).into_truecolor();
        assert_eq!(frame.rgb().unwrap().as_raw(), &vec![255, 255, 255, 128, 128, 128]);
    }

    #[test]
    fn crop_takes_the_absolute_region() {
        let frame = gradient(10, 8);
        let crop = CropBox::new(2, 3, 6, 7).unwrap();
        let cropped = frame.crop(&crop).unwrap();

        assert_eq!(cropped.size(), (4, 4));
        assert_eq!(cropped.color(), ColorType::Rgb8);
        assert_eq!(pixel(&cropped, 0, 0), pixel(&frame, 2, 3));
        assert_eq!(pixel(&cropped, 3, 3), pixel(&frame, 5, 6));
    }

    #[test]
    fn crop_fails_when_far_corner_is_outside() {
        let frame = gradient(5, 8);
        let crop = CropBox::new(2, 3, 6, 7).unwrap();
        assert!(matches!(
            frame.crop(&crop),
            Err(Error::CropOutOfBounds {
                width: 5,
                height: 8,
                right: 6,
                bottom: 7,
                ..
            })
        ));
    }

    #[test]
    fn frame_already_at_target_size_is_not_cropped() {
        let frame = gradient(4, 4);
        let crop = CropBox::new(2, 3, 6, 7).unwrap();
        let normalized = frame.clone().normalize(&crop).unwrap();
        assert_eq!(normalized, frame);
    }

    #[test]
    fn normalize_is_idempotent() {
        let crop = CropBox::new(1, 1, 5, 4).unwrap();
        let gray = GrayImage::from_raw(6, 5, (0..30).collect()).unwrap();
        let once = Frame::new(3, DynamicImage::ImageLuma8(gray))
            .normalize(&crop)
            .unwrap();
        let twice = once.clone().normalize(&crop).unwrap();

        assert_eq!(once.color(), ColorType::Rgb8);
        assert_eq!(once.size(), (4, 3));
        assert_eq!(once.index, 3);
        assert_eq!(once, twice);
    }
}
