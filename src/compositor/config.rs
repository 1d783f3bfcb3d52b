use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::{Error, InvalidArgument};

/// 未指定帧数时的固定帧数
pub const FIXED_FRAME_COUNT: u32 = 60;
/// 未指定帧数时每帧的固定时长，单位毫秒
pub const FIXED_FRAME_DURATION_MS: f64 = 1000.0;
/// 指定帧数时，所有帧平分的总时长，单位毫秒
pub const DIVIDED_TOTAL_MS: f64 = 1000.0;
/// 默认输入目录
pub const DEFAULT_SOURCE_DIR: &str = "data";
/// 默认输出文件
pub const DEFAULT_OUTPUT: &str = "video.gif";

/// 裁剪区域，使用绝对坐标，右下角不包含在内
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CropBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropBox {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Result<CropBox, Error> {
        if right <= left || bottom <= top {
            return Err(InvalidArgument(format!(
                "crop box ({left}, {top}, {right}, {bottom}) has no area"
            )));
        }
        Ok(CropBox {
            left,
            top,
            right,
            bottom,
        })
    }

    /// 裁剪后的图像尺寸
    pub fn size(&self) -> (u32, u32) {
        (self.right - self.left, self.bottom - self.top)
    }
}

impl Default for CropBox {
    fn default() -> Self {
        CropBox {
            left: 554,
            top: 1450,
            right: 1997,
            bottom: 2263,
        }
    }
}

/// 解析 `left,top,right,bottom` 格式的字符串
impl FromStr for CropBox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| InvalidArgument(format!("crop box `{s}`: {err}")))?;

        match parts[..] {
            [left, top, right, bottom] => CropBox::new(left, top, right, bottom),
            _ => Err(InvalidArgument(format!(
                "crop box `{s}` must be left,top,right,bottom"
            ))),
        }
    }
}

/// 每帧显示时长的计算方式
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DurationPolicy {
    /// 每帧固定时长
    Fixed(f64),
    /// 总时长由所有帧平分
    Divide(f64),
}

impl DurationPolicy {
    /// 每帧的时长，单位毫秒
    pub fn frame_duration_ms(&self, frame_count: u32) -> f64 {
        match *self {
            DurationPolicy::Fixed(ms) => ms,
            DurationPolicy::Divide(total) => total / frame_count.max(1) as f64,
        }
    }

    /// GIF 的帧延迟以百分之一秒为单位，不足的部分舍去
    pub fn gif_delay(&self, frame_count: u32) -> u16 {
        let centis = (self.frame_duration_ms(frame_count) / 10.0).floor();
        centis.min(u16::MAX as f64) as u16
    }

    fn value(&self) -> f64 {
        match *self {
            DurationPolicy::Fixed(ms) | DurationPolicy::Divide(ms) => ms,
        }
    }
}

/// imagequant 量化参数
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct QuantizeOptions {
    /// `1-10`，越快质量越低
    pub speed: u8,
    /// `0-100`，不能高于最大值
    pub quality_min: u8,
    /// `0-100`，不能低于最小值
    pub quality_max: u8,
    /// `0.0-1.0`，抖动强度
    pub dithering_level: f32,
    /// 所有帧共用一个全局调色板
    pub shared_palette: bool,
}

impl Default for QuantizeOptions {
    fn default() -> Self {
        QuantizeOptions {
            speed: 4,
            quality_min: 0,
            quality_max: 100,
            dithering_level: 1.0,
            shared_palette: false,
        }
    }
}

/// 合成 GIF 所需的全部参数
#[derive(Clone, Debug)]
pub struct ComposeConfig {
    /// 输入帧数，文件为 `0.png` 到 `{frame_count - 1}.png`
    pub frame_count: u32,
    /// 输入目录
    pub source_dir: PathBuf,
    /// 输出文件，已存在时直接覆盖
    pub output: PathBuf,
    pub crop: CropBox,
    pub duration: DurationPolicy,
    pub quantize: QuantizeOptions,
    /// 解码线程数，`None` 时使用系统并行资源数量
    pub threads: Option<usize>,
    /// 是否在标准输出打印进度条
    pub progress: bool,
}

impl ComposeConfig {
    /// 帧数由外部指定，所有帧平分一秒
    pub fn from_count(frame_count: u32) -> ComposeConfig {
        ComposeConfig {
            frame_count,
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            output: PathBuf::from(DEFAULT_OUTPUT),
            crop: CropBox::default(),
            duration: DurationPolicy::Divide(DIVIDED_TOTAL_MS),
            quantize: QuantizeOptions::default(),
            threads: None,
            progress: false,
        }
    }

    /// 固定 60 帧，每帧一秒
    pub fn fixed_sequence() -> ComposeConfig {
        ComposeConfig {
            duration: DurationPolicy::Fixed(FIXED_FRAME_DURATION_MS),
            ..ComposeConfig::from_count(FIXED_FRAME_COUNT)
        }
    }

    /// 第 `index` 帧的输入路径
    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.source_dir.join(format!("{index}.png"))
    }

    /// 写入过程中使用的临时文件，编码成功后重命名为输出文件
    pub fn staging_path(&self) -> PathBuf {
        let mut name = self
            .output
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        self.output
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(name)
    }

    /// 检查参数，在读取任何文件之前调用
    pub fn validate(&self) -> Result<(), Error> {
        if self.frame_count == 0 {
            return Err(Error::EmptySequence);
        }

        // 结构体字段是公开的，所以这里重新检查
        CropBox::new(
            self.crop.left,
            self.crop.top,
            self.crop.right,
            self.crop.bottom,
        )?;
        let (width, height) = self.crop.size();
        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(InvalidArgument(format!(
                "crop size {width}x{height} exceeds the gif limit of {}",
                u16::MAX
            )));
        }

        let duration = self.duration.value();
        if !duration.is_finite() || duration < 0.0 {
            return Err(InvalidArgument(format!(
                "frame duration {duration} must be a non-negative number"
            )));
        }

        let quantize = &self.quantize;
        if !(1..=10).contains(&quantize.speed) {
            return Err(InvalidArgument(format!(
                "speed {} is outside 1-10",
                quantize.speed
            )));
        }
        if quantize.quality_max > 100 || quantize.quality_min > quantize.quality_max {
            return Err(InvalidArgument(format!(
                "quality range {}-{} is not within 0-100",
                quantize.quality_min, quantize.quality_max
            )));
        }
        if !(0.0..=1.0).contains(&quantize.dithering_level) {
            return Err(InvalidArgument(format!(
                "dithering level {} is outside 0.0-1.0",
                quantize.dithering_level
            )));
        }

        if self.threads == Some(0) {
            return Err(InvalidArgument("thread count must be positive".into()));
        }

        if self.output.file_name().is_none() {
            return Err(InvalidArgument(format!(
                "output `{}` is not a file path",
                self.output.display()
            )));
        }

        Ok(())
    }
}
