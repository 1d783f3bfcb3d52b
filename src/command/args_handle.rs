use crate::compositor::{compose, ComposeConfig, CropBox, DurationPolicy};
use crate::error::Error;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(
        value_parser = clap::value_parser!(u32).range(1..),
        help = "帧数，读取 0.png 到 {帧数-1}.png，所有帧平分一秒。不传时固定读取 60 帧，每帧一秒"
    )]
    count: Option<u32>,

    #[arg(short = 'p', long, help = "输入帧所在的文件夹路径。默认 data")]
    path: Option<PathBuf>,

    #[arg(short = 'o', long, help = "输出的 gif 文件路径，已存在时覆盖。默认 video.gif")]
    output: Option<PathBuf>,

    #[arg(
        long,
        value_parser = parse_crop,
        help = "裁剪区域 left,top,right,bottom，尺寸等于裁剪尺寸的帧不裁剪。默认 554,1450,1997,2263"
    )]
    crop: Option<CropBox>,

    #[arg(short = 't', long, help = "每帧显示时长，单位毫秒，覆盖按帧数计算的时长")]
    duration: Option<f64>,

    #[arg(
        short = 's',
        long,
        help = "1-10，更快的速度生成的图像质量更低。默认值为 4"
    )]
    speed: Option<u8>,

    #[arg(
        short = 'n',
        long,
        help = "0-100，量化的最低质量，默认最低 0，不能高于最大值"
    )]
    quality_min: Option<u8>,

    #[arg(
        short = 'x',
        long,
        help = "0-100，量化的最大质量，默认最高100，不能低于最小值"
    )]
    quality_max: Option<u8>,

    #[arg(short = 'd', long, help = "设置为1.0可获得漂亮的平滑图像，默认 1.0")]
    dithering_level: Option<f32>,

    #[arg(long, help = "所有帧共用一个全局调色板")]
    shared_palette: bool,

    #[arg(short = 'j', long, help = "解码线程数，默认使用系统并行资源数量")]
    threads: Option<usize>,

    #[arg(short = 'q', long, help = "不显示进度条")]
    quiet: bool,

    #[arg(short = 'v', long, action = ArgAction::Count, help = "输出更多日志，可重复使用")]
    verbose: u8,
}

fn parse_crop(s: &str) -> Result<CropBox, Error> {
    s.parse()
}

impl Args {
    /// 日志等级
    fn level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// 根据命令行参数生成合成配置
    fn into_config(self) -> ComposeConfig {
        // 是否传入帧数决定了时长的计算方式
        let mut config = match self.count {
            Some(count) => ComposeConfig::from_count(count),
            None => ComposeConfig::fixed_sequence(),
        };

        if let Some(path) = self.path {
            config.source_dir = path;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(crop) = self.crop {
            config.crop = crop;
        }
        if let Some(duration) = self.duration {
            config.duration = DurationPolicy::Fixed(duration);
        }
        if let Some(speed) = self.speed {
            config.quantize.speed = speed;
        }
        if let Some(quality_min) = self.quality_min {
            config.quantize.quality_min = quality_min;
        }
        if let Some(quality_max) = self.quality_max {
            config.quantize.quality_max = quality_max;
        }
        if let Some(dithering_level) = self.dithering_level {
            config.quantize.dithering_level = dithering_level;
        }
        config.quantize.shared_palette = self.shared_palette;
        config.threads = self.threads;
        config.progress = !self.quiet;
        config
    }
}

/// 处理命令行参数
pub fn args_handle() -> Result<(), Error> {
    // 获取命令行参数
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(args.level())
        .init();

    let config = args.into_config();
    tracing::debug!(?config, "parsed arguments");

    // 合成 gif
    compose(&config)
}
