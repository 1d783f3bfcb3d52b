use std::{io, path::PathBuf};
pub use Error::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 序列中缺少某一帧的输入文件
    #[error("frame file not found: {}", path.display())]
    FileNotFound { path: PathBuf },
    /// 文件存在但无法解码为图像
    #[error("cannot decode {}: {reason}", path.display())]
    DecodeError { path: PathBuf, reason: String },
    /// 图像尺寸小于裁剪区域右下角，且不等于目标尺寸
    #[error(
        "frame {index} is {width}x{height}, smaller than the crop box far corner ({right}, {bottom})"
    )]
    CropOutOfBounds {
        index: usize,
        width: u32,
        height: u32,
        right: u32,
        bottom: u32,
    },
    /// 帧数为 0，没有可作为基础帧的图像
    #[error("frame sequence is empty")]
    EmptySequence,
    /// 参数不合法
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// 调色板量化失败
    #[error("quantization failed: {0}")]
    Quantize(String),
    /// GIF 编码失败
    #[error("gif encoding failed: {0}")]
    Encode(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// 工作线程在返回结果之前退出
    #[error("worker thread exited before reporting its frame")]
    WorkerLost,
}

impl Error {
    /// 打开文件失败时区分文件不存在与其他 io 错误
    pub fn open(path: PathBuf, source: io::Error) -> Error {
        match source.kind() {
            io::ErrorKind::NotFound => FileNotFound { path },
            _ => Io { path, source },
        }
    }

    pub fn io(path: PathBuf, source: io::Error) -> Error {
        Io { path, source }
    }
}

impl From<imagequant::Error> for Error {
    #[cold]
    fn from(err: imagequant::Error) -> Error {
        Quantize(err.to_string())
    }
}

impl From<gif::EncodingError> for Error {
    #[cold]
    fn from(err: gif::EncodingError) -> Error {
        Encode(err.to_string())
    }
}
