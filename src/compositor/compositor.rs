use colored::Colorize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::available_parallelism;
use std::time::Instant;

use super::{load_frame, ComposeConfig, Frame, GifWriter};
use crate::error::{Error, WorkerLost};
use crate::thread::ThreadPool;

/// 读取 `frame_count` 帧图像，统一模式与尺寸后合成为一个 GIF
pub fn compose(config: &ComposeConfig) -> Result<(), Error> {
    Compositor::new(config)?.run()
}

#[derive(Debug)]
pub struct Compositor<'a> {
    config: &'a ComposeConfig,
    /// 线程池
    thread_pool: ThreadPool,
    /// 记录完成的帧数
    end_num: usize,
    /// 工作开始时间
    start_time: Instant,
}

impl<'a> Compositor<'a> {
    pub fn new(config: &'a ComposeConfig) -> Result<Compositor<'a>, Error> {
        config.validate()?;

        // 未指定时使用系统并行资源数量，线程数不超过帧数
        let threads = config
            .threads
            .unwrap_or_else(|| available_parallelism().map(|n| n.get()).unwrap_or(1))
            .min(config.frame_count as usize);
        let thread_pool = ThreadPool::new(threads)?;

        Ok(Compositor {
            config,
            thread_pool,
            end_num: 0,
            start_time: Instant::now(),
        })
    }

    /// 在线程池中解码并裁剪所有帧，按序号收集。
    ///
    /// 任一帧失败时通知尚未开始的任务跳过，并返回该错误。
    fn load_frames(&mut self) -> Result<Vec<Frame>, Error> {
        let total = self.config.frame_count as usize;
        let (sender, receiver) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        tracing::info!(
            frames = total,
            threads = self.thread_pool.size(),
            source = %self.config.source_dir.display(),
            "loading frames"
        );

        for index in 0..total {
            let path = self.config.frame_path(index);
            let crop = self.config.crop;
            let sender = sender.clone();
            let cancelled = Arc::clone(&cancelled);
            self.thread_pool.execute(move || {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                let result = load_frame(index, &path).and_then(|frame| frame.normalize(&crop));
                // 接收端已返回错误时发送失败，忽略即可
                let _ = sender.send((index, result));
            })?;
        }
        // 只保留任务中的发送端，任务全部结束后接收端才会断开
        drop(sender);

        let mut slots: Vec<Option<Frame>> = (0..total).map(|_| None).collect();
        while self.end_num < total {
            let (index, result) = receiver.recv().map_err(|_| WorkerLost)?;
            match result {
                Ok(frame) => {
                    slots[index] = Some(frame);
                    self.end_num += 1;
                    self.update_progress_bar(total);
                }
                Err(err) => {
                    cancelled.store(true, Ordering::SeqCst);
                    tracing::debug!(index, "frame failed, cancelling remaining work");
                    self.finish_progress_bar();
                    return Err(err);
                }
            }
        }

        slots.into_iter().map(|slot| slot.ok_or(WorkerLost)).collect()
    }

    /// 更新进度条
    fn update_progress_bar(&self, total: usize) {
        if !self.config.progress {
            return;
        }

        let perc = self.end_num as f64 / total as f64;
        let lpad = (perc * 20.00).floor() as usize;

        print!(
            "\rProcessing frames: {}{} {}%",
            "\u{25A0}".repeat(lpad),
            "-".repeat(20 - lpad),
            (perc * 100.0).trunc()
        );
        // 进度条刷新失败不影响合成
        let _ = io::stdout().flush();
    }

    /// 进度条已经输出过，还停留在当前行
    fn progress_bar_open(&self) -> bool {
        self.config.progress && self.end_num > 0
    }

    /// 进度条已输出时换行，后续输出不接在进度条后面
    fn finish_progress_bar(&self) {
        if self.progress_bar_open() {
            println!();
        }
    }

    /// 合成 GIF
    pub fn run(&mut self) -> Result<(), Error> {
        let frames = self.load_frames()?;

        let (width, height) = self.config.crop.size();
        let delay = self.config.duration.gif_delay(self.config.frame_count);
        tracing::info!(
            output = %self.config.output.display(),
            width,
            height,
            delay,
            "encoding gif"
        );

        self.finish_progress_bar();
        let writer = GifWriter::new(width, height, delay, &self.config.quantize)?;
        writer.write_file(&frames, &self.config.staging_path(), &self.config.output)?;

        if self.config.progress {
            let second = self.start_time.elapsed().as_secs_f64();
            println!("Total time: {}s", second);
            println!(
                "{} {}",
                "Complete all work:".green(),
                self.config.output.display()
            );
        }
        Ok(())
    }
}
