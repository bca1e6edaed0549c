//! 流式图像存储
//!
//! 像素分片按线路到达顺序写入磁盘，写入时完成字节序转换和方向变换，
//! 任何时候都不在内存中缓存整幅图像。
//!
//! # 文件布局
//!
//! ```text
//! [0, HEADER_LEN)                      FITS 头部（两条记录）
//! [HEADER_LEN, HEADER_LEN + expected)  行主序 16 位大端采样
//! [.., 2880 的整数倍)                  零填充
//! ```
//!
//! 上下翻转时，线路第 `r` 行落在文件第 `h - 1 - r` 行：
//! `offset = HEADER_LEN + (h - r0 - n) × row_bytes`，其中 `r0` 为分片首行
//! （由已接收字节数推得），`n` 为分片行数，分片内的行倒序写出。

use crate::DriverError;
use audine_tools::fits::{BLOCK_LEN, HEADER_LEN};
use audine_tools::{FitsHeader, MetadataSink, format_fits_date};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// 每个采样的字节数
pub const BYTES_PER_SAMPLE: usize = 2;

// ==================== 方向变换 ====================

/// 方向变换模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformMode {
    #[default]
    None,
    FlipLeftRight,
    FlipUpDown,
    FlipBoth,
}

impl TransformMode {
    pub fn from_flags(flip_lr: bool, flip_ud: bool) -> Self {
        match (flip_lr, flip_ud) {
            (false, false) => TransformMode::None,
            (true, false) => TransformMode::FlipLeftRight,
            (false, true) => TransformMode::FlipUpDown,
            (true, true) => TransformMode::FlipBoth,
        }
    }

    /// 行内采样是否反序
    pub fn flips_columns(self) -> bool {
        matches!(self, TransformMode::FlipLeftRight | TransformMode::FlipBoth)
    }

    /// 行顺序是否反转
    pub fn flips_rows(self) -> bool {
        matches!(self, TransformMode::FlipUpDown | TransformMode::FlipBoth)
    }
}

// ==================== 文件命名 ====================

/// 图像文件路径来源
pub trait ImagePathSource: Send {
    /// 下一幅图像的路径
    fn next_path(&mut self) -> PathBuf;
}

/// `{prefix}_{counter:04}.fits` 顺序命名
#[derive(Debug, Clone)]
pub struct SequentialPaths {
    dir: PathBuf,
    prefix: String,
    counter: u32,
}

impl SequentialPaths {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            counter: 1,
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl ImagePathSource for SequentialPaths {
    fn next_path(&mut self) -> PathBuf {
        let path = self
            .dir
            .join(format!("{}_{:04}.fits", self.prefix, self.counter));
        self.counter += 1;
        path
    }
}

// ==================== 存储会话 ====================

/// 单幅图像的存储会话
#[derive(Debug)]
struct StreamSession {
    path: PathBuf,
    file: File,
    transform: TransformMode,
    height: u64,
    row_bytes: usize,
    expected: u64,
    written: u64,
    received: u64,
}

impl StreamSession {
    /// 由线路进度推算的文件游标位置
    fn expected_cursor(&self) -> u64 {
        if self.transform.flips_rows() {
            let rows_received = self.received / self.row_bytes as u64;
            HEADER_LEN as u64 + (self.height - rows_received) * self.row_bytes as u64
        } else {
            HEADER_LEN as u64 + self.received
        }
    }
}

/// 流式写入器
pub struct StreamWriter {
    transform: TransformMode,
    paths: Box<dyn ImagePathSource>,
    session: Option<StreamSession>,
    scratch: Vec<u8>,
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("transform", &self.transform)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl StreamWriter {
    pub fn new(paths: Box<dyn ImagePathSource>, transform: TransformMode) -> Self {
        Self {
            transform,
            paths,
            session: None,
            scratch: Vec::new(),
        }
    }

    pub fn transform(&self) -> TransformMode {
        self.transform
    }

    /// 设置方向变换（从下一个会话开始生效）
    pub fn set_transform(&mut self, transform: TransformMode) {
        self.transform = transform;
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// 当前会话的文件路径
    pub fn current_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    /// 预期图像字节数（无会话时为 0）
    pub fn expected_bytes(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.expected)
    }

    /// 开始新会话：创建文件并写入临时头部
    ///
    /// 头部会被写入 NAXIS1/NAXIS2 和 DATE。上下翻转模式下文件立即预留
    /// 完整数据区，供后续按偏移倒序写入。
    pub fn start(
        &mut self,
        width: u32,
        height: u32,
        header: &mut FitsHeader,
    ) -> Result<(), DriverError> {
        if width == 0 || height == 0 {
            return Err(DriverError::InvalidInput(format!(
                "image dimensions {}x{}",
                width, height
            )));
        }
        if self.session.is_some() {
            warn!("Starting a new stream while a session is active, discarding it");
            self.cancel();
        }

        header.set("NAXIS1", width.into(), "length of data axis 1")?;
        header.set("NAXIS2", height.into(), "length of data axis 2")?;
        header.set(
            "DATE",
            format_fits_date(Utc::now()).into(),
            "UTC date of file creation",
        )?;

        let path = self.paths.next_path();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(&header.to_bytes())?;

        let row_bytes = width as usize * BYTES_PER_SAMPLE;
        let expected = u64::from(height) * row_bytes as u64;
        if self.transform.flips_rows() {
            file.set_len(HEADER_LEN as u64 + expected)?;
        }

        info!(
            "Stream started: {} ({}x{}, {:?})",
            path.display(),
            width,
            height,
            self.transform
        );
        self.session = Some(StreamSession {
            path,
            file,
            transform: self.transform,
            height: u64::from(height),
            row_bytes,
            expected,
            written: 0,
            received: 0,
        });
        Ok(())
    }

    /// 写入一个像素分片（小端采样，整数行）
    ///
    /// 返回累计接收字节数。
    pub fn handle(&mut self, samples: &[u8]) -> Result<u64, DriverError> {
        let session = self.session.as_mut().ok_or(DriverError::NoActiveSession)?;
        let transform = session.transform;

        if samples.len() % session.row_bytes != 0 {
            return Err(DriverError::PartialRow {
                len: samples.len(),
                row_bytes: session.row_bytes,
            });
        }
        let received = session.received + samples.len() as u64;
        if received > session.expected {
            return Err(DriverError::Overflow {
                expected: session.expected,
                received,
            });
        }

        let rows = samples.len() / session.row_bytes;
        self.scratch.clear();
        if transform.flips_rows() {
            for row in samples.chunks_exact(session.row_bytes).rev() {
                push_row(&mut self.scratch, row, transform.flips_columns());
            }
        } else {
            for row in samples.chunks_exact(session.row_bytes) {
                push_row(&mut self.scratch, row, transform.flips_columns());
            }
        }

        let offset = if transform.flips_rows() {
            let first_row = session.received / session.row_bytes as u64;
            let target_row = session.height - first_row - rows as u64;
            HEADER_LEN as u64 + target_row * session.row_bytes as u64
        } else {
            HEADER_LEN as u64 + session.received
        };
        session.file.seek(SeekFrom::Start(offset))?;
        session.file.write_all(&self.scratch)?;

        session.written += self.scratch.len() as u64;
        session.received = received;

        // 翻转模式下游标回到本分片起点
        let cursor = if transform.flips_rows() {
            session.file.seek(SeekFrom::Start(offset))?
        } else {
            session.file.stream_position()?
        };
        let expected_cursor = session.expected_cursor();
        if cursor != expected_cursor {
            return Err(DriverError::CursorMismatch {
                expected: expected_cursor,
                actual: cursor,
            });
        }

        trace!(
            "Fragment stored: {} rows at offset {}, {}/{} bytes",
            rows, offset, session.received, session.expected
        );
        Ok(received)
    }

    /// 结束会话：校验字节数，填充到记录边界，原位重写头部
    ///
    /// 校验或写入失败时会话保留，由调用方 [`cancel`](Self::cancel) 删除文件。
    pub fn finish(&mut self, header: &FitsHeader) -> Result<PathBuf, DriverError> {
        let session = self.session.as_mut().ok_or(DriverError::NoActiveSession)?;
        if session.written != session.expected || session.received != session.expected {
            return Err(DriverError::ByteCountMismatch {
                expected: session.expected,
                written: session.written,
                received: session.received,
            });
        }

        let data_end = HEADER_LEN as u64 + session.expected;
        session.file.set_len(padded_len(data_end))?;
        session.file.seek(SeekFrom::Start(0))?;
        session.file.write_all(&header.to_bytes())?;
        session.file.flush()?;

        // 文件已完整落盘，会话到此结束
        let Some(session) = self.session.take() else {
            return Err(DriverError::NoActiveSession);
        };
        info!(
            "Image saved: {} ({} bytes)",
            session.path.display(),
            session.expected
        );
        Ok(session.path)
    }

    /// 放弃会话并删除文件（无会话时无操作）
    pub fn cancel(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let StreamSession { path, file, .. } = session;
        drop(file);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Stream cancelled, removed {}", path.display()),
            Err(e) => warn!("Failed to remove partial image {}: {}", path.display(), e),
        }
    }
}

/// 追加一行：左右翻转时整行字节反序（同时完成采样反序和字节交换），否则逐采样交换字节
fn push_row(out: &mut Vec<u8>, row: &[u8], flip_columns: bool) {
    if flip_columns {
        out.extend(row.iter().rev());
    } else {
        for sample in row.chunks_exact(BYTES_PER_SAMPLE) {
            out.extend_from_slice(&[sample[1], sample[0]]);
        }
    }
}

/// 向上取整到 FITS 记录边界
fn padded_len(len: u64) -> u64 {
    let block = BLOCK_LEN as u64;
    len.div_ceil(block) * block
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const W: u32 = 4;
    const H: u32 = 6;

    /// 线路采样值：行号 × 100 + 列号
    fn wire_rows(rows: std::ops::Range<u32>) -> Vec<u8> {
        let mut data = Vec::new();
        for r in rows {
            for c in 0..W {
                data.extend_from_slice(&((r * 100 + c) as u16).to_le_bytes());
            }
        }
        data
    }

    fn writer(dir: &TempDir, transform: TransformMode) -> StreamWriter {
        StreamWriter::new(Box::new(SequentialPaths::new(dir.path(), "test")), transform)
    }

    fn write_image(dir: &TempDir, transform: TransformMode) -> Vec<Vec<u16>> {
        let mut w = writer(dir, transform);
        let mut header = FitsHeader::new();
        w.start(W, H, &mut header).unwrap();
        // 分片大小不一
        w.handle(&wire_rows(0..1)).unwrap();
        w.handle(&wire_rows(1..4)).unwrap();
        w.handle(&wire_rows(4..6)).unwrap();
        let path = w.finish(&header).unwrap();
        read_rows(&path)
    }

    fn read_rows(path: &Path) -> Vec<Vec<u16>> {
        let bytes = fs::read(path).unwrap();
        assert_eq!(bytes.len() % BLOCK_LEN, 0);
        bytes[HEADER_LEN..HEADER_LEN + (W * H) as usize * 2]
            .chunks_exact(W as usize * 2)
            .map(|row| {
                row.chunks_exact(2)
                    .map(|s| u16::from_be_bytes([s[0], s[1]]))
                    .collect()
            })
            .collect()
    }

    fn expected_row(r: u32) -> Vec<u16> {
        (0..W).map(|c| (r * 100 + c) as u16).collect()
    }

    #[test]
    fn test_none_round_trip() {
        let dir = TempDir::new().unwrap();
        let rows = write_image(&dir, TransformMode::None);
        for r in 0..H {
            assert_eq!(rows[r as usize], expected_row(r));
        }
    }

    #[test]
    fn test_flip_left_right() {
        let dir = TempDir::new().unwrap();
        let rows = write_image(&dir, TransformMode::FlipLeftRight);
        for r in 0..H {
            let mut expected = expected_row(r);
            expected.reverse();
            assert_eq!(rows[r as usize], expected);
        }
    }

    #[test]
    fn test_flip_up_down() {
        let dir = TempDir::new().unwrap();
        let rows = write_image(&dir, TransformMode::FlipUpDown);
        for i in 0..H {
            assert_eq!(rows[(H - 1 - i) as usize], expected_row(i));
        }
    }

    #[test]
    fn test_flip_both() {
        let dir = TempDir::new().unwrap();
        let rows = write_image(&dir, TransformMode::FlipBoth);
        for i in 0..H {
            let mut expected = expected_row(i);
            expected.reverse();
            assert_eq!(rows[(H - 1 - i) as usize], expected);
        }
    }

    #[test]
    fn test_header_stamped() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, TransformMode::None);
        let mut header = FitsHeader::new();
        w.start(W, H, &mut header).unwrap();
        w.handle(&wire_rows(0..H)).unwrap();
        let path = w.finish(&header).unwrap();

        let bytes = fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&bytes[..HEADER_LEN]);
        assert!(text.contains("NAXIS1  =                    4"));
        assert!(text.contains("NAXIS2  =                    6"));
        assert!(text.contains("DATE    = '"));
        assert_eq!(path.file_name().unwrap(), "test_0001.fits");
        assert_eq!(bytes.len(), 2 * BLOCK_LEN + BLOCK_LEN);
    }

    #[test]
    fn test_partial_row_rejected() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, TransformMode::None);
        let mut header = FitsHeader::new();
        w.start(W, H, &mut header).unwrap();

        let err = w.handle(&[0u8; 6]).unwrap_err();
        assert!(matches!(err, DriverError::PartialRow { len: 6, row_bytes: 8 }));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_overflow_rejected() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, TransformMode::FlipUpDown);
        let mut header = FitsHeader::new();
        w.start(W, H, &mut header).unwrap();
        w.handle(&wire_rows(0..5)).unwrap();

        let err = w.handle(&wire_rows(5..7)).unwrap_err();
        assert!(matches!(err, DriverError::Overflow { expected: 48, received: 56 }));
    }

    #[test]
    fn test_finish_before_complete() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, TransformMode::None);
        let mut header = FitsHeader::new();
        w.start(W, H, &mut header).unwrap();
        w.handle(&wire_rows(0..2)).unwrap();

        let err = w.finish(&header).unwrap_err();
        assert!(matches!(
            err,
            DriverError::ByteCountMismatch {
                expected: 48,
                written: 16,
                received: 16
            }
        ));
        // 会话保留，取消后文件删除
        let path = w.current_path().unwrap().to_path_buf();
        w.cancel();
        assert!(!path.exists());
        assert!(!w.is_active());
    }

    #[test]
    fn test_finish_write_failure_keeps_session() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, TransformMode::FlipUpDown);
        let mut header = FitsHeader::new();
        w.start(W, H, &mut header).unwrap();
        w.handle(&wire_rows(0..H)).unwrap();
        let path = w.current_path().unwrap().to_path_buf();

        // 只读句柄：填充和头部重写都会失败
        if let Some(session) = w.session.as_mut() {
            session.file = File::open(&path).unwrap();
        }
        let err = w.finish(&header).unwrap_err();
        assert!(matches!(err, DriverError::Io(_)));
        assert!(w.is_active());
        assert_eq!(w.current_path(), Some(path.as_path()));

        w.cancel();
        assert!(!path.exists());
    }

    #[test]
    fn test_cancel_deletes_file() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, TransformMode::FlipBoth);
        let mut header = FitsHeader::new();
        w.start(W, H, &mut header).unwrap();
        let path = w.current_path().unwrap().to_path_buf();
        assert!(path.exists());

        w.cancel();
        assert!(!path.exists());
        // 重复取消无操作
        w.cancel();
    }

    #[test]
    fn test_no_session() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, TransformMode::None);
        assert!(matches!(w.handle(&[0; 8]), Err(DriverError::NoActiveSession)));
        assert!(matches!(
            w.finish(&FitsHeader::new()),
            Err(DriverError::NoActiveSession)
        ));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, TransformMode::None);
        let mut header = FitsHeader::new();
        assert!(matches!(
            w.start(0, 4, &mut header),
            Err(DriverError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_sequential_paths() {
        let mut paths = SequentialPaths::new("/data", "m42");
        assert_eq!(paths.next_path(), PathBuf::from("/data/m42_0001.fits"));
        assert_eq!(paths.next_path(), PathBuf::from("/data/m42_0002.fits"));
        assert_eq!(paths.counter(), 3);
    }

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(5760), 5760);
        assert_eq!(padded_len(5761), 8640);
    }

    #[test]
    fn test_transform_flags() {
        assert_eq!(TransformMode::from_flags(true, true), TransformMode::FlipBoth);
        assert!(TransformMode::FlipUpDown.flips_rows());
        assert!(!TransformMode::FlipUpDown.flips_columns());
    }
}
