//! 파일 테일링 상태 머신
//!
//! 로그 파일을 블록 단위로 읽어 완성된 라인만 돌려주고,
//! 개행으로 끝나지 않은 나머지는 다음 사이클까지 버퍼에 보관합니다.
//! `tail -f`와 유사한 동작을 폴링 방식으로 구현합니다.
//!
//! # 상태 전이
//! ```text
//! Closed --(open 성공)--> Open --(경로 변경 / close / I/O 에러)--> Closed
//! ```
//!
//! 핸들이 닫히거나 교체될 때 보관 중이던 부분 라인은 버려집니다.
//! I/O 에러로 닫힌 뒤 같은 경로를 다시 열면 마지막 완성 라인 직후 오프셋부터
//! 이어 읽으므로 이미 처리한 라인을 다시 내보내지 않습니다.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use logtally_core::config::StartPosition;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::MonitorError;

/// 파일 핸들 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// 열린 핸들 없음 (초기 상태)
    Closed,
    /// 핸들이 열려 폴링 중
    Open,
}

/// 한 번의 폴링 결과
#[derive(Debug, Default)]
pub struct TailBatch {
    /// 이번 사이클에 읽은 바이트 수
    pub bytes: usize,
    /// 개행으로 완성된 라인 (읽은 순서)
    pub lines: Vec<String>,
}

/// 단일 파일 테일러
///
/// 파일 핸들은 최대 하나만 소유하며, 교체 전에 항상 닫습니다.
#[derive(Debug)]
pub struct Tail {
    /// 현재 대상 경로
    path: PathBuf,
    /// 열린 파일 핸들
    file: Option<File>,
    /// 마지막 개행 이후 읽은 바이트
    pending: Vec<u8>,
    /// 사이클당 최대 읽기 크기
    block_size: usize,
    /// 새로 연 핸들의 시작 위치
    start_at: StartPosition,
    /// 열린 핸들의 현재 파일 오프셋
    position: u64,
    /// 마지막 완성 라인 직후 오프셋 (재오픈 시 이어 읽을 위치)
    resume_at: Option<u64>,
}

impl Tail {
    /// 닫힌 상태의 테일러를 생성합니다.
    pub fn new(path: impl Into<PathBuf>, block_size: usize, start_at: StartPosition) -> Self {
        Self {
            path: path.into(),
            file: None,
            pending: Vec::new(),
            block_size,
            start_at,
            position: 0,
            resume_at: None,
        }
    }

    /// 현재 대상 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 현재 핸들 상태
    pub fn state(&self) -> TailState {
        if self.file.is_some() {
            TailState::Open
        } else {
            TailState::Closed
        }
    }

    /// 아직 개행으로 끝나지 않은 버퍼 내용
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// 대상 경로를 바꿉니다.
    ///
    /// 열린 핸들을 먼저 닫고 부분 라인 버퍼와 이어 읽기 오프셋을 버립니다.
    /// 새 파일은 다음 [`poll`](Self::poll)에서 `start_at` 기준으로 지연 오픈됩니다.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.close();
        self.resume_at = None;
        self.path = path.into();
    }

    /// 마지막 완성 라인 직후 오프셋. 한 번도 열지 않았으면 `None`.
    pub fn resume_offset(&self) -> Option<u64> {
        self.resume_at
    }

    /// 핸들을 닫고 부분 라인 버퍼를 비웁니다.
    ///
    /// 이어 읽기 오프셋은 유지되므로 같은 경로를 다시 열면 그 위치부터 읽습니다.
    pub fn close(&mut self) {
        // drop으로 디스크립터 해제
        self.file = None;
        self.pending.clear();
    }

    /// 한 사이클을 수행합니다.
    ///
    /// 닫힌 상태면 먼저 파일을 열고, 최대 `block_size` 바이트를 읽은 뒤
    /// 마지막 개행 앞까지를 완성 라인으로 돌려줍니다.
    ///
    /// # Errors
    /// 열기 또는 읽기에 실패하면 [`MonitorError::FileUnavailable`].
    /// 이때 상태는 `Closed`로 돌아가며 다음 호출에서 다시 열기를 시도합니다.
    pub async fn poll(&mut self) -> Result<TailBatch, MonitorError> {
        if self.file.is_none() {
            let (file, position) = self.open().await?;
            self.file = Some(file);
            self.position = position;
            self.resume_at = Some(position);
        }

        let bytes = match self.read_block().await {
            Ok(n) => n,
            Err(e) => {
                self.close();
                return Err(self.unavailable(&e));
            }
        };

        if bytes == 0 {
            return Ok(TailBatch::default());
        }

        self.position += bytes as u64;
        let lines = self.take_complete_lines();
        self.resume_at = Some(self.position - self.pending.len() as u64);

        Ok(TailBatch { bytes, lines })
    }

    /// 파일을 열고 읽기 위치로 이동합니다.
    ///
    /// 이어 읽기 오프셋이 있으면 그 위치(파일이 줄었으면 끝)로,
    /// 없으면 `start_at` 기준 위치로 이동합니다.
    async fn open(&self) -> Result<(File, u64), MonitorError> {
        let mut file = File::open(&self.path)
            .await
            .map_err(|e| self.unavailable(&e))?;

        let target = match (self.resume_at, self.start_at) {
            (Some(offset), _) => {
                let len = file
                    .metadata()
                    .await
                    .map_err(|e| self.unavailable(&e))?
                    .len();
                SeekFrom::Start(offset.min(len))
            }
            (None, StartPosition::End) => SeekFrom::End(0),
            (None, StartPosition::Beginning) => SeekFrom::Start(0),
        };
        let position = file
            .seek(target)
            .await
            .map_err(|e| self.unavailable(&e))?;

        tracing::debug!(path = %self.path.display(), position, "opened file");
        Ok((file, position))
    }

    /// 최대 `block_size` 바이트를 부분 라인 버퍼 뒤에 붙입니다.
    async fn read_block(&mut self) -> std::io::Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };
        let limit = u64::try_from(self.block_size).unwrap_or(u64::MAX);
        (&mut *file).take(limit).read_to_end(&mut self.pending).await
    }

    /// 버퍼를 마지막 개행 기준으로 잘라 완성 라인을 꺼냅니다.
    ///
    /// 라인 끝의 `\r`은 제거합니다. 디코딩은 완성 라인 단위로 하므로
    /// 블록 경계에 걸친 멀티바이트 문자도 온전히 복원됩니다.
    fn take_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    fn unavailable(&self, err: &std::io::Error) -> MonitorError {
        MonitorError::FileUnavailable {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn append(path: &Path, data: &[u8]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(data).unwrap();
    }

    #[tokio::test]
    async fn starts_closed_and_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut tail = Tail::new(dir.path().join("missing.log"), 1024, StartPosition::End);
        assert_eq!(tail.state(), TailState::Closed);

        let err = tail.poll().await.unwrap_err();
        assert!(matches!(err, MonitorError::FileUnavailable { .. }));
        assert_eq!(tail.state(), TailState::Closed);
    }

    #[tokio::test]
    async fn partial_line_is_carried_to_next_poll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, b"");
        let mut tail = Tail::new(&path, 1024, StartPosition::End);

        assert_eq!(tail.poll().await.unwrap().bytes, 0);
        assert_eq!(tail.state(), TailState::Open);

        append(&path, b"foo\nbar");
        let batch = tail.poll().await.unwrap();
        assert_eq!(batch.lines, vec!["foo"]);
        assert_eq!(tail.pending(), b"bar");

        append(&path, b"baz\n");
        let batch = tail.poll().await.unwrap();
        assert_eq!(batch.lines, vec!["barbaz"]);
        assert!(tail.pending().is_empty());
    }

    #[tokio::test]
    async fn start_at_end_skips_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, b"old line\n");

        let mut tail = Tail::new(&path, 1024, StartPosition::End);
        assert!(tail.poll().await.unwrap().lines.is_empty());

        append(&path, b"new line\n");
        assert_eq!(tail.poll().await.unwrap().lines, vec!["new line"]);
    }

    #[tokio::test]
    async fn start_at_beginning_replays_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, b"one\ntwo\n");

        let mut tail = Tail::new(&path, 1024, StartPosition::Beginning);
        assert_eq!(tail.poll().await.unwrap().lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn block_size_bounds_each_poll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, b"aaaa\nbbbb\n");

        let mut tail = Tail::new(&path, 4, StartPosition::Beginning);
        let first = tail.poll().await.unwrap();
        assert_eq!(first.bytes, 4);
        assert!(first.lines.is_empty());

        let second = tail.poll().await.unwrap();
        assert_eq!(second.bytes, 4);
        assert_eq!(second.lines, vec!["aaaa"]);

        let third = tail.poll().await.unwrap();
        assert_eq!(third.bytes, 2);
        assert_eq!(third.lines, vec!["bbbb"]);
    }

    #[tokio::test]
    async fn crlf_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, b"a\r\n\nb\n");

        let mut tail = Tail::new(&path, 1024, StartPosition::Beginning);
        assert_eq!(tail.poll().await.unwrap().lines, vec!["a", "", "b"]);
    }

    #[tokio::test]
    async fn multibyte_char_split_across_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        // "é"는 2바이트 (0xC3 0xA9)
        append(&path, "é\n".as_bytes());

        let mut tail = Tail::new(&path, 1, StartPosition::Beginning);
        assert!(tail.poll().await.unwrap().lines.is_empty());
        assert!(tail.poll().await.unwrap().lines.is_empty());
        assert_eq!(tail.poll().await.unwrap().lines, vec!["é"]);
    }

    #[tokio::test]
    async fn set_path_closes_handle_and_drops_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.log");
        let second = dir.path().join("second.log");
        append(&first, b"");
        append(&second, b"");

        let mut tail = Tail::new(&first, 1024, StartPosition::End);
        tail.poll().await.unwrap();
        append(&first, b"stale-partial");
        tail.poll().await.unwrap();
        assert_eq!(tail.pending(), b"stale-partial");

        tail.set_path(&second);
        assert_eq!(tail.state(), TailState::Closed);
        assert!(tail.pending().is_empty());
        assert_eq!(tail.path(), second.as_path());

        tail.poll().await.unwrap();
        append(&second, b"fresh\n");
        assert_eq!(tail.poll().await.unwrap().lines, vec!["fresh"]);
    }

    #[tokio::test]
    async fn read_error_closes_handle() {
        let dir = tempfile::tempdir().unwrap();
        // 디렉토리는 열 수 있지만 읽기는 실패함 (Linux)
        let mut tail = Tail::new(dir.path(), 1024, StartPosition::Beginning);
        if let Err(err) = tail.poll().await {
            assert!(matches!(err, MonitorError::FileUnavailable { .. }));
            assert_eq!(tail.state(), TailState::Closed);
        }
    }

    #[tokio::test]
    async fn reopen_after_read_error_resumes_after_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, b"a
part");

        let mut tail = Tail::new(&path, 1024, StartPosition::Beginning);
        assert_eq!(tail.poll().await.unwrap().lines, vec!["a"]);
        assert_eq!(tail.resume_offset(), Some(2));

        // 읽기가 실패하는 핸들로 바꿔 I/O 에러를 일으킴
        tail.file = Some(File::open(dir.path()).await.unwrap());
        append(&path, b"ial
b
");
        assert!(tail.poll().await.is_err());
        assert_eq!(tail.state(), TailState::Closed);
        assert!(tail.pending().is_empty());

        let batch = tail.poll().await.unwrap();
        assert_eq!(batch.lines, vec!["partial", "b"]);
        assert_eq!(tail.resume_offset(), Some(12));
    }

    #[tokio::test]
    async fn reopen_clamps_resume_offset_to_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        append(&path, b"first
second
");

        let mut tail = Tail::new(&path, 1024, StartPosition::Beginning);
        assert_eq!(tail.poll().await.unwrap().lines.len(), 2);

        tail.close();
        std::fs::write(&path, b"x
").unwrap();
        assert!(tail.poll().await.unwrap().lines.is_empty());

        append(&path, b"y
");
        assert_eq!(tail.poll().await.unwrap().lines, vec!["y"]);
    }

    #[tokio::test]
    async fn set_path_forgets_resume_offset() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.log");
        let second = dir.path().join("second.log");
        append(&first, b"one
");
        append(&second, b"two
");

        let mut tail = Tail::new(&first, 1024, StartPosition::Beginning);
        tail.poll().await.unwrap();
        assert_eq!(tail.resume_offset(), Some(4));

        tail.set_path(&second);
        assert_eq!(tail.resume_offset(), None);
        assert_eq!(tail.poll().await.unwrap().lines, vec!["two"]);
    }
}
