//! 바운디드 바이트 파이프 -- 렌더러와 전송 사이의 생산자/소비자 채널
//!
//! 쓰기 측([`PipeWriter`])은 `AsyncWrite`, 읽기 측([`PipeReader`])은
//! `Stream<Item = io::Result<Bytes>>`입니다. 채널 용량만큼의 청크(각 최대
//! [`PIPE_CHUNK_SIZE`] 바이트)만 메모리에 머무르므로 번들 크기와 무관하게
//! 메모리 사용량이 제한됩니다.
//!
//! # 종료 규칙
//! - 정상 종료: 쓰기 측 `shutdown()` 또는 drop → 읽기 측 스트림 종료
//! - 비정상 종료: [`PipeWriter::abort`] → 읽기 측이 에러를 관측
//! - 읽기 측 drop → 쓰기 측 `BrokenPipe`

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures_util::Stream;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::PollSender;

/// 청크 하나의 최대 크기
pub const PIPE_CHUNK_SIZE: usize = 8 * 1024;

/// 업로드 한 번에 사용하는 파이프 용량 (청크 수)
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

/// `capacity`개 청크를 담을 수 있는 바이트 파이프를 생성합니다.
pub fn byte_pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PipeWriter {
            tx: PollSender::new(tx),
        },
        PipeReader { rx },
    )
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "byte pipe reader closed")
}

/// 파이프 쓰기 측
pub struct PipeWriter {
    tx: PollSender<io::Result<Bytes>>,
}

impl PipeWriter {
    /// 읽기 측에 에러를 전달하고 파이프를 닫습니다.
    ///
    /// 읽기 측이 이미 사라졌다면 아무 일도 하지 않습니다.
    pub async fn abort(self, err: io::Error) {
        if let Some(tx) = self.tx.get_ref().cloned() {
            let _ = tx.send(Err(err)).await;
        }
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let this = self.get_mut();
        ready!(this.tx.poll_reserve(cx)).map_err(|_| broken_pipe())?;

        let n = buf.len().min(PIPE_CHUNK_SIZE);
        this.tx
            .send_item(Ok(Bytes::copy_from_slice(&buf[..n])))
            .map_err(|_| broken_pipe())?;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().tx.close();
        Poll::Ready(Ok(()))
    }
}

/// 파이프 읽기 측
pub struct PipeReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl PipeReader {
    /// `AsyncRead`/`AsyncBufRead` 어댑터로 변환합니다.
    pub fn into_async_read(self) -> StreamReader<PipeReader, Bytes> {
        StreamReader::new(self)
    }
}

impl Stream for PipeReader {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
