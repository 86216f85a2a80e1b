//! 스트림 복사 -- 파이프 읽기 측에서 파일/소켓으로 (선택적 gzip)
//!
//! gzip은 `flate2::write::GzEncoder`에 청크 단위로 입력하고, 압축된 출력이
//! 생길 때마다 비동기 싱크로 내보냅니다. 번들 전체를 메모리에 압축하지 않습니다.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::pipe::PIPE_CHUNK_SIZE;

/// 읽기 측을 그대로 싱크에 복사하고 쓴 바이트 수를 반환합니다.
pub async fn copy_plain<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let written = tokio::io::copy(reader, writer).await?;
    writer.flush().await?;
    Ok(written)
}

/// 읽기 측을 gzip 멤버 하나로 압축해 싱크에 쓰고 압축된 바이트 수를 반환합니다.
pub async fn copy_gzip<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut encoder = GzEncoder::new(Vec::with_capacity(PIPE_CHUNK_SIZE), Compression::default());
    let mut buf = vec![0u8; PIPE_CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n])?;

        let out = encoder.get_mut();
        if !out.is_empty() {
            writer.write_all(out).await?;
            written += out.len() as u64;
            out.clear();
        }
    }

    let tail = encoder.finish()?;
    writer.write_all(&tail).await?;
    written += tail.len() as u64;
    writer.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;

    #[tokio::test]
    async fn plain_copy_counts_bytes() {
        let mut reader: &[u8] = b"line one\nline two\n";
        let mut out = Vec::new();
        let n = copy_plain(&mut reader, &mut out).await.unwrap();
        assert_eq!(n, 18);
        assert_eq!(out, b"line one\nline two\n");
    }

    #[tokio::test]
    async fn gzip_copy_round_trips() {
        let payload = "event\n".repeat(10_000);
        let mut reader = payload.as_bytes();
        let mut out = Vec::new();
        let n = copy_gzip(&mut reader, &mut out).await.unwrap();
        assert_eq!(n, out.len() as u64);
        assert!(out.len() < payload.len());

        let mut decoded = String::new();
        MultiGzDecoder::new(&out[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn consecutive_members_decode_as_one_stream() {
        let mut out = Vec::new();
        copy_gzip(&mut &b"first\n"[..], &mut out).await.unwrap();
        copy_gzip(&mut &b"second\n"[..], &mut out).await.unwrap();

        let mut decoded = String::new();
        MultiGzDecoder::new(&out[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "first\nsecond\n");
    }
}
