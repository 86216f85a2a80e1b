//! 스트리밍 템플릿 렌더러
//!
//! 번들을 목적지 와이어 바이트로 변환합니다. 전체 직렬화 결과를 메모리에 만들지 않고
//! 레코드를 하나씩 읽어 바이트 싱크에 씁니다.
//!
//! # 템플릿 구성
//! - 봉투(envelope) 템플릿: 번들 전체를 감쌉니다. `{{range .Events}}…{{end}}` 블록이
//!   레코드 반복 지점입니다.
//! - 첫 레코드 템플릿 / 이후 레코드 템플릿: `{{.}}` 자리에 레코드 원문이 들어갑니다.
//!   구분자(JSON `,`, LEEF 개행)는 이후 레코드 템플릿에 포함됩니다.
//!
//! # 지원 액션
//! `{{.FileName}}`, `{{.FileSize}}`, `{{range .Events}}`, `{{.EventText}}`, `{{end}}`
//!
//! # 동시 실행
//! [`spawn_renderer`]는 렌더러를 별도 태스크로 실행하고 [`PipeReader`]를 반환합니다.
//! 전송 측은 읽기와 동시에 I/O를 수행하고, 마지막에 [`finish`]로 양쪽 결과를 합칩니다.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;

use evfwd_core::types::OutputFormat;

use crate::bundle::RecordSource;
use crate::error::OutputError;
use crate::pipe::{PIPE_CHUNK_SIZE, PipeReader, byte_pipe};

/// JSON 모드 기본 봉투 템플릿
pub const DEFAULT_JSON_TEMPLATE: &str = r#"{"filename":"{{.FileName}}","service":"carbonblack","alerts":[{{range .Events}}{{.EventText}}{{end}}]}"#;

/// LEEF 모드 기본 봉투 템플릿
pub const DEFAULT_LEEF_TEMPLATE: &str = "{{range .Events}}{{.EventText}}{{end}}";

/// Splunk HEC 기본 봉투 템플릿
pub const DEFAULT_HEC_TEMPLATE: &str =
    r#"{{range .Events}}{"sourcetype":"bit9:carbonblack:json","event":{{.EventText}}}{{end}}"#;

const RECORD_PLACEHOLDER: &str = "{{.}}";

// ─── 템플릿 ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    FileName,
    FileSize,
    EventText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Head,
    Body,
    Tail,
}

/// 파싱된 봉투 템플릿
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostTemplate {
    head: Vec<Part>,
    body: Option<Vec<Part>>,
    tail: Vec<Part>,
}

impl PostTemplate {
    /// 템플릿 문자열을 파싱합니다.
    ///
    /// range 블록은 최대 하나이며 중첩할 수 없습니다.
    /// `{{.EventText}}`는 range 블록 안에서만 사용할 수 있습니다.
    pub fn parse(text: &str) -> Result<Self, OutputError> {
        let mut head = Vec::new();
        let mut body = Vec::new();
        let mut tail = Vec::new();
        let mut stage = Stage::Head;
        let mut rest = text;

        while let Some(start) = rest.find("{{") {
            let parts = match stage {
                Stage::Head => &mut head,
                Stage::Body => &mut body,
                Stage::Tail => &mut tail,
            };
            push_literal(parts, &rest[..start]);

            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| template_error("unterminated action '{{'"))?;
            let action = after[..end].trim();
            rest = &after[end + 2..];

            match action {
                ".FileName" => parts.push(Part::FileName),
                ".FileSize" => parts.push(Part::FileSize),
                ".EventText" if stage == Stage::Body => parts.push(Part::EventText),
                ".EventText" => {
                    return Err(template_error("{{.EventText}} outside of range block"));
                }
                "range .Events" => match stage {
                    Stage::Head => stage = Stage::Body,
                    Stage::Body => return Err(template_error("nested range block")),
                    Stage::Tail => return Err(template_error("more than one range block")),
                },
                "end" if stage == Stage::Body => stage = Stage::Tail,
                "end" => return Err(template_error("{{end}} without range")),
                other => return Err(template_error(format!("unknown action '{{{{{other}}}}}'"))),
            }
        }

        match stage {
            Stage::Head => push_literal(&mut head, rest),
            Stage::Body => return Err(template_error("unclosed range block")),
            Stage::Tail => push_literal(&mut tail, rest),
        }

        Ok(Self {
            head,
            body: (stage == Stage::Tail).then_some(body),
            tail,
        })
    }

    /// 레코드 반복 블록이 있는지 확인합니다.
    pub fn has_range(&self) -> bool {
        self.body.is_some()
    }
}

fn push_literal(parts: &mut Vec<Part>, text: &str) {
    if !text.is_empty() {
        parts.push(Part::Literal(text.to_owned()));
    }
}

fn template_error(reason: impl Into<String>) -> OutputError {
    OutputError::Configuration(format!("invalid post template: {}", reason.into()))
}

/// 레코드 템플릿 (`prefix{{.}}suffix`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTemplate {
    prefix: String,
    suffix: String,
}

impl RecordTemplate {
    /// 레코드 원문을 그대로 내보내는 템플릿
    pub fn verbatim() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
        }
    }

    /// 템플릿 문자열을 파싱합니다. `{{.}}`가 정확히 한 번 있어야 합니다.
    pub fn parse(text: &str) -> Result<Self, OutputError> {
        if text.matches(RECORD_PLACEHOLDER).count() != 1 {
            return Err(OutputError::Configuration(format!(
                "record template must contain exactly one {RECORD_PLACEHOLDER}: {text:?}"
            )));
        }
        let (prefix, suffix) = text
            .split_once(RECORD_PLACEHOLDER)
            .ok_or_else(|| OutputError::Configuration("record template placeholder".to_owned()))?;
        Ok(Self {
            prefix: prefix.to_owned(),
            suffix: suffix.to_owned(),
        })
    }
}

// ─── 렌더러 ────────────────────────────────────────────────────────

/// 렌더링 시점 값
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    /// `{{.FileName}}` 값 (번들 이름)
    pub file_name: String,
    /// `{{.FileSize}}` 값 (번들 바이트 크기)
    pub file_size: u64,
    /// 레코드마다 레코드 템플릿보다 먼저 쓰는 값 (syslog 헤더)
    pub record_prefix: String,
}

impl RenderContext {
    pub fn new(file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            file_size,
            record_prefix: String::new(),
        }
    }

    /// 이번 렌더링의 모든 레코드 앞에 `prefix`를 씁니다.
    pub fn with_record_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.record_prefix = prefix.into();
        self
    }
}

/// 렌더링 결과 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    /// 렌더링된 레코드 수
    pub records: u64,
    /// 싱크에 쓴 바이트 수
    pub bytes: u64,
}

/// 세 부분 템플릿 렌더러
///
/// 목적지 behavior마다 하나씩 소유하며 초기화 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renderer {
    envelope: PostTemplate,
    first: RecordTemplate,
    subsequent: RecordTemplate,
}

impl Renderer {
    /// 세 템플릿으로 렌더러를 생성합니다.
    pub fn new(envelope: PostTemplate, first: RecordTemplate, subsequent: RecordTemplate) -> Self {
        Self {
            envelope,
            first,
            subsequent,
        }
    }

    /// 이벤트 형식에 맞는 기본 렌더러를 생성합니다.
    ///
    /// `post_template`이 비어 있지 않으면 기본 봉투 대신 사용합니다.
    pub fn for_format(format: OutputFormat, post_template: &str) -> Result<Self, OutputError> {
        let envelope = if post_template.is_empty() {
            match format {
                OutputFormat::Json => DEFAULT_JSON_TEMPLATE,
                OutputFormat::Leef => DEFAULT_LEEF_TEMPLATE,
            }
        } else {
            post_template
        };
        Ok(Self::new(
            PostTemplate::parse(envelope)?,
            RecordTemplate::verbatim(),
            RecordTemplate::parse(&format!("{}{RECORD_PLACEHOLDER}", format.separator()))?,
        ))
    }

    /// Splunk HEC 렌더러를 생성합니다. 레코드 사이에 구분자가 없습니다.
    pub fn splunk(post_template: &str) -> Result<Self, OutputError> {
        let envelope = if post_template.is_empty() {
            DEFAULT_HEC_TEMPLATE
        } else {
            post_template
        };
        Ok(Self::new(
            PostTemplate::parse(envelope)?,
            RecordTemplate::verbatim(),
            RecordTemplate::verbatim(),
        ))
    }

    /// 레코드 하나당 한 줄을 쓰는 렌더러 (파일, TCP 스트림)
    pub fn lines() -> Self {
        Self::new(
            PostTemplate {
                head: Vec::new(),
                body: Some(vec![Part::EventText, Part::Literal("\n".to_owned())]),
                tail: Vec::new(),
            },
            RecordTemplate::verbatim(),
            RecordTemplate::verbatim(),
        )
    }

    /// 소스의 레코드를 순서대로 렌더링하여 싱크에 씁니다.
    ///
    /// 소스 에러는 [`OutputError::Render`], 싱크 에러는 [`OutputError::Transmission`]으로
    /// 반환됩니다. 싱크는 flush하지 않습니다.
    pub async fn render<S, W>(
        &self,
        ctx: &RenderContext,
        source: &mut S,
        sink: &mut W,
    ) -> Result<RenderSummary, OutputError>
    where
        S: RecordSource,
        W: AsyncWrite + Unpin + Send,
    {
        let mut summary = RenderSummary::default();
        write_parts(&self.envelope.head, ctx, None, sink, &mut summary).await?;

        if let Some(body) = &self.envelope.body {
            while let Some(record) = source.next_record().await.map_err(into_render_error)? {
                let template = if summary.records == 0 {
                    &self.first
                } else {
                    &self.subsequent
                };
                let text: &[u8] = record.text();
                write_parts(body, ctx, Some((template, text)), sink, &mut summary).await?;
                summary.records += 1;
            }
        }

        write_parts(&self.envelope.tail, ctx, None, sink, &mut summary).await?;
        Ok(summary)
    }
}

fn into_render_error(err: OutputError) -> OutputError {
    match err {
        OutputError::Render(_) => err,
        other => OutputError::Render(other.to_string()),
    }
}

async fn write_parts<W>(
    parts: &[Part],
    ctx: &RenderContext,
    record: Option<(&RecordTemplate, &[u8])>,
    sink: &mut W,
    summary: &mut RenderSummary,
) -> Result<(), OutputError>
where
    W: AsyncWrite + Unpin + Send,
{
    for part in parts {
        match part {
            Part::Literal(text) => put(sink, text.as_bytes(), summary).await?,
            Part::FileName => put(sink, ctx.file_name.as_bytes(), summary).await?,
            Part::FileSize => put(sink, ctx.file_size.to_string().as_bytes(), summary).await?,
            Part::EventText => {
                if let Some((template, text)) = record {
                    put(sink, ctx.record_prefix.as_bytes(), summary).await?;
                    put(sink, template.prefix.as_bytes(), summary).await?;
                    put(sink, text, summary).await?;
                    put(sink, template.suffix.as_bytes(), summary).await?;
                }
            }
        }
    }
    Ok(())
}

async fn put<W>(sink: &mut W, bytes: &[u8], summary: &mut RenderSummary) -> Result<(), OutputError>
where
    W: AsyncWrite + Unpin + Send,
{
    if bytes.is_empty() {
        return Ok(());
    }
    sink.write_all(bytes)
        .await
        .map_err(OutputError::transmission)?;
    summary.bytes += bytes.len() as u64;
    Ok(())
}

// ─── 동시 렌더링 ───────────────────────────────────────────────────

/// 렌더러 태스크 핸들
pub type RenderTask = JoinHandle<Result<RenderSummary, OutputError>>;

/// 렌더러를 별도 태스크로 실행하고 파이프 읽기 측을 반환합니다.
///
/// 렌더링이 실패하면 파이프를 에러로 닫아 읽기 측이 I/O 에러를 관측합니다.
pub fn spawn_renderer<S>(
    renderer: Arc<Renderer>,
    ctx: RenderContext,
    mut source: S,
    capacity: usize,
) -> (PipeReader, RenderTask)
where
    S: RecordSource + 'static,
{
    let (writer, reader) = byte_pipe(capacity);
    let task = tokio::spawn(async move {
        let mut sink = BufWriter::with_capacity(PIPE_CHUNK_SIZE, writer);
        match renderer.render(&ctx, &mut source, &mut sink).await {
            Ok(summary) => {
                sink.shutdown().await.map_err(OutputError::transmission)?;
                Ok(summary)
            }
            Err(err) => {
                sink.into_inner()
                    .abort(io::Error::other(err.to_string()))
                    .await;
                Err(err)
            }
        }
    });
    (reader, task)
}

/// 렌더러 결과와 전송 결과를 합칩니다.
///
/// 우선순위: 렌더링(소스) 에러 → 전송 에러 → 그 외 렌더러 에러.
/// 전송 측이 파이프 읽기 측을 이미 놓은 뒤에 호출해야 합니다.
pub async fn finish<T>(
    task: RenderTask,
    transport: Result<T, OutputError>,
) -> Result<(T, RenderSummary), OutputError> {
    let rendered = match task.await {
        Ok(result) => result,
        Err(err) => Err(OutputError::Render(format!("renderer task failed: {err}"))),
    };
    match (rendered, transport) {
        (Err(err @ OutputError::Render(_)), _) => Err(err),
        (_, Err(err)) => Err(err),
        (Err(err), Ok(_)) => Err(err),
        (Ok(summary), Ok(value)) => Ok((value, summary)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleBuffer, EventRecord};
    use tokio::io::AsyncReadExt;

    fn bundle_of(texts: &[&str]) -> crate::bundle::Bundle {
        let mut buf = BundleBuffer::new("dest");
        for text in texts {
            buf.push(EventRecord::new(text.to_string()));
        }
        buf.seal("F")
    }

    fn ctx(name: &str, size: u64) -> RenderContext {
        RenderContext::new(name, size)
    }

    async fn render_to_string(renderer: &Renderer, texts: &[&str]) -> String {
        let bundle = bundle_of(texts);
        let mut out = Vec::new();
        renderer
            .render(&ctx("F", bundle.byte_size()), &mut bundle.cursor(), &mut out)
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    struct FailingSource {
        remaining: u32,
    }

    impl RecordSource for FailingSource {
        async fn next_record(&mut self) -> Result<Option<EventRecord>, OutputError> {
            if self.remaining == 0 {
                return Err(OutputError::Io(io::Error::other("spool file truncated")));
            }
            self.remaining -= 1;
            Ok(Some(EventRecord::new("{}")))
        }
    }

    #[tokio::test]
    async fn json_default_joins_with_commas() {
        let renderer = Renderer::for_format(OutputFormat::Json, "").unwrap();
        let out = render_to_string(&renderer, &["a", "b", "c"]).await;
        assert_eq!(
            out,
            r#"{"filename":"F","service":"carbonblack","alerts":[a,b,c]}"#
        );
    }

    #[tokio::test]
    async fn json_default_with_no_records() {
        let renderer = Renderer::for_format(OutputFormat::Json, "").unwrap();
        let out = render_to_string(&renderer, &[]).await;
        assert_eq!(out, r#"{"filename":"F","service":"carbonblack","alerts":[]}"#);
    }

    #[tokio::test]
    async fn leef_default_joins_with_newlines() {
        let renderer = Renderer::for_format(OutputFormat::Leef, "").unwrap();
        let out = render_to_string(&renderer, &["LEEF:1|a", "LEEF:1|b"]).await;
        assert_eq!(out, "LEEF:1|a\nLEEF:1|b");
    }

    #[tokio::test]
    async fn splunk_wraps_each_record() {
        let renderer = Renderer::splunk("").unwrap();
        let out = render_to_string(&renderer, &["{\"x\":1}", "{\"x\":2}"]).await;
        assert_eq!(
            out,
            concat!(
                r#"{"sourcetype":"bit9:carbonblack:json","event":{"x":1}}"#,
                r#"{"sourcetype":"bit9:carbonblack:json","event":{"x":2}}"#
            )
        );
    }

    #[tokio::test]
    async fn lines_with_prefix() {
        let renderer = Renderer::lines();
        let bundle = bundle_of(&["one", "two"]);
        let ctx = ctx("F", bundle.byte_size()).with_record_prefix("<14>host: ");
        let mut out = Vec::new();
        renderer
            .render(&ctx, &mut bundle.cursor(), &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"<14>host: one\n<14>host: two\n");
    }

    #[tokio::test]
    async fn record_prefix_comes_before_separator_template() {
        let renderer = Renderer::for_format(OutputFormat::Leef, "").unwrap();
        let bundle = bundle_of(&["a", "b"]);
        let ctx = ctx("F", bundle.byte_size()).with_record_prefix("> ");
        let mut out = Vec::new();
        renderer
            .render(&ctx, &mut bundle.cursor(), &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"> a> \nb");
    }

    #[tokio::test]
    async fn custom_template_uses_file_size() {
        let renderer = Renderer::for_format(
            OutputFormat::Json,
            r#"{"name":"{{.FileName}}","size":{{.FileSize}},"events":[{{range .Events}}{{.EventText}}{{end}}]}"#,
        )
        .unwrap();
        let out = render_to_string(&renderer, &["1", "22"]).await;
        assert_eq!(out, r#"{"name":"F","size":3,"events":[1,22]}"#);
    }

    #[tokio::test]
    async fn summary_counts_records_and_bytes() {
        let renderer = Renderer::for_format(OutputFormat::Leef, "").unwrap();
        let bundle = bundle_of(&["ab", "cd"]);
        let mut out = Vec::new();
        let summary = renderer
            .render(&ctx("F", 4), &mut bundle.cursor(), &mut out)
            .await
            .unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.bytes, out.len() as u64);
    }

    #[test]
    fn parse_rejects_malformed_templates() {
        for bad in [
            "{{range .Events}}{{range .Events}}{{end}}{{end}}",
            "{{range .Events}}{{end}}{{range .Events}}{{end}}",
            "{{end}}",
            "{{range .Events}}{{.EventText}}",
            "{{.EventText}}",
            "{{.Unknown}}",
            "{\"a\":{{.FileName}",
        ] {
            let err = PostTemplate::parse(bad).unwrap_err();
            assert!(
                matches!(err, OutputError::Configuration(_)),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn parse_accepts_template_without_range() {
        let template = PostTemplate::parse("header {{.FileName}}").unwrap();
        assert!(!template.has_range());
        assert!(PostTemplate::parse(DEFAULT_JSON_TEMPLATE).unwrap().has_range());
    }

    #[test]
    fn record_template_requires_one_placeholder() {
        assert!(RecordTemplate::parse("no placeholder").is_err());
        assert!(RecordTemplate::parse("{{.}}{{.}}").is_err());
        let t = RecordTemplate::parse("[{{.}}]").unwrap();
        assert_eq!(t.prefix, "[");
        assert_eq!(t.suffix, "]");
    }

    #[tokio::test]
    async fn spawned_renderer_streams_through_pipe() {
        let renderer = Arc::new(Renderer::for_format(OutputFormat::Json, "").unwrap());
        let bundle = bundle_of(&["a", "b", "c"]);
        let (reader, task) = spawn_renderer(renderer, ctx("F", 3), bundle.cursor(), 2);

        let mut out = String::new();
        let read = reader
            .into_async_read()
            .read_to_string(&mut out)
            .await
            .map_err(OutputError::from);
        let (_, summary) = finish(task, read).await.unwrap();

        assert_eq!(
            out,
            r#"{"filename":"F","service":"carbonblack","alerts":[a,b,c]}"#
        );
        assert_eq!(summary.records, 3);
    }

    #[tokio::test]
    async fn source_failure_reaches_reader_and_wins() {
        let renderer = Arc::new(Renderer::for_format(OutputFormat::Json, "").unwrap());
        let (reader, task) = spawn_renderer(renderer, ctx("F", 0), FailingSource { remaining: 2 }, 2);

        let mut out = Vec::new();
        let read = reader
            .into_async_read()
            .read_to_end(&mut out)
            .await
            .map_err(OutputError::from);
        assert!(read.is_err());

        let err = finish(task, read).await.unwrap_err();
        assert!(matches!(err, OutputError::Render(_)));
        assert!(err.to_string().contains("spool file truncated"));
    }

    #[tokio::test]
    async fn transport_error_wins_over_broken_pipe() {
        let renderer = Arc::new(Renderer::for_format(OutputFormat::Json, "").unwrap());
        let bundle = bundle_of(&["a"; 64]);
        let (reader, task) = spawn_renderer(renderer, ctx("F", 64), bundle.cursor(), 1);
        drop(reader);

        let transport: Result<(), _> = Err(OutputError::connectivity("peer", "refused"));
        let err = finish(task, transport).await.unwrap_err();
        assert!(matches!(err, OutputError::Connectivity { .. }));
    }
}
