#![no_main]

use arbitrary::Arbitrary;
use evfwd_core::types::OutputFormat;
use evfwd_output::render::RenderContext;
use evfwd_output::{BundleBuffer, EventRecord, Renderer};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    template: String,
    leef: bool,
    records: Vec<Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let format = if input.leef {
        OutputFormat::Leef
    } else {
        OutputFormat::Json
    };
    let Ok(renderer) = Renderer::for_format(format, &input.template) else {
        return;
    };

    let mut buf = BundleBuffer::new("fuzz");
    for record in input.records {
        buf.push(EventRecord::new(record));
    }
    let bundle = buf.seal("event-forwarder.fuzz.1");
    let ctx = RenderContext::new(bundle.name(), bundle.byte_size());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let mut out = Vec::new();
    let summary = runtime.block_on(async {
        let mut cursor = bundle.cursor();
        // 메모리 싱크로의 렌더링은 실패하지 않아야 한다
        renderer
            .render(&ctx, &mut cursor, &mut out)
            .await
            .expect("render into memory")
    });

    assert_eq!(summary.bytes, out.len() as u64);
    assert!(summary.records <= bundle.len() as u64);
});
