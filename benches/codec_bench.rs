use avrokit::codec::CodecId;
use avrokit::container::{Reader, Writer, WriterOptions};
use avrokit::{from_datum, to_datum, Schema, Value};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Cursor;
use std::sync::Arc;

const SCHEMA: &str = r#"{"type":"record","name":"Event","fields":[
    {"name":"id","type":"long"},
    {"name":"source","type":"string"},
    {"name":"score","type":"double"},
    {"name":"tags","type":{"type":"array","items":"string"}},
    {"name":"parent","type":["null","long"]}
]}"#;

fn event(i: i64) -> Value {
    Value::record([
        ("id", Value::Long(i)),
        ("source", Value::from(format!("sensor-{}", i % 17))),
        ("score", Value::Double(i as f64 * 0.5)),
        ("tags", Value::Array(vec!["a".into(), "bb".into(), "ccc".into()])),
        ("parent", if i % 2 == 0 { Value::union(0, Value::Null) } else { Value::union(1, Value::Long(i - 1)) }),
    ])
}

fn bench_datum(c: &mut Criterion) {
    let schema = Schema::parse_str(SCHEMA).unwrap();
    let value = event(12345);
    let bytes = to_datum(&schema, &value).unwrap();

    c.bench_function("encode_event", |b| b.iter(|| to_datum(&schema, black_box(&value)).unwrap()));
    c.bench_function("decode_event", |b| {
        b.iter(|| from_datum(&schema, &mut Cursor::new(black_box(&bytes))).unwrap())
    });
}

fn bench_container(c: &mut Criterion) {
    let schema = Arc::new(Schema::parse_str(SCHEMA).unwrap());
    let values: Vec<Value> = (0..10_000).map(event).collect();

    for codec in [CodecId::Null, CodecId::Deflate, CodecId::Zstandard] {
        c.bench_function(&format!("write_10k_{codec}"), |b| {
            b.iter(|| {
                let mut w = Writer::with_options(
                    Arc::clone(&schema),
                    Vec::new(),
                    WriterOptions::default().with_codec(codec),
                );
                w.append_all(black_box(&values)).unwrap();
                w.close().unwrap()
            })
        });

        let mut w = Writer::with_options(Arc::clone(&schema), Vec::new(), WriterOptions::default().with_codec(codec));
        w.append_all(&values).unwrap();
        let file = w.close().unwrap();
        c.bench_function(&format!("read_10k_{codec}"), |b| {
            b.iter(|| Reader::new(Cursor::new(black_box(&file))).unwrap().count())
        });
    }
}

criterion_group!(benches, bench_datum, bench_container);
criterion_main!(benches);
