#[macro_use]
extern crate criterion;
extern crate restmpl;

use criterion::{Criterion, Throughput};
use restmpl::{FieldDescriptor, FieldType, Record, RepeatPolicy, Template, decode, encode};
use std::sync::Arc;

fn str_list_template() -> Arc<Template> {
    let strings = Template::new(vec![FieldDescriptor::new("The string", FieldType::PString)])
        .expect("valid template");
    Arc::new(
        Template::new(vec![
            FieldDescriptor::new("Number of strings", FieldType::UInt16),
            FieldDescriptor::new(
                "strings",
                FieldType::Group {
                    fields: strings,
                    repeat: RepeatPolicy::Counted {
                        count_field: "Number of strings".to_owned(),
                        zero_based: false,
                    },
                    condition: None,
                },
            ),
        ])
        .expect("valid template"),
    )
}

fn str_list(n: u16) -> Vec<u8> {
    let mut data = n.to_be_bytes().to_vec();
    for i in 0..n {
        let s = format!("String number {i}");
        data.push(s.len() as u8);
        data.extend_from_slice(s.as_bytes());
    }
    data
}

fn criterion_benchmark(c: &mut Criterion) {
    let template = str_list_template();
    let data = str_list(500);
    let record = decode(&template, &data).expect("decodes");

    let mut group = c.benchmark_group("str_list");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("decode 500 strings", |b| {
        b.iter(|| decode(&template, &data).expect("decodes"))
    });
    group.bench_function("encode 500 strings", |b| {
        b.iter(|| encode(&record).expect("encodes"))
    });
    group.bench_function("insert and encode", |b| {
        b.iter(|| {
            let mut edited: Record = record.clone();
            edited.insert_item("strings", 250).expect("inserts");
            encode(&edited).expect("encodes")
        })
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
