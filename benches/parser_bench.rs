//! Benchmarks for the ADIF tokenizer and callsign lookups.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use hamlog::{
    adif::Tokenizer,
    bandplan::Region,
    cty::PrefixTable,
    locator::Position,
    log::Log,
    prefix::expand_range,
    record::LogContext,
};

/// A single QSO record as written by typical logging programs.
const SAMPLE_RECORD: &str = "<CALL:6>OE1ABC <QSO_DATE:8>20230615 <TIME_ON:6>123000 \
    <TIME_OFF:6>124500 <BAND:3>20m <MODE:3>SSB <FREQ:6>14.250 <RST_SENT:2>59 \
    <RST_RCVD:2>57 <GRIDSQUARE:6>JN88ee <COMMENT:19>nice signal, thanks <EOR>\n";

const SAMPLE_CTY: &str = "\
Austria:                  15:  28:  EU:   47.33:   -13.33:    -1.0:  OE:
    OE,=4U1A,=4U1VIC(20)[28];
Fed. Rep. of Germany:     14:  28:  EU:   51.00:   -10.00:    -1.0:  DL:
    DA,DB,DC,DD,DE,DF,DG,DH,DI,DJ,DK,DL,DM,DN,DO,DP,DQ,DR,Y2,Y3,Y4,Y5,Y6,Y7,Y8,Y9;
United States:            05:  08:  NA:   37.53:    91.67:     5.0:  K:
    AA,AB,AC,AD,AE,AF,AG,AI,AJ,AK,K,N,W;
Hawaii:                   31:  61:  OC:   21.12:   157.48:    10.0:  KH6:
    AH6,AH7,KH6,KH7,NH6,NH7,WH6,WH7;
";

const SAMPLE_CALLS: &[&str] = &["OE3RSU", "DL1ABC", "KH6XYZ", "W1AW", "4U1VIC", "ZZ9ZZ"];

fn bench_tokenizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenizer");

    let log: String = SAMPLE_RECORD.repeat(100);

    group.throughput(Throughput::Bytes(SAMPLE_RECORD.len() as u64));
    group.bench_function("single_record", |b| {
        b.iter(|| {
            let mut tokenizer = Tokenizer::new(black_box(SAMPLE_RECORD).as_bytes());
            while let Ok(Some(_)) = tokenizer.next_tag() {}
        })
    });

    group.throughput(Throughput::Elements(100));
    group.bench_function("parse_log", |b| {
        b.iter(|| Log::parse_str(black_box(&log), LogContext::new()))
    });

    group.finish();
}

fn bench_cty_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("cty_lookup");

    let table = PrefixTable::parse_str(SAMPLE_CTY).expect("sample country file parses");

    group.throughput(Throughput::Elements(SAMPLE_CALLS.len() as u64));
    group.bench_function("batch", |b| {
        b.iter(|| {
            for call in SAMPLE_CALLS {
                let _ = table.lookup(black_box(call));
            }
        })
    });

    group.finish();
}

fn bench_expand_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("expand_range");

    group.bench_function("simple", |b| b.iter(|| expand_range(black_box("EA6-EH6"))));
    group.bench_function("nested", |b| b.iter(|| expand_range(black_box("UA-UB8-0"))));

    group.finish();
}

fn bench_enrichment(c: &mut Criterion) {
    let mut group = c.benchmark_group("enrichment");

    let plan = Region::Worldwide.bandplan();
    group.bench_function("band_lookup", |b| b.iter(|| plan.lookup(black_box(14.074e6))));
    group.bench_function("from_locator", |b| {
        b.iter(|| Position::from_locator(black_box("JN88ef40"), true))
    });
    group.bench_function("to_locator", |b| {
        let position = Position::new(48.208525, 16.373146);
        b.iter(|| black_box(position).to_locator(4))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_tokenizer,
    bench_cty_lookup,
    bench_expand_range,
    bench_enrichment
);
criterion_main!(benches);
